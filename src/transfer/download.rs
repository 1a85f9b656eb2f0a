use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use zbus::zvariant::OwnedObjectPath;

use super::RemoteObject;
use crate::bus::{MethodCaller, SignalFilter, SignalWatcher};
use crate::error::Result;
use crate::events::{
    decode_failure, decode_flag, decode_path, decode_progress, EventStream, Progress,
    TransferFailure,
};
use crate::gateway::decode_string_map;
use crate::names::{object, SignalKind, DOWNLOAD_INTERFACE, DOWNLOAD_SERVICE, DOWNLOAD_SIGNALS};
use crate::request::Metadata;

/// Handle for one download object exported by the daemon.
///
/// Each accessor issues one remote call. The event streams stay open until
/// the handle is released, so a consumer waiting on `finished` sees `None`
/// once the handle goes away.
pub struct Download {
    object: RemoteObject,
    started: EventStream<bool>,
    paused: EventStream<bool>,
    resumed: EventStream<bool>,
    canceled: EventStream<bool>,
    finished: EventStream<String>,
    errors: EventStream<TransferFailure>,
    progress: EventStream<Progress>,
}

impl Download {
    pub(crate) async fn new(
        caller: Arc<dyn MethodCaller>,
        watcher: &dyn SignalWatcher,
        path: OwnedObjectPath,
        capacity: usize,
    ) -> Result<Self> {
        let mut object = RemoteObject::connect(
            caller,
            watcher,
            DOWNLOAD_SERVICE,
            DOWNLOAD_INTERFACE,
            path,
            &DOWNLOAD_SIGNALS,
            capacity,
        )
        .await?;

        let started = object.attach(SignalKind::Started, decode_flag)?;
        let paused = object.attach(SignalKind::Paused, decode_flag)?;
        let resumed = object.attach(SignalKind::Resumed, decode_flag)?;
        let canceled = object.attach(SignalKind::Canceled, decode_flag)?;
        let finished = object.attach(SignalKind::Finished, decode_path)?;
        let errors = object.attach(SignalKind::Error, decode_failure)?;
        let progress = object.attach(SignalKind::Progress, decode_progress)?;

        info!("Download ready at {}", object.path().as_str());
        Ok(Self {
            object,
            started,
            paused,
            resumed,
            canceled,
            finished,
            errors,
            progress,
        })
    }

    pub fn path(&self) -> &OwnedObjectPath {
        self.object.path()
    }

    /// Expected size in bytes, zero while unknown.
    pub async fn total_size(&self) -> Result<u64> {
        self.object.gateway().call(object::TOTAL_SIZE, &()).await
    }

    /// Bytes received so far.
    pub async fn progress(&self) -> Result<u64> {
        self.object.gateway().call(object::PROGRESS, &()).await
    }

    pub async fn metadata(&self) -> Result<HashMap<String, String>> {
        self.object
            .gateway()
            .call_with(object::METADATA, &(), decode_string_map)
            .await
    }

    /// Replace the metadata stored with the download.
    pub async fn set_metadata(&self, metadata: &Metadata) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::SET_METADATA, &(metadata.as_map(),))
            .await
    }

    /// HTTP headers sent with the request.
    pub async fn headers(&self) -> Result<HashMap<String, String>> {
        self.object
            .gateway()
            .call_with(object::HEADERS, &(), decode_string_map)
            .await
    }

    /// Replace the HTTP headers; takes effect on the next (re)start.
    pub async fn set_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::SET_HEADERS, &(headers,))
            .await
    }

    /// Limit the transfer rate in bytes per second; zero removes the limit.
    pub async fn set_throttle(&self, bytes_per_second: u64) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::SET_THROTTLE, &(bytes_per_second,))
            .await
    }

    pub async fn throttle(&self) -> Result<u64> {
        self.object.gateway().call(object::THROTTLE, &()).await
    }

    pub async fn allow_mobile_download(&self, allowed: bool) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::ALLOW_GSM_DOWNLOAD, &(allowed,))
            .await
    }

    pub async fn is_mobile_download_allowed(&self) -> Result<bool> {
        self.object
            .gateway()
            .call(object::IS_GSM_DOWNLOAD_ALLOWED, &())
            .await
    }

    /// Move the finished file into `dir` instead of the default location.
    pub async fn set_destination_dir(&self, dir: &str) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::SET_DESTINATION_DIR, &(dir,))
            .await
    }

    pub async fn start(&self) -> Result<()> {
        self.object.gateway().call_unit(object::START, &()).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.object.gateway().call_unit(object::PAUSE, &()).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.object.gateway().call_unit(object::RESUME, &()).await
    }

    pub async fn cancel(&self) -> Result<()> {
        self.object.gateway().call_unit(object::CANCEL, &()).await
    }

    pub fn started(&self) -> EventStream<bool> {
        self.started.clone()
    }

    pub fn paused(&self) -> EventStream<bool> {
        self.paused.clone()
    }

    pub fn resumed(&self) -> EventStream<bool> {
        self.resumed.clone()
    }

    pub fn canceled(&self) -> EventStream<bool> {
        self.canceled.clone()
    }

    /// Local path of the file once the download completed.
    pub fn finished(&self) -> EventStream<String> {
        self.finished.clone()
    }

    pub fn errors(&self) -> EventStream<TransferFailure> {
        self.errors.clone()
    }

    pub fn download_progress(&self) -> EventStream<Progress> {
        self.progress.clone()
    }

    /// Filters registered for this handle.
    pub fn filters(&self) -> Vec<SignalFilter> {
        self.object.filters()
    }

    /// Cancel all subscriptions; only the first call does anything.
    ///
    /// Returns whether this call performed the release.
    pub fn release(&self) -> bool {
        self.object.release()
    }

    pub fn is_released(&self) -> bool {
        self.object.is_released()
    }

    /// Release and wait for every event stream to close.
    pub async fn close(mut self) {
        self.object.close().await;
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("path", &self.path().as_str())
            .field("released", &self.is_released())
            .finish()
    }
}
