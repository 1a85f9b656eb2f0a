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
use crate::names::{object, SignalKind, UPLOAD_INTERFACE, UPLOAD_SERVICE, UPLOAD_SIGNALS};

/// Handle for one upload object exported by the daemon.
///
/// Uploads cannot be paused, so there are no `paused`/`resumed` streams.
pub struct Upload {
    object: RemoteObject,
    started: EventStream<bool>,
    canceled: EventStream<bool>,
    finished: EventStream<String>,
    errors: EventStream<TransferFailure>,
    progress: EventStream<Progress>,
}

impl Upload {
    pub(crate) async fn new(
        caller: Arc<dyn MethodCaller>,
        watcher: &dyn SignalWatcher,
        path: OwnedObjectPath,
        capacity: usize,
    ) -> Result<Self> {
        let mut object = RemoteObject::connect(
            caller,
            watcher,
            UPLOAD_SERVICE,
            UPLOAD_INTERFACE,
            path,
            &UPLOAD_SIGNALS,
            capacity,
        )
        .await?;

        let started = object.attach(SignalKind::Started, decode_flag)?;
        let canceled = object.attach(SignalKind::Canceled, decode_flag)?;
        let finished = object.attach(SignalKind::Finished, decode_path)?;
        let errors = object.attach(SignalKind::Error, decode_failure)?;
        let progress = object.attach(SignalKind::Progress, decode_progress)?;

        info!("Upload ready at {}", object.path().as_str());
        Ok(Self {
            object,
            started,
            canceled,
            finished,
            errors,
            progress,
        })
    }

    pub fn path(&self) -> &OwnedObjectPath {
        self.object.path()
    }

    /// Bytes sent so far.
    pub async fn progress(&self) -> Result<u64> {
        self.object.gateway().call(object::PROGRESS, &()).await
    }

    pub async fn metadata(&self) -> Result<HashMap<String, String>> {
        self.object
            .gateway()
            .call_with(object::METADATA, &(), decode_string_map)
            .await
    }

    pub async fn set_throttle(&self, bytes_per_second: u64) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::SET_THROTTLE, &(bytes_per_second,))
            .await
    }

    pub async fn throttle(&self) -> Result<u64> {
        self.object.gateway().call(object::THROTTLE, &()).await
    }

    pub async fn allow_mobile_upload(&self, allowed: bool) -> Result<()> {
        self.object
            .gateway()
            .call_unit(object::ALLOW_MOBILE_UPLOAD, &(allowed,))
            .await
    }

    pub async fn is_mobile_upload_allowed(&self) -> Result<bool> {
        self.object
            .gateway()
            .call(object::IS_MOBILE_UPLOAD_ALLOWED, &())
            .await
    }

    pub async fn start(&self) -> Result<()> {
        self.object.gateway().call_unit(object::START, &()).await
    }

    pub async fn cancel(&self) -> Result<()> {
        self.object.gateway().call_unit(object::CANCEL, &()).await
    }

    pub fn started(&self) -> EventStream<bool> {
        self.started.clone()
    }

    pub fn canceled(&self) -> EventStream<bool> {
        self.canceled.clone()
    }

    /// Remote location reported once the upload completed.
    pub fn finished(&self) -> EventStream<String> {
        self.finished.clone()
    }

    pub fn errors(&self) -> EventStream<TransferFailure> {
        self.errors.clone()
    }

    pub fn upload_progress(&self) -> EventStream<Progress> {
        self.progress.clone()
    }

    pub fn filters(&self) -> Vec<SignalFilter> {
        self.object.filters()
    }

    /// Cancel all subscriptions; only the first call does anything.
    pub fn release(&self) -> bool {
        self.object.release()
    }

    pub fn is_released(&self) -> bool {
        self.object.is_released()
    }

    pub async fn close(mut self) {
        self.object.close().await;
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("path", &self.path().as_str())
            .field("released", &self.is_released())
            .finish()
    }
}
