//! Entry points that create transfers and hand back handles.
//!
//! A manager never owns the handles it creates; dropping a manager does not
//! release anything.

use std::sync::Arc;
use tracing::info;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use crate::bus::{MethodCaller, SignalWatcher, ZbusBus};
use crate::config::{Config, EventsConfig};
use crate::error::{Error, Result};
use crate::gateway::CallGateway;
use crate::names::{
    manager, DOWNLOAD_MANAGER_INTERFACE, DOWNLOAD_SERVICE, MANAGER_PATH, UPLOAD_MANAGER_INTERFACE,
    UPLOAD_SERVICE,
};
use crate::request::{DownloadRequest, UploadRequest};
use crate::transfer::{Download, Upload};

/// Capabilities and settings shared by both managers.
#[derive(Clone)]
struct Endpoint {
    caller: Arc<dyn MethodCaller>,
    watcher: Arc<dyn SignalWatcher>,
    gateway: CallGateway,
    capacity: usize,
}

impl Endpoint {
    fn new<B>(bus: Arc<B>, events: &EventsConfig, service: &'static str, interface: &'static str) -> Self
    where
        B: MethodCaller + SignalWatcher + 'static,
    {
        let caller: Arc<dyn MethodCaller> = bus.clone();
        let watcher: Arc<dyn SignalWatcher> = bus;
        let path = OwnedObjectPath::from(ObjectPath::from_static_str_unchecked(MANAGER_PATH));
        Self {
            gateway: CallGateway::new(caller.clone(), service, interface, path),
            caller,
            watcher,
            capacity: events.buffer,
        }
    }
}

fn parse_path(path: &str) -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(path)
        .map_err(|e| Error::InvalidArgument(format!("bad object path '{}': {}", path, e)))
}

/// Client of the download manager object.
#[derive(Clone)]
pub struct DownloadManager {
    endpoint: Endpoint,
}

impl DownloadManager {
    /// Connect to the bus named in `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let bus = Arc::new(ZbusBus::open(&config.bus).await?);
        Ok(Self::with_bus(bus, &config.events))
    }

    /// Use an already open bus, real or fake.
    pub fn with_bus<B>(bus: Arc<B>, events: &EventsConfig) -> Self
    where
        B: MethodCaller + SignalWatcher + 'static,
    {
        Self {
            endpoint: Endpoint::new(bus, events, DOWNLOAD_SERVICE, DOWNLOAD_MANAGER_INTERFACE),
        }
    }

    /// Ask the daemon for a new download and subscribe to its signals.
    ///
    /// The download is created paused; call [`Download::start`] to begin.
    pub async fn create_download(&self, request: DownloadRequest) -> Result<Download> {
        let (hash, algorithm) = request.hash_fields();
        let args = ((
            request.url.as_str(),
            hash,
            algorithm,
            request.metadata.as_map(),
            &request.headers,
        ),);
        let path: OwnedObjectPath = self
            .endpoint
            .gateway
            .call(manager::CREATE_DOWNLOAD, &args)
            .await?;
        info!("Created download {} for {}", path.as_str(), request.url);
        self.attach_path(path).await
    }

    /// Ask the daemon for a download fetched through an MMS proxy.
    pub async fn create_mms_download(
        &self,
        url: &str,
        hostname: &str,
        port: i32,
        username: &str,
        password: &str,
    ) -> Result<Download> {
        let path: OwnedObjectPath = self
            .endpoint
            .gateway
            .call(
                manager::CREATE_MMS_DOWNLOAD,
                &(url, hostname, port, username, password),
            )
            .await?;
        info!("Created MMS download {} for {}", path.as_str(), url);
        self.attach_path(path).await
    }

    /// Throttle applied to downloads created from now on, in bytes per second.
    pub async fn default_throttle(&self) -> Result<u64> {
        self.endpoint
            .gateway
            .call(manager::DEFAULT_THROTTLE, &())
            .await
    }

    pub async fn set_default_throttle(&self, bytes_per_second: u64) -> Result<()> {
        self.endpoint
            .gateway
            .call_unit(manager::SET_DEFAULT_THROTTLE, &(bytes_per_second,))
            .await
    }

    /// Allow or forbid downloads over mobile data for every download.
    pub async fn allow_mobile_data(&self, allowed: bool) -> Result<()> {
        self.endpoint
            .gateway
            .call_unit(manager::ALLOW_GSM_DOWNLOAD, &(allowed,))
            .await
    }

    pub async fn is_mobile_data_allowed(&self) -> Result<bool> {
        self.endpoint
            .gateway
            .call(manager::IS_GSM_DOWNLOAD_ALLOWED, &())
            .await
    }

    /// Object paths of every download the daemon currently knows about.
    pub async fn all_downloads(&self) -> Result<Vec<OwnedObjectPath>> {
        self.endpoint
            .gateway
            .call(manager::GET_ALL_DOWNLOADS, &())
            .await
    }

    /// Object paths of downloads whose metadata has `name` set to `value`.
    pub async fn downloads_with_metadata(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<OwnedObjectPath>> {
        self.endpoint
            .gateway
            .call(manager::GET_ALL_DOWNLOADS_WITH_METADATA, &(name, value))
            .await
    }

    /// Build a handle for a download that already exists.
    pub async fn attach(&self, path: &str) -> Result<Download> {
        self.attach_path(parse_path(path)?).await
    }

    async fn attach_path(&self, path: OwnedObjectPath) -> Result<Download> {
        Download::new(
            self.endpoint.caller.clone(),
            self.endpoint.watcher.as_ref(),
            path,
            self.endpoint.capacity,
        )
        .await
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("gateway", &self.endpoint.gateway)
            .finish()
    }
}

/// Client of the upload manager object.
#[derive(Clone)]
pub struct UploadManager {
    endpoint: Endpoint,
}

impl UploadManager {
    pub async fn connect(config: &Config) -> Result<Self> {
        let bus = Arc::new(ZbusBus::open(&config.bus).await?);
        Ok(Self::with_bus(bus, &config.events))
    }

    pub fn with_bus<B>(bus: Arc<B>, events: &EventsConfig) -> Self
    where
        B: MethodCaller + SignalWatcher + 'static,
    {
        Self {
            endpoint: Endpoint::new(bus, events, UPLOAD_SERVICE, UPLOAD_MANAGER_INTERFACE),
        }
    }

    pub async fn create_upload(&self, request: UploadRequest) -> Result<Upload> {
        let args = ((
            request.url.as_str(),
            request.file.as_str(),
            request.metadata.as_map(),
            &request.headers,
        ),);
        let path: OwnedObjectPath = self
            .endpoint
            .gateway
            .call(manager::CREATE_UPLOAD, &args)
            .await?;
        info!(
            "Created upload {} for {} -> {}",
            path.as_str(),
            request.file,
            request.url
        );
        self.attach_path(path).await
    }

    pub async fn create_mms_upload(
        &self,
        url: &str,
        file: &str,
        hostname: &str,
        port: i32,
    ) -> Result<Upload> {
        let path: OwnedObjectPath = self
            .endpoint
            .gateway
            .call(manager::CREATE_MMS_UPLOAD, &(url, file, hostname, port))
            .await?;
        info!("Created MMS upload {} for {}", path.as_str(), file);
        self.attach_path(path).await
    }

    pub async fn attach(&self, path: &str) -> Result<Upload> {
        self.attach_path(parse_path(path)?).await
    }

    async fn attach_path(&self, path: OwnedObjectPath) -> Result<Upload> {
        Upload::new(
            self.endpoint.caller.clone(),
            self.endpoint.watcher.as_ref(),
            path,
            self.endpoint.capacity,
        )
        .await
    }
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("gateway", &self.endpoint.gateway)
            .finish()
    }
}
