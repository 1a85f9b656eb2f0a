//! Fixed names agreed with the transfer daemon.
//!
//! Service names, interfaces, method and signal members, metadata keys and
//! the digest identifiers accepted by `createDownload`. These must match the
//! daemon byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known bus name of the download daemon.
pub const DOWNLOAD_SERVICE: &str = "com.canonical.applications.Downloader";
/// Interface implemented by every download object.
pub const DOWNLOAD_INTERFACE: &str = "com.canonical.applications.Download";
/// Interface of the download manager object.
pub const DOWNLOAD_MANAGER_INTERFACE: &str = "com.canonical.applications.DownloadManager";

/// Well-known bus name of the upload daemon.
pub const UPLOAD_SERVICE: &str = "com.canonical.applications.Uploader";
/// Interface implemented by every upload object.
pub const UPLOAD_INTERFACE: &str = "com.canonical.applications.Upload";
/// Interface of the upload manager object.
pub const UPLOAD_MANAGER_INTERFACE: &str = "com.canonical.applications.UploadManager";

/// Object path of both manager objects.
pub const MANAGER_PATH: &str = "/";

/// Metadata key overriding the local destination path.
pub const LOCAL_PATH: &str = "local-path";
/// Metadata key requesting a specific object path for the new transfer.
pub const OBJECT_PATH: &str = "objectpath";
/// Metadata key holding a command executed once the download completes.
pub const POST_DOWNLOAD_COMMAND: &str = "post-download-command";

/// Members called on the manager interfaces.
pub mod manager {
    pub const CREATE_DOWNLOAD: &str = "createDownload";
    pub const CREATE_MMS_DOWNLOAD: &str = "createMmsDownload";
    pub const CREATE_UPLOAD: &str = "createUpload";
    pub const CREATE_MMS_UPLOAD: &str = "createMmsUpload";
    pub const DEFAULT_THROTTLE: &str = "defaultThrottle";
    pub const SET_DEFAULT_THROTTLE: &str = "setDefaultThrottle";
    pub const ALLOW_GSM_DOWNLOAD: &str = "allowGSMDownload";
    pub const IS_GSM_DOWNLOAD_ALLOWED: &str = "isGSMDownloadAllowed";
    pub const GET_ALL_DOWNLOADS: &str = "getAllDownloads";
    pub const GET_ALL_DOWNLOADS_WITH_METADATA: &str = "getAllDownloadsWithMetadata";
}

/// Members called on transfer objects.
pub mod object {
    pub const TOTAL_SIZE: &str = "totalSize";
    pub const PROGRESS: &str = "progress";
    pub const METADATA: &str = "metadata";
    pub const SET_METADATA: &str = "setMetadata";
    pub const HEADERS: &str = "headers";
    pub const SET_HEADERS: &str = "setHeaders";
    pub const SET_THROTTLE: &str = "setThrottle";
    pub const THROTTLE: &str = "throttle";
    pub const ALLOW_GSM_DOWNLOAD: &str = "allowGSMDownload";
    pub const IS_GSM_DOWNLOAD_ALLOWED: &str = "isGSMDownloadAllowed";
    pub const ALLOW_MOBILE_UPLOAD: &str = "allowMobileUpload";
    pub const IS_MOBILE_UPLOAD_ALLOWED: &str = "isMobileUploadAllowed";
    pub const SET_DESTINATION_DIR: &str = "setDestinationDir";
    pub const START: &str = "start";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const CANCEL: &str = "cancel";
}

/// Signals emitted by a transfer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Started,
    Paused,
    Resumed,
    Canceled,
    Finished,
    Error,
    Progress,
}

impl SignalKind {
    /// Member name of the signal on the bus.
    pub fn member(&self) -> &'static str {
        match self {
            SignalKind::Started => "started",
            SignalKind::Paused => "paused",
            SignalKind::Resumed => "resumed",
            SignalKind::Canceled => "canceled",
            SignalKind::Finished => "finished",
            SignalKind::Error => "error",
            SignalKind::Progress => "progress",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.member())
    }
}

/// Signals a download handle subscribes to, in registration order.
pub const DOWNLOAD_SIGNALS: [SignalKind; 7] = [
    SignalKind::Started,
    SignalKind::Paused,
    SignalKind::Resumed,
    SignalKind::Canceled,
    SignalKind::Finished,
    SignalKind::Error,
    SignalKind::Progress,
];

/// Signals an upload handle subscribes to. Uploads cannot be paused.
pub const UPLOAD_SIGNALS: [SignalKind; 5] = [
    SignalKind::Started,
    SignalKind::Canceled,
    SignalKind::Finished,
    SignalKind::Error,
    SignalKind::Progress,
];

/// Digest used by the daemon to verify a finished download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Identifier sent to the daemon.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!(
                "Unknown hash algorithm '{}'. Use md5, sha1, sha224, sha256, sha384 or sha512.",
                other
            )),
        }
    }
}
