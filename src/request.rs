//! Parameters for creating transfers.

use std::collections::HashMap;
use zbus::zvariant::{ObjectPath, Value};

use crate::error::{Error, Result};
use crate::names::{HashAlgorithm, LOCAL_PATH, OBJECT_PATH, POST_DOWNLOAD_COMMAND};

/// Free-form `a{sv}` metadata attached to a new transfer.
///
/// The daemon interprets a few keys itself (see the setters); everything
/// else is stored and handed back by `metadata()`.
#[derive(Debug, Default)]
pub struct Metadata {
    entries: HashMap<String, Value<'static>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value<'static>>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Store the finished file at `path` instead of the default location.
    pub fn set_local_path(&mut self, path: impl Into<String>) -> &mut Self {
        let path: String = path.into();
        self.insert(LOCAL_PATH, path)
    }

    /// Ask the daemon to export the transfer at `path`.
    pub fn set_object_path(&mut self, path: &str) -> Result<&mut Self> {
        ObjectPath::try_from(path)
            .map_err(|e| Error::InvalidArgument(format!("bad object path '{}': {}", path, e)))?;
        Ok(self.insert(OBJECT_PATH, path.to_string()))
    }

    /// Command run by the daemon once the download completed.
    pub fn set_post_download_command(&mut self, argv: Vec<String>) -> &mut Self {
        self.insert(POST_DOWNLOAD_COMMAND, Value::from(argv))
    }

    pub fn get(&self, key: &str) -> Option<&Value<'static>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn as_map(&self) -> &HashMap<String, Value<'static>> {
        &self.entries
    }
}

/// What `createDownload` needs to know.
#[derive(Debug)]
pub struct DownloadRequest {
    pub url: String,
    /// Expected digest of the finished file, checked by the daemon.
    pub hash: Option<(String, HashAlgorithm)>,
    pub metadata: Metadata,
    /// Extra HTTP headers sent with the request.
    pub headers: HashMap<String, String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hash: None,
            metadata: Metadata::default(),
            headers: HashMap::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        self.hash = Some((hash.into(), algorithm));
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Hash and algorithm as sent on the wire; both empty when unchecked.
    pub(crate) fn hash_fields(&self) -> (&str, &str) {
        match &self.hash {
            Some((hash, algorithm)) => (hash.as_str(), algorithm.as_str()),
            None => ("", ""),
        }
    }
}

/// What `createUpload` needs to know.
#[derive(Debug)]
pub struct UploadRequest {
    pub url: String,
    /// Local file to send.
    pub file: String,
    pub metadata: Metadata,
    pub headers: HashMap<String, String>,
}

impl UploadRequest {
    pub fn new(url: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            metadata: Metadata::default(),
            headers: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
