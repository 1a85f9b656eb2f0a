//! Client for the Ubuntu download and upload manager daemon.
//!
//! ```no_run
//! use udm_client::{Config, DownloadManager, DownloadRequest};
//!
//! # async fn run() -> udm_client::Result<()> {
//! let manager = DownloadManager::connect(&Config::default()).await?;
//! let download = manager
//!     .create_download(DownloadRequest::new("http://example.com/file.iso"))
//!     .await?;
//! let finished = download.finished();
//! download.start().await?;
//! if let Some(path) = finished.recv().await {
//!     println!("saved to {}", path);
//! }
//! download.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod manager;
pub mod names;
pub mod request;
pub mod transfer;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventStream, Progress, TransferFailure};
pub use manager::{DownloadManager, UploadManager};
pub use names::HashAlgorithm;
pub use request::{DownloadRequest, Metadata, UploadRequest};
pub use transfer::{Download, Upload};
