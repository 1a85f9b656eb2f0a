use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use udm_client::{
    config, Config, DownloadManager, DownloadRequest, EventStream, HashAlgorithm, Metadata,
    Progress, TransferFailure, UploadManager, UploadRequest,
};

#[derive(Parser)]
#[command(name = "udm")]
#[command(author, version, about = "Client for the Ubuntu download manager", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file and follow it until it completes
    Download {
        url: String,

        /// Expected digest of the finished file
        #[arg(long)]
        hash: Option<String>,

        /// Digest algorithm (md5, sha1, sha224, sha256, sha384, sha512)
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,

        /// Where to store the finished file
        #[arg(long)]
        local_path: Option<String>,

        /// Limit in bytes per second
        #[arg(long)]
        throttle: Option<u64>,

        /// Allow the download over mobile data
        #[arg(long)]
        mobile: bool,
    },

    /// Upload a file and follow it until it completes
    Upload { url: String, file: String },

    /// List downloads known to the daemon
    List,

    /// Show or set the default download throttle
    Throttle {
        /// New default in bytes per second, 0 = unlimited
        #[arg(long)]
        set: Option<u64>,
    },

    /// Configure settings
    Config {
        /// Default throttle for new downloads
        #[arg(long)]
        throttle: Option<u64>,

        /// Allow downloads over mobile data by default (true/false)
        #[arg(long)]
        mobile: Option<bool>,

        /// Default digest algorithm
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("udm=debug,udm_client=debug")
    } else {
        EnvFilter::new(format!("udm={level},udm_client={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(cli.verbose, &config.logging.level.to_ascii_lowercase());

    match cli.command {
        Commands::Download {
            url,
            hash,
            algorithm,
            local_path,
            throttle,
            mobile,
        } => {
            let mut metadata = Metadata::new();
            if let Some(path) = local_path {
                metadata.set_local_path(path);
            }
            let mut request = DownloadRequest::new(url).with_metadata(metadata);
            match (hash, algorithm) {
                (Some(hash), algorithm) => {
                    request =
                        request.with_hash(hash, algorithm.unwrap_or(config.transfer.algorithm));
                }
                (None, Some(_)) => bail!("--algorithm requires --hash"),
                (None, None) => {}
            }

            let manager = DownloadManager::connect(&config)
                .await
                .context("Failed to reach the download daemon")?;
            let download = manager.create_download(request).await?;

            let throttle = throttle.unwrap_or(config.transfer.throttle);
            if throttle > 0 {
                download.set_throttle(throttle).await?;
            }
            download
                .allow_mobile_download(mobile || config.transfer.allow_mobile_data)
                .await?;
            download.start().await?;

            let outcome = follow(
                "Download",
                download.finished(),
                download.canceled(),
                download.errors(),
                download.download_progress(),
                || async { download.cancel().await },
            )
            .await;
            download.close().await;
            println!("{}", outcome?);
        }

        Commands::Upload { url, file } => {
            let manager = UploadManager::connect(&config)
                .await
                .context("Failed to reach the upload daemon")?;
            let upload = manager
                .create_upload(UploadRequest::new(url, file))
                .await?;
            upload.start().await?;

            let outcome = follow(
                "Upload",
                upload.finished(),
                upload.canceled(),
                upload.errors(),
                upload.upload_progress(),
                || async { upload.cancel().await },
            )
            .await;
            upload.close().await;
            println!("{}", outcome?);
        }

        Commands::List => {
            let manager = DownloadManager::connect(&config).await?;
            let downloads = manager.all_downloads().await?;
            if downloads.is_empty() {
                println!("No downloads.");
            }
            for path in downloads {
                println!("{}", path.as_str());
            }
        }

        Commands::Throttle { set } => {
            let manager = DownloadManager::connect(&config).await?;
            if let Some(bytes) = set {
                manager.set_default_throttle(bytes).await?;
                info!("Default throttle set to {} bytes/s", bytes);
            }
            println!("{}", manager.default_throttle().await?);
        }

        Commands::Config {
            throttle,
            mobile,
            algorithm,
            log_level,
            show,
        } => {
            if show {
                config::show()?;
            } else {
                config::update(throttle, mobile, algorithm, log_level)?;
            }
        }
    }

    Ok(())
}

/// Wait for a terminal event, logging progress on the way.
///
/// Ctrl-C cancels the transfer and keeps waiting for the daemon to confirm.
/// Fails once every terminal stream has closed without an event.
async fn follow<F, Fut>(
    what: &str,
    finished: EventStream<String>,
    canceled: EventStream<bool>,
    errors: EventStream<TransferFailure>,
    progress: EventStream<Progress>,
    cancel: F,
) -> anyhow::Result<String>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = udm_client::Result<()>>,
{
    let mut interrupted = false;
    let (mut finished_open, mut canceled_open, mut errors_open, mut progress_open) =
        (true, true, true, true);

    loop {
        if !(finished_open || canceled_open || errors_open) {
            bail!("{} events stopped before it completed", what);
        }
        tokio::select! {
            event = finished.recv(), if finished_open => match event {
                Some(path) => return Ok(path),
                None => finished_open = false,
            },
            event = canceled.recv(), if canceled_open => match event {
                Some(_) => bail!("{} canceled", what),
                None => canceled_open = false,
            },
            event = errors.recv(), if errors_open => match event {
                Some(failure) => bail!("{} failed: {}", what, failure),
                None => errors_open = false,
            },
            event = progress.recv(), if progress_open => match event {
                Some(report) => info!("{}: {}", what, report),
                None => progress_open = false,
            },
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result?;
                interrupted = true;
                warn!("Interrupted, cancelling {}", what.to_lowercase());
                cancel().await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use udm_client::bus::{FakeBus, SignalFilter};
    use udm_client::config::EventsConfig;
    use udm_client::names::{DOWNLOAD_INTERFACE, DOWNLOAD_SERVICE};

    const PATH: &str = "/downloads/1";

    async fn attached(bus: &Arc<FakeBus>) -> udm_client::Download {
        DownloadManager::with_bus(bus.clone(), &EventsConfig::default())
            .attach(PATH)
            .await
            .unwrap()
    }

    async fn follow_download(download: &udm_client::Download) -> anyhow::Result<String> {
        follow(
            "Download",
            download.finished(),
            download.canceled(),
            download.errors(),
            download.download_progress(),
            || async { Ok(()) },
        )
        .await
    }

    #[tokio::test]
    async fn test_follow_fails_when_streams_close_without_outcome() {
        let bus = Arc::new(FakeBus::new());
        let download = attached(&bus).await;
        download.release();

        let outcome = tokio::time::timeout(Duration::from_secs(1), follow_download(&download))
            .await
            .expect("follow should give up once the streams are closed");
        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("stopped before it completed"));
    }

    #[tokio::test]
    async fn test_follow_returns_finished_path() {
        let bus = Arc::new(FakeBus::new());
        let download = attached(&bus).await;
        let origin = SignalFilter::new(DOWNLOAD_SERVICE, DOWNLOAD_INTERFACE, "progress", PATH);
        bus.emit(&origin, &(10u64, 20u64)).unwrap();
        let origin = SignalFilter::new(DOWNLOAD_SERVICE, DOWNLOAD_INTERFACE, "finished", PATH);
        bus.emit(&origin, &("/tmp/f.bin",)).unwrap();

        let path = tokio::time::timeout(Duration::from_secs(1), follow_download(&download))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path, "/tmp/f.bin");
    }
}
