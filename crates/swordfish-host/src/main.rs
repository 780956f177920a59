//! SwordFish host entry point.
//!
//! Finds the device, opens a comm session and polls the firmware version
//! until interrupted.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML config, defaults on first run
//!  └─ PortFinder               -- configured port, or discovery + probe
//!  └─ CommSession::open()
//!  └─ monitor loop             -- VersionData request every interval
//!       └─ spawn_blocking      -- serial I/O never blocks the runtime
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use swordfish_core::{CatalogMessage, VersionData};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swordfish_host::application::comm_session::{CommError, CommSession};
use swordfish_host::application::port_finder::PortFinder;
use swordfish_host::application::transport::SerialBackend;
use swordfish_host::infrastructure::serial::native::NativeSerialBackend;
use swordfish_host::infrastructure::storage::config::{self, HostConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config first: it carries the default log level.
    let (config, config_error) = match config::load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (HostConfig::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!("SwordFish host starting");
    if let Some(e) = config_error {
        warn!("using default configuration: {e}");
    }

    let backend: Arc<dyn SerialBackend> = Arc::new(NativeSerialBackend::new());
    let finder = PortFinder::new(Arc::clone(&backend), config.discovery_settings());

    // ── Port selection ────────────────────────────────────────────────────────
    let port_path = match config.serial.port.clone() {
        Some(path) => {
            info!("using configured port {path}");
            path
        }
        None => {
            let candidate = tokio::task::spawn_blocking(move || {
                info!("\n{}", finder.port_report());
                finder.find_probable_port()
            })
            .await?
            .context("SwordFish device discovery failed")?;
            candidate.path
        }
    };

    // ── Session ───────────────────────────────────────────────────────────────
    let session_config = config.session_config();
    let mut session = {
        let backend = Arc::clone(&backend);
        let path = port_path.clone();
        tokio::task::spawn_blocking(move || {
            CommSession::open(backend.as_ref(), &path, session_config)
        })
        .await?
        .with_context(|| format!("failed to open {port_path}"))?
    };
    session.set_unsolicited_handler(|envelope| {
        info!(
            message_id = envelope.message_id(),
            "unsolicited {}",
            envelope.message_type()
        );
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("SwordFish host ready on {port_path}.  Press Ctrl-C to exit.");

    // ── Monitor loop ──────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(config.monitor_interval());
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = session.request::<VersionData>(VersionData::empty());
            (session, result)
        })
        .await?;
        session = returned;

        match result {
            Ok(version) => info!(
                tx = session.tx_counter(),
                rx = session.rx_counter(),
                strays = session.stray_counter(),
                "{}",
                version.describe()
            ),
            Err(e @ CommError::Timeout { .. }) => warn!(
                tx = session.tx_counter(),
                rx = session.rx_counter(),
                "{e}"
            ),
            Err(e) => {
                error!("exchange failed: {e}");
                if !session.is_open() {
                    break;
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || session.close()).await?;
    info!("SwordFish host stopped");
    Ok(())
}
