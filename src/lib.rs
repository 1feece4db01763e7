// Module declarations for the application's core components
pub mod channels;       // Inter-component communication channels
pub mod config;         // Configuration management
pub mod datalog_writer; // Status record logging to file
pub mod error;          // Error handling and types
pub mod inverter;       // Inverter link: framing, polling, shared store
pub mod options;        // Command line options parsing
pub mod prelude;        // Common imports and types
pub mod scheduler;      // Periodic consumer tasks
pub mod snapshot;       // Status snapshots for logs and clients
pub mod utils;          // Utility functions

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use crate::datalog_writer::DatalogWriter;
use crate::inverter::poller::PollStats;
use crate::inverter::transport;
use crate::scheduler::Scheduler;
use crate::snapshot::StatusDocument;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialises env_logger with the bridge's line format. `RUST_LOG` wins
/// over `default_level` when set.
pub fn init_logging(default_level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Builds the consumer-side schedule: client status document, diagnostics
/// snapshot. Tasks only ever touch the store's copy-out accessors.
pub fn consumer_scheduler(config: &ConfigWrapper, store: &TelemetryStore, demo: &DemoSwitch) -> Scheduler {
    let status_store = store.clone();
    let status_demo = demo.clone();
    let diag_store = store.clone();

    Scheduler::new()
        .every("status", config.snapshot_interval(), move || {
            let document = StatusDocument::new(&status_store.snapshot(), status_demo.is_enabled());
            debug!("status {}", document.to_json()?);
            Ok(())
        })
        .every("diagnostics", config.diagnostics_interval(), move || {
            snapshot::log_snapshot(&diag_store.snapshot());
            Ok(())
        })
}

/// Main application entry point
///
/// Starts the poller on its own task, runs the consumer schedule, and waits
/// for `shutdown_rx` (Ctrl+C or the runtime limit) before stopping both.
pub async fn app(
    mut shutdown_rx: broadcast::Receiver<()>,
    config: ConfigWrapper,
) -> Result<Arc<Mutex<PollStats>>> {
    info!("voltronic-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();
    let store = TelemetryStore::new();
    let demo = DemoSwitch::new(config.demo_mode());
    let inverter_config = config.inverter();

    // The serial link is owned by the poller and nothing else
    let link = match inverter_config.port() {
        Some(port) => match transport::open_serial(port, inverter_config.baud_rate()) {
            Ok(link) => Some(link),
            Err(e) if demo.is_enabled() => {
                warn!("{}; continuing in demo mode", e);
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let datalog_handle = match config.datalog_file() {
        Some(path) => {
            info!("  Starting datalog writer...");
            let writer = DatalogWriter::new(&path)?;
            let (receiver, store) = (channels.from_poller.subscribe(), store.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = writer.start(receiver, store).await {
                    error!("Datalog writer failed: {}", e);
                }
            }))
        }
        None => None,
    };

    let mut poller = Poller::new(
        link,
        store.clone(),
        demo.clone(),
        inverter_config.poll_settings(),
        channels.clone(),
    );
    let stats = poller.shared_stats();

    info!("  Starting poller...");
    let poller_handle = tokio::spawn(async move {
        if let Err(e) = poller.start().await {
            error!("Poller task failed: {}", e);
        }
    });

    info!("  Starting scheduler...");
    let scheduler = consumer_scheduler(&config, &store, &demo);
    let scheduler_handle = tokio::spawn(scheduler.start(channels.shutdown.subscribe()));

    info!("Waiting for shutdown signal...");
    let _ = shutdown_rx.recv().await;

    info!("Shutdown signal received, stopping components...");
    let _ = channels.shutdown.send(());

    if let Err(e) = poller_handle.await {
        error!("Error waiting for poller task: {}", e);
    }
    match scheduler_handle.await {
        Ok(Err(e)) => error!("Scheduler task failed: {}", e),
        Err(e) => error!("Error waiting for scheduler task: {}", e),
        Ok(Ok(())) => {}
    }
    if let Some(handle) = datalog_handle {
        if let Err(e) = handle.await {
            error!("Error waiting for datalog task: {}", e);
        }
    }

    if let Ok(summary) = stats.lock() {
        summary.print_summary();
    }
    info!("Shutdown complete");

    Ok(stats)
}

/// Application entry point
///
/// Sets up logging, loads configuration (applying command line overrides),
/// installs the Ctrl+C and runtime-limit triggers and runs `app`.
pub async fn run(options: Options) -> Result<()> {
    // env_logger lets everything through and log's max level does the
    // filtering, so the config file's loglevel can still apply after startup
    let env_filter = std::env::var_os("RUST_LOG").is_some();
    init_logging("trace");
    if !env_filter {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = ConfigWrapper::new(options.config_file.clone())?;
    if options.demo {
        config.set_demo_mode(true);
    }
    config.validate()?;

    if !env_filter {
        if let Ok(level) = config.loglevel().parse::<log::LevelFilter>() {
            log::set_max_level(level);
        }
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    if let Some(secs) = options.runtime {
        info!("Runtime limit: {}s", secs);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = shutdown_tx.send(());
        });
    }

    app(shutdown_rx, config).await?;

    Ok(())
}
