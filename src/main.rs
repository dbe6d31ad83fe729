//! TableManager - slot-based window arranger for multi-table play
//!
//! Application entry point: logging, configuration, the table manager and
//! signal-driven shutdown.

use std::sync::Arc;
use tablemanager::{
    config::{Config, SharedConfig},
    logging::{init_logging, LogConfig},
    platform::{ensure_available, SystemInputProvider, SystemWindowProvider},
    services::TableManager,
    ui::TableListView,
    Result, TableManagerError,
};
use tokio::{signal, sync::broadcast};
use tracing::{debug, error, info, instrument, warn};

/// Application state
pub struct TableManagerApp {
    manager: Arc<TableManager>,
    view: TableListView,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl TableManagerApp {
    #[instrument(skip_all)]
    pub fn new() -> Result<Self> {
        let log_config = LogConfig::from_env();
        init_logging(&log_config).map_err(|e| {
            TableManagerError::ConfigurationError(format!("Failed to initialize logging: {}", e))
        })?;

        info!("TableManager v{}", env!("CARGO_PKG_VERSION"));

        let path = Config::default_path();
        let config = Config::load_or_default(&path).map_err(|e| {
            error!(path = %path.display(), "Invalid configuration: {}", e);
            TableManagerError::ConfigurationError(e.to_string())
        })?;
        let shared = SharedConfig::new(config)
            .map_err(|e| TableManagerError::ConfigurationError(e.to_string()))?;

        let windows = Arc::new(SystemWindowProvider::new());
        let input = Arc::new(SystemInputProvider::new());
        ensure_available(windows.as_ref()).map_err(|e| {
            error!(error = %e, "No window backend is available on this platform");
            e
        })?;
        let manager = Arc::new(TableManager::new(shared, windows, input)?);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Ok(Self {
            manager,
            view: TableListView::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    #[instrument(skip_all)]
    pub async fn run(&mut self) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::setup_signal_handlers(shutdown_tx).await {
                error!("Failed to setup signal handlers: {}", e);
            }
        });

        self.manager.start()?;
        let mut snapshots = self.manager.subscribe_snapshots();
        info!(profile = %self.manager.active_profile(), "TableManager is running");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        warn!("Snapshot channel closed");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if self.view.apply(&snapshot) {
                        debug!(
                            generation = snapshot.generation,
                            tables = self.view.rows().len(),
                            "Table list refreshed"
                        );
                    }
                }
            }
        }

        self.manager.stop().await;
        info!("TableManager shutdown complete");
        Ok(())
    }

    async fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                res = signal::ctrl_c() => {
                    match res {
                        Ok(_) => info!("Received SIGINT (Ctrl+C)"),
                        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                    }
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(_) => info!("Received Ctrl+C"),
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
        }

        if shutdown_tx.send(()).is_err() {
            warn!("Failed to send shutdown signal - no receivers");
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let mut app = match TableManagerApp::new() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("TableManager failed to start: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}
