//! Server runtime that wires a [`ChargingEngine`] to its two ingress
//! surfaces — the OCPP 1.6 WebSocket listener and the OCPP 1.5 SOAP/HTTP
//! router — behind one [`ServerHandle`] with graceful shutdown.

pub mod http;
pub mod metrics;
pub mod soap;
pub mod ws;

use std::sync::Arc;

use tracing::{error, info};

use crate::application::charging::{ChargingEngine, ChargingEngineDeps};
use crate::config::AppConfig;
use crate::infrastructure::{
    DefaultInactivityClassifier, InMemoryLocks, LoggingBilling, LoggingNotifications,
    LoggingPricing, LoggingRoaming, LoggingSmartCharging, MemoryRepositoryProvider,
    StaticTemplateCatalog,
};
use crate::support::shutdown::ShutdownCoordinator;
use crate::support::{ShutdownSignal, SystemClock};

/// Options for starting the OCPP Central System.
pub struct ServerOptions {
    pub config: AppConfig,
}

/// Handle to a running OCPP Central System: the charging engine plus the
/// two spawned ingress tasks and the shutdown coordinator that ties them
/// together.
pub struct ServerHandle {
    pub engine: Arc<ChargingEngine>,
    pub config: AppConfig,

    shutdown: ShutdownCoordinator,
    ws_task: tokio::task::JoinHandle<()>,
    api_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Start the OCPP Central System with the given options: installs the
    /// Prometheus recorder, wires the reference in-memory collaborators,
    /// and spawns the WebSocket and SOAP/HTTP ingress tasks.
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let config = opts.config;

        info!("starting OCPP Central System");

        // The global metrics recorder can only be installed once per
        // process; reuse it across a stop/start cycle within one process.
        use std::sync::OnceLock;
        static PROM_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();
        let prometheus_handle = PROM_HANDLE
            .get_or_init(|| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .install_recorder()
                    .expect("failed to install Prometheus metrics recorder")
            })
            .clone();

        let repos: Arc<dyn crate::domain::RepositoryProvider> = Arc::new(MemoryRepositoryProvider::new());

        let deps = ChargingEngineDeps {
            repos,
            pricing: Arc::new(LoggingPricing),
            billing: Arc::new(LoggingBilling),
            roaming: Arc::new(LoggingRoaming),
            smart_charging: Arc::new(LoggingSmartCharging),
            notifications: Arc::new(LoggingNotifications),
            locks: Arc::new(InMemoryLocks::new()),
            template_catalog: Arc::new(StaticTemplateCatalog),
            inactivity_classifier: Arc::new(DefaultInactivityClassifier),
            clock: Arc::new(SystemClock),
        };
        let engine = Arc::new(ChargingEngine::new(deps, config.clone()));

        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout_secs);
        let shutdown_signal = shutdown.signal();

        let ws_addr = config.server.ws_address();
        let ws_engine = engine.clone();
        let ws_shutdown = shutdown_signal.clone();
        let ws_task = tokio::spawn(async move {
            let server = ws::WsServer::new(ws_engine, ws_shutdown);
            if let Err(e) = server.run(&ws_addr).await {
                error!(error = %e, "WebSocket ingress stopped with an error");
            }
        });

        let api_addr = config.server.api_address();
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        info!("SOAP/HTTP ingress listening on http://{api_addr}");
        let router = http::build_router(&config, engine.clone(), prometheus_handle);
        let api_shutdown = shutdown_signal.clone();
        let api_task = tokio::spawn(async move {
            let serve = axum::serve(listener, router.into_make_service());
            if let Err(e) = serve
                .with_graceful_shutdown(async move { api_shutdown.wait().await })
                .await
            {
                error!(error = %e, "SOAP/HTTP ingress stopped with an error");
            }
        });

        info!("OCPP Central System started");

        Ok(Self { engine, config, shutdown, ws_task, api_task })
    }

    /// A cloneable shutdown signal other components can `wait()` on.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM/SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown without blocking on it.
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for both ingress tasks to finish and drain the engine's
    /// deferred-work scheduler, bounded by the configured shutdown timeout.
    pub async fn wait(self) {
        info!("waiting for ingress tasks to stop");

        tokio::select! {
            result = self.ws_task => {
                if let Err(e) = result {
                    error!(error = %e, "WebSocket ingress task panicked");
                }
            }
            result = self.api_task => {
                if let Err(e) = result {
                    error!(error = %e, "SOAP/HTTP ingress task panicked");
                }
            }
        }

        self.engine
            .drain(std::time::Duration::from_secs(self.config.server.shutdown_timeout_secs))
            .await;

        info!("OCPP Central System shutdown complete");
    }
}

/// Initialize tracing (logging) from the application config. Call once at
/// process startup, before [`ServerHandle::start`].
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
