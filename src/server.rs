//! Server runtime.
//!
//! [`ServerHandle`] wires the state store, session registry, command sender
//! and router together, then runs the OCPP listener and the admin API until
//! shutdown.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::commands::{
    create_command_sender, RefreshService, SharedCommandSender, SharedRefreshService,
};
use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::handlers::create_ocpp16_router;
use crate::application::session::{SessionRegistry, SharedSessionRegistry};
use crate::application::state::{SharedStateStore, StateStore};
use crate::config::{AppConfig, Config};
use crate::interfaces::http::{create_api_router, ApiState};
use crate::interfaces::ws::OcppServer;
use crate::shared::{ShutdownCoordinator, ShutdownSignal};

/// Options for starting the central system.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub config: AppConfig,
}

/// Handle to a running central system.
///
/// ```rust,no_run
/// use thor_ocpp::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub state: SharedStateStore,
    pub event_bus: SharedEventBus,
    pub session_registry: SharedSessionRegistry,
    pub command_sender: SharedCommandSender,
    pub refresh: SharedRefreshService,
    pub config: AppConfig,
    /// Port the OCPP listener is bound to.
    pub ws_port: u16,
    /// Port of the admin API, if enabled.
    pub api_port: Option<u16>,

    shutdown: ShutdownCoordinator,
    ws_task: JoinHandle<()>,
    api_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        // Not validated here: tests bind port 0. `AppConfig::load` validates.
        let app_cfg = opts.config;

        info!("Starting THOR OCPP central system...");

        let prometheus = prometheus_handle()?;
        let config = Config::from(&app_cfg);

        let event_bus = create_event_bus();
        let state = Arc::new(StateStore::new(event_bus.clone()));
        let session_registry = SessionRegistry::shared(config.max_sessions);
        let command_sender = create_command_sender(session_registry.clone(), config.call_timeout);
        let router = create_ocpp16_router(command_sender.clone());
        let refresh = Arc::new(RefreshService::new(
            session_registry.clone(),
            command_sender.clone(),
            state.clone(),
        ));
        info!(actions = ?router.actions(), "OCPP 1.6 router ready");

        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── OCPP WebSocket listener ────────────────────────────
        let ws_listener = TcpListener::bind(config.address()).await?;
        let ws_port = ws_listener.local_addr()?.port();
        let server = OcppServer::new(
            config,
            session_registry.clone(),
            command_sender.clone(),
            router,
            state.clone(),
        )
        .with_shutdown(shutdown_signal.clone());

        let ws_task = tokio::spawn(async move {
            if let Err(e) = server.serve(ws_listener).await {
                error!("WebSocket server error: {}", e);
            }
        });

        // ── Admin API ──────────────────────────────────────────
        let (api_task, api_port) = if app_cfg.api.enabled {
            let api_router = create_api_router(ApiState {
                state: state.clone(),
                session_registry: session_registry.clone(),
                refresh: refresh.clone(),
                prometheus,
                started_at: Arc::new(Instant::now()),
            });

            let api_addr = format!("{}:{}", app_cfg.api.host, app_cfg.api.port);
            let listener = TcpListener::bind(&api_addr).await?;
            let api_port = listener.local_addr()?.port();
            info!("Admin API listening on http://{}", api_addr);

            let api_shutdown = shutdown_signal.clone();
            let task = tokio::spawn(async move {
                let result = axum::serve(listener, api_router)
                    .with_graceful_shutdown(async move {
                        api_shutdown.wait().await;
                        info!("🛑 Admin API received shutdown signal");
                    })
                    .await;
                if let Err(e) = result {
                    error!("Admin API server error: {}", e);
                }
            });
            (Some(task), Some(api_port))
        } else {
            info!("Admin API disabled");
            (None, None)
        };

        info!("🚀 All servers started.");

        Ok(Self {
            state,
            event_bus,
            session_registry,
            command_sender,
            refresh,
            config: app_cfg,
            ws_port,
            api_port,
            shutdown,
            ws_task,
            api_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install SIGTERM / SIGINT listeners that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Block until shutdown is signalled and the servers have stopped, or
    /// the shutdown timeout elapsed.
    pub async fn wait(self) {
        let Self {
            shutdown,
            ws_task,
            api_task,
            ..
        } = self;

        shutdown
            .shutdown_with_cleanup(|| async move {
                if let Err(e) = ws_task.await {
                    error!("WebSocket server task panicked: {}", e);
                }
                if let Some(task) = api_task {
                    if let Err(e) = task.await {
                        error!("Admin API task panicked: {}", e);
                    }
                }
            })
            .await;

        info!("👋 THOR OCPP shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down...");
        self.trigger_shutdown();
        self.wait().await;
    }
}

/// The global recorder can be installed once per process; later calls
/// reuse its handle.
fn prometheus_handle() -> Result<PrometheusHandle, BuildError> {
    static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("📊 Prometheus metrics recorder installed");
    Ok(PROM_HANDLE.get_or_init(|| handle).clone())
}

/// Initialize tracing from the application config. Call once at startup.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_on_ephemeral_ports_and_stops() {
        let mut config = AppConfig::default();
        config.server.ws_host = "127.0.0.1".into();
        config.server.ws_port = 0;
        config.api.port = 0;
        config.server.shutdown_timeout = 5;

        let handle = ServerHandle::start(ServerOptions { config }).await.unwrap();
        assert_ne!(handle.ws_port, 0);
        assert!(handle.api_port.is_some_and(|p| p != 0));
        assert!(!handle.state.snapshot().connected);

        tokio::time::timeout(std::time::Duration::from_secs(10), handle.shutdown())
            .await
            .unwrap();
    }
}
