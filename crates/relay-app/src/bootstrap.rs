use std::sync::Arc;

use crate::collaborators::{
    AcceptAllDuplicates, FsUnwantedCleaner, TracingMessenger, TracingReclaim,
};
use crate::connector::{EngineAvailability, EngineConnector, EngineFactory, LiveEngineFactory};
use crate::context::ListenerContext;
use crate::error::{AppError, AppResult};
use crate::listener::Aria2Listener;
use relay_config::BotConfig;
use relay_core::{MemoryReclaim, TaskDict};
use relay_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, build_sha, init_logging};
use tracing::{debug, info, warn};

/// Dependencies required to bootstrap the relay.
pub(crate) struct BootstrapDependencies {
    config: BotConfig,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            BotConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self { config, metrics })
    }
}

/// Running engine connections plus the listener bound to engine A.
pub struct Relay {
    connector: Arc<EngineConnector>,
    listener: Aria2Listener,
    ctx: ListenerContext,
    availability: EngineAvailability,
}

impl Relay {
    /// Connect the engines and bind the notification handlers.
    ///
    /// The listener is only registered when engine A came up.
    pub async fn start(
        factory: Arc<dyn EngineFactory>,
        ctx: ListenerContext,
        reclaim: Arc<dyn MemoryReclaim>,
    ) -> Self {
        let connector = Arc::new(EngineConnector::new(factory, reclaim, ctx.metrics.clone()));
        let availability = connector.initiate().await;
        let listener = Aria2Listener::new(Arc::clone(&connector), ctx.clone());
        if let Some(aria2) = connector.aria2().await {
            listener.register(&aria2.notifications());
        } else {
            warn!("aria2 unavailable; download notifications will not be handled");
        }
        Self {
            connector,
            listener,
            ctx,
            availability,
        }
    }

    /// Engine connector shared with the handlers.
    #[must_use]
    pub fn connector(&self) -> Arc<EngineConnector> {
        Arc::clone(&self.connector)
    }

    /// Notification handlers.
    #[must_use]
    pub fn listener(&self) -> Aria2Listener {
        self.listener.clone()
    }

    /// Engines that connected during startup.
    #[must_use]
    pub const fn availability(&self) -> EngineAvailability {
        self.availability
    }

    /// Raise the stop-all flag and close both engines.
    pub async fn shutdown(&self) {
        self.ctx.stop.set();
        self.connector.close_all().await;
        match self.ctx.metrics.render() {
            Ok(rendered) => debug!(metrics = %rendered, "final metrics"),
            Err(err) => warn!(error = %err, "metrics render failed"),
        }
    }
}

/// Entry point for the relay boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, or the shutdown signal fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies { config, metrics } = dependencies;
    let logging = LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: build_sha(),
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    info!(download_dir = %config.download_dir, "relay bootstrap starting");

    let mut ctx = ListenerContext::new(
        TaskDict::new(),
        Arc::new(TracingMessenger::default()),
        Arc::new(AcceptAllDuplicates),
        Arc::new(FsUnwantedCleaner),
        metrics,
    );
    if let Some(base_url) = &config.base_url {
        ctx = ctx.with_base_url(base_url.as_str());
    }
    let factory = Arc::new(LiveEngineFactory::new(
        config.aria2.clone(),
        config.qbit.clone(),
    ));
    let relay = Relay::start(factory, ctx, Arc::new(TracingReclaim)).await;

    let signal = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    relay.shutdown().await;
    signal.map_err(|err| AppError::io("signal.ctrl_c", err))?;
    info!("relay shutdown complete");
    Ok(())
}
