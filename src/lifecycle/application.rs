//! Application Bootstrap
//!
//! Wires configuration, module resolution, Phase 1, Phase 2 and shutdown
//! into one startup sequence.

use super::{HookScheduler, HookStatusMap, Phase2Report, ShutdownCoordinator, ShutdownReport, shutdown_signal};
use crate::config::LifecycleConfig;
use crate::di::ServiceContainer;
use crate::error::{ModstrapError, Result};
use crate::module::{ModuleDescriptor, ModuleResolver, ModuleStatusReport, Phase1Runner};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Reports of a full teardown. A pass that did not run is `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownOutcome {
    pub graceful: Option<ShutdownReport>,
    pub forced: Option<ShutdownReport>,
}

/// A started application
///
/// # Example
///
/// ```rust,no_run
/// use modstrap::lifecycle::Application;
///
/// #[tokio::main]
/// async fn main() {
///     let app = match Application::builder().start().await {
///         Ok(app) => app,
///         Err(e) => {
///             eprintln!("startup failed: {e}");
///             std::process::exit(1);
///         }
///     };
///
///     // Serve...
///
///     app.wait_for_shutdown().await;
/// }
/// ```
pub struct Application {
    run_id: Uuid,
    config: LifecycleConfig,
    container: Arc<ServiceContainer>,
    scheduler: Arc<HookScheduler>,
    shutdown: Arc<ShutdownCoordinator>,
    module_status: ModuleStatusReport,
    phase2_report: Phase2Report,
    cancel: CancellationToken,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    pub fn scheduler(&self) -> &Arc<HookScheduler> {
        &self.scheduler
    }

    pub fn get_module_status(&self) -> &ModuleStatusReport {
        &self.module_status
    }

    pub fn get_phase2_report(&self) -> &Phase2Report {
        &self.phase2_report
    }

    pub fn hook_statuses(&self) -> HookStatusMap {
        self.scheduler.statuses()
    }

    /// `true` if any module or hook did not come up cleanly.
    pub fn is_degraded(&self) -> bool {
        self.module_status.is_degraded() || self.phase2_report.is_degraded()
    }

    /// Combined snapshot for a health endpoint.
    pub fn status_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "degraded": self.is_degraded(),
            "modules": self.module_status,
            "phase2": self.phase2_report,
            "hooks": self.hook_statuses().snapshot(),
        })
    }

    /// Graceful shutdown, escalating to forced shutdown if the graceful
    /// deadline is exceeded.
    ///
    /// Entries are consumed, so calling this twice runs nothing the second
    /// time.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        tracing::info!(run_id = %self.run_id, "Shutting down application...");
        self.cancel.cancel();

        let graceful = self
            .shutdown
            .graceful_shutdown(self.config.graceful_shutdown_timeout)
            .await;
        let forced = if graceful.deadline_exceeded {
            tracing::warn!("Graceful shutdown exceeded its deadline, forcing");
            Some(self.run_forced().await)
        } else {
            None
        };

        self.finish();
        ShutdownOutcome {
            graceful: Some(graceful),
            forced,
        }
    }

    /// Skip the graceful pass and run forced entries only.
    pub async fn force_shutdown(&self) -> ShutdownReport {
        self.cancel.cancel();
        let report = self.run_forced().await;
        self.finish();
        report
    }

    /// Wait for Ctrl+C or SIGTERM, then shut down.
    ///
    /// A second signal during the graceful pass interrupts it and runs the
    /// forced pass instead.
    pub async fn wait_for_shutdown(&self) -> ShutdownOutcome {
        self.shutdown_on(shutdown_signal).await
    }

    /// Like [`wait_for_shutdown`](Self::wait_for_shutdown) with a custom
    /// signal source. `signal` is called once for the first signal and again
    /// for the escalation signal.
    ///
    /// On escalation the running graceful entry is aborted and the remaining
    /// ones are skipped. The partial graceful report is still returned.
    pub async fn shutdown_on<S, Fut>(&self, mut signal: S) -> ShutdownOutcome
    where
        S: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        signal().await;
        tracing::info!(run_id = %self.run_id, "Shutdown signal received");
        self.cancel.cancel();

        let escalate = CancellationToken::new();
        let graceful = self
            .shutdown
            .graceful_shutdown_until(self.config.graceful_shutdown_timeout, escalate.clone());
        tokio::pin!(graceful);
        let second = signal();

        let report = tokio::select! {
            report = &mut graceful => report,
            _ = second => {
                tracing::warn!("Second shutdown signal received, forcing");
                escalate.cancel();
                graceful.await
            }
        };

        let forced = if report.interrupted || report.deadline_exceeded {
            if report.deadline_exceeded {
                tracing::warn!("Graceful shutdown exceeded its deadline, forcing");
            }
            Some(self.run_forced().await)
        } else {
            None
        };

        self.finish();
        ShutdownOutcome {
            graceful: Some(report),
            forced,
        }
    }

    async fn run_forced(&self) -> ShutdownReport {
        self.shutdown
            .force_shutdown(self.config.force_shutdown_timeout)
            .await
    }

    fn finish(&self) {
        self.container.clear();
        tracing::info!(run_id = %self.run_id, "Application shutdown complete");
    }
}

/// Builder for [`Application`]
#[derive(Default)]
pub struct ApplicationBuilder {
    config: Option<LifecycleConfig>,
    modules: Vec<ModuleDescriptor>,
    container: Option<Arc<ServiceContainer>>,
    cancel: Option<CancellationToken>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit settings instead of reading `MODSTRAP_*` variables.
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Start from a container pre-populated with host services.
    pub fn container(mut self, container: Arc<ServiceContainer>) -> Self {
        self.container = Some(container);
        self
    }

    /// Token that cancels Phase 2 from outside.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Resolve modules, run Phase 1 and Phase 2.
    ///
    /// # Errors
    ///
    /// Returns the fatal error if configuration is invalid, a duplicate
    /// name is registered, the hook graph has a cycle or a critical hook
    /// does not succeed. Shutdown entries registered before the failure are
    /// run before returning.
    pub async fn start(self) -> Result<Application> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("startup", %run_id);
        self.start_inner(run_id).instrument(span).await
    }

    async fn start_inner(self, run_id: Uuid) -> Result<Application> {
        let config = match self.config {
            Some(config) => config,
            None => LifecycleConfig::from_env()?,
        };
        let container = self.container.unwrap_or_default();
        let cancel = self.cancel.unwrap_or_default();
        let scheduler = Arc::new(HookScheduler::new(&config));
        let shutdown = Arc::new(ShutdownCoordinator::from_config(&config));

        tracing::info!(modules = self.modules.len(), "Starting application...");

        let resolution = ModuleResolver::new().resolve(self.modules)?;

        let mut module_status =
            match Phase1Runner::new().run(resolution, &container, &scheduler, &shutdown) {
                Ok(report) => report,
                Err(e) => return Err(abort(e, &shutdown, &config, &cancel, &container).await),
            };
        module_status.run_id = Some(run_id);

        let mut phase2_report = match scheduler.run(Arc::clone(&container), cancel.clone()).await {
            Ok(report) => report,
            Err(e) => return Err(abort(e, &shutdown, &config, &cancel, &container).await),
        };
        phase2_report.run_id = Some(run_id);

        if let Err(e) = phase2_report.check() {
            return Err(abort(e, &shutdown, &config, &cancel, &container).await);
        }

        let app = Application {
            run_id,
            config,
            container,
            scheduler,
            shutdown,
            module_status,
            phase2_report,
            cancel,
        };

        if app.is_degraded() {
            tracing::warn!(
                degraded_modules = ?app.module_status.degraded(),
                failed_hooks = ?app.phase2_report.failed,
                timed_out_hooks = ?app.phase2_report.timed_out,
                skipped_hooks = ?app.phase2_report.skipped,
                "Application started in degraded mode"
            );
        } else {
            tracing::info!("Application initialization complete");
        }
        Ok(app)
    }
}

/// Tear down whatever registered before a fatal startup error.
async fn abort(
    err: ModstrapError,
    shutdown: &ShutdownCoordinator,
    config: &LifecycleConfig,
    cancel: &CancellationToken,
    container: &ServiceContainer,
) -> ModstrapError {
    tracing::error!(error = %err, "Fatal startup error, tearing down");
    cancel.cancel();
    let report = shutdown
        .graceful_shutdown(config.graceful_shutdown_timeout)
        .await;
    if report.deadline_exceeded {
        shutdown.force_shutdown(config.force_shutdown_timeout).await;
    }
    container.clear();
    err
}
