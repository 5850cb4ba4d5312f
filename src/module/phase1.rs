//! Phase 1: synchronous module registration.
//!
//! Modules run strictly one at a time in resolved order. Each one gets a
//! [`Registrar`] that stages its services and hooks; they are committed to
//! the container and scheduler only when the module's entry returns `Ok`.

use super::{ModuleStatus, ModuleStatusReport, Resolution};
use crate::di::{ServiceContainer, ServiceInstance};
use crate::error::{ModstrapError, Result};
use crate::lifecycle::{HookDescriptor, HookScheduler, OnModuleDestroy, ShutdownCoordinator};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Registration handle passed to a module's Phase 1 entry.
///
/// Lookups through [`get`](Self::get) and [`has`](Self::has) only see
/// services committed by modules that already finished Phase 1, never the
/// ones staged by the current module.
pub struct Registrar<'a> {
    module_id: &'a str,
    container: &'a ServiceContainer,
    scheduler: &'a HookScheduler,
    shutdown: &'a ShutdownCoordinator,
    services: Vec<(String, ServiceInstance)>,
    hooks: Vec<HookDescriptor>,
    fatal: Option<ModstrapError>,
}

impl<'a> Registrar<'a> {
    fn new(
        module_id: &'a str,
        container: &'a ServiceContainer,
        scheduler: &'a HookScheduler,
        shutdown: &'a ShutdownCoordinator,
    ) -> Self {
        Self {
            module_id,
            container,
            scheduler,
            shutdown,
            services: Vec::new(),
            hooks: Vec::new(),
            fatal: None,
        }
    }

    pub fn module_id(&self) -> &str {
        self.module_id
    }

    /// Stage a service.
    ///
    /// # Errors
    /// [`ModstrapError::DuplicateService`] if the name is taken. The error is
    /// also recorded so startup aborts even if the module ignores it.
    pub fn register_service<T: 'static + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<()> {
        self.stage_service(name.into(), Arc::new(instance))
    }

    pub fn register_service_arc<T: 'static + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        instance: Arc<T>,
    ) -> Result<()> {
        self.stage_service(name.into(), instance)
    }

    /// Stage a Phase 2 hook.
    ///
    /// # Errors
    /// [`ModstrapError::DuplicateHook`] if the name is taken, or
    /// [`ModstrapError::RegistrationClosed`] once Phase 2 has begun. Both are
    /// recorded as fatal.
    pub fn register_hook(&mut self, desc: HookDescriptor) -> Result<()> {
        let name = desc.name();
        let err = if self.scheduler.is_closed() {
            Some(ModstrapError::RegistrationClosed {
                name: name.to_string(),
            })
        } else if self.scheduler.contains(name) || self.hooks.iter().any(|h| h.name() == name) {
            Some(ModstrapError::DuplicateHook {
                name: name.to_string(),
            })
        } else {
            None
        };

        if let Some(err) = err {
            return Err(self.record_fatal(err));
        }
        self.hooks.push(desc.with_module(self.module_id));
        Ok(())
    }

    /// Register an asynchronous teardown step.
    ///
    /// Shutdown entries take effect immediately and survive a failed
    /// registration, so partially created resources are still released.
    pub fn register_graceful<F, Fut>(&mut self, name: impl Into<String>, timeout: Duration, callable: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.shutdown.register_graceful(name, timeout, callable);
    }

    /// Register a fast, synchronous cleanup step for forced shutdown.
    pub fn register_forced<F>(
        &mut self,
        name: impl Into<String>,
        timeout: impl Into<Option<Duration>>,
        callable: F,
    ) where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.shutdown.register_forced(name, timeout, callable);
    }

    /// Register a service implementing [`OnModuleDestroy`] for graceful shutdown.
    pub fn register_destroy<T>(&mut self, name: impl Into<String>, timeout: Duration, service: Arc<T>)
    where
        T: OnModuleDestroy + 'static,
    {
        self.register_graceful(name, timeout, move || async move {
            service.on_module_destroy().await
        });
    }

    /// `true` if a previously loaded module provides `name`.
    pub fn has(&self, name: &str) -> bool {
        self.container.has(name)
    }

    pub fn get<T: 'static + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.container.get(name)
    }

    fn stage_service(&mut self, name: String, instance: ServiceInstance) -> Result<()> {
        if self.container.has(&name) || self.services.iter().any(|(n, _)| *n == name) {
            return Err(self.record_fatal(ModstrapError::DuplicateService { name }));
        }
        self.services.push((name, instance));
        Ok(())
    }

    fn record_fatal(&mut self, err: ModstrapError) -> ModstrapError {
        tracing::error!(module = %self.module_id, error = %err, "Fatal registration error");
        self.fatal.get_or_insert_with(|| err.clone());
        err
    }
}

/// Executes Phase 1 entries in resolved order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Phase1Runner;

impl Phase1Runner {
    pub fn new() -> Self {
        Self
    }

    /// Run every module's entry inside a failure boundary.
    ///
    /// A module whose entry returns `Err` or panics is marked degraded and
    /// its staged services and hooks are dropped; the next module still runs.
    /// Modules carrying a resolution warning are degraded too.
    ///
    /// Entries must not block, perform I/O or await anything. This is not
    /// enforced.
    ///
    /// # Errors
    /// Duplicate service or hook names and late hook registration abort the
    /// run immediately.
    pub fn run(
        &self,
        resolution: Resolution,
        container: &ServiceContainer,
        scheduler: &HookScheduler,
        shutdown: &ShutdownCoordinator,
    ) -> Result<ModuleStatusReport> {
        let Resolution {
            order, warnings, ..
        } = resolution;

        let mut report = ModuleStatusReport {
            load_order: order.iter().map(|d| d.id().to_string()).collect(),
            warnings: warnings.clone(),
            ..Default::default()
        };

        tracing::info!(modules = order.len(), "Starting Phase 1");

        for desc in order {
            let id = desc.id().to_string();
            let span = tracing::info_span!("phase1", module = %id);
            let _enter = span.enter();

            let mut status = ModuleStatus::new(&id);
            for warning in warnings.iter().filter(|w| w.module() == id) {
                status.degrade(warning.to_string());
            }

            let entry = desc.into_entry();
            let mut registrar = Registrar::new(&id, container, scheduler, shutdown);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&mut registrar)));

            if let Some(err) = registrar.fatal.take() {
                return Err(err);
            }

            match outcome {
                Ok(Ok(())) => {
                    for (name, instance) in registrar.services.drain(..) {
                        container.insert(name.clone(), instance, Some(id.clone()))?;
                        status.services.push(name);
                    }
                    for hook in registrar.hooks.drain(..) {
                        status.hooks.push(hook.name().to_string());
                        scheduler.register_hook(hook)?;
                    }
                    tracing::info!(
                        services = status.services.len(),
                        hooks = status.hooks.len(),
                        "Module registered"
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %format!("{e:#}"), "Module registration failed, module degraded");
                    status.degrade(format!("registration failed: {e:#}"));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(panic = %message, "Module registration panicked, module degraded");
                    status.degrade(format!("registration panicked: {message}"));
                }
            }

            report.modules.push(status);
        }

        tracing::info!(
            modules = report.modules.len(),
            degraded = report.degraded().len(),
            "Phase 1 complete"
        );
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
