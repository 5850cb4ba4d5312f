//! Phase 2 hook descriptors, states and execution context.

use super::OnModuleInit;
use crate::di::ServiceContainer;
use crate::error::{ModstrapError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tokio_util::sync::CancellationToken;

/// Boxed, sendable future used for type-erased hook and shutdown bodies.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub(crate) type HookFn = Box<dyn FnOnce(HookContext) -> BoxFuture<anyhow::Result<()>> + Send>;

/// Hook state machine.
///
/// `Pending -> Ready -> Running -> {Succeeded, Failed, TimedOut}`. `Skipped`
/// is terminal for hooks that never ran (unknown dependency, startup
/// cancelled). All terminal states satisfy a dependent's wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl HookState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HookState::Succeeded | HookState::Failed | HookState::TimedOut | HookState::Skipped
        )
    }

    pub fn is_success(self) -> bool {
        self == HookState::Succeeded
    }
}

/// A named unit of asynchronous Phase 2 setup.
///
/// Built with a closure and refined with builder methods:
///
/// ```
/// use modstrap::lifecycle::HookDescriptor;
/// use std::time::Duration;
///
/// let hook = HookDescriptor::new("db.migrate", |ctx| async move {
///     if !ctx.all_dependencies_succeeded() {
///         anyhow::bail!("database connection unavailable");
///     }
///     Ok(())
/// })
/// .depends_on("db.connect")
/// .priority(10)
/// .timeout(Duration::from_secs(5))
/// .critical();
///
/// assert_eq!(hook.name(), "db.migrate");
/// assert!(hook.is_critical());
/// ```
pub struct HookDescriptor {
    name: String,
    priority: i32,
    dependencies: BTreeSet<String>,
    timeout: Option<Duration>,
    critical: bool,
    module: Option<String>,
    callable: HookFn,
}

impl HookDescriptor {
    pub fn new<F, Fut>(name: impl Into<String>, callable: F) -> Self
    where
        F: FnOnce(HookContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority: 0,
            dependencies: BTreeSet::new(),
            timeout: None,
            critical: false,
            module: None,
            callable: Box::new(move |ctx| -> BoxFuture<anyhow::Result<()>> {
                Box::pin(callable(ctx))
            }),
        }
    }

    /// Wrap a service implementing [`OnModuleInit`].
    pub fn from_init<T>(name: impl Into<String>, service: Arc<T>) -> Self
    where
        T: OnModuleInit + 'static,
    {
        Self::new(name, move |ctx| async move { service.on_module_init(ctx).await })
    }

    /// Higher runs (and logs) first within a wave.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, hook: impl Into<String>) -> Self {
        self.dependencies.insert(hook.into());
        self
    }

    pub fn dependencies<I, S>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(hooks.into_iter().map(Into::into));
        self
    }

    /// Without an explicit timeout the scheduler's default applies.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Failure, timeout or skip of a critical hook aborts startup.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn get_dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Module that registered this hook, if any.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub(crate) fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub(crate) fn into_callable(self) -> HookFn {
        self.callable
    }
}

impl fmt::Debug for HookDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("critical", &self.critical)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Status of one hook, as exposed to health checks.
#[derive(Debug, Clone, Serialize)]
pub struct HookRecord {
    pub state: HookState,
    pub priority: i32,
    pub critical: bool,
    pub module: Option<String>,
    pub dependencies: Vec<String>,
    pub wave: Option<usize>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl HookRecord {
    fn for_descriptor(desc: &HookDescriptor) -> Self {
        let state = if desc.dependencies.is_empty() {
            HookState::Ready
        } else {
            HookState::Pending
        };
        Self {
            state,
            priority: desc.priority,
            critical: desc.critical,
            module: desc.module.clone(),
            dependencies: desc.dependencies.iter().cloned().collect(),
            wave: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Shared hook name -> status map.
///
/// Written by the scheduler, read by hooks in later waves and by status
/// endpoints. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct HookStatusMap {
    inner: Arc<DashMap<String, HookRecord>>,
}

impl HookStatusMap {
    pub fn state(&self, name: &str) -> Option<HookState> {
        self.inner.get(name).map(|r| r.state)
    }

    pub fn record(&self, name: &str) -> Option<HookRecord> {
        self.inner.get(name).map(|r| r.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Point-in-time copy, ordered by hook name.
    pub fn snapshot(&self) -> BTreeMap<String, HookRecord> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Insert the initial record for `desc`; `DuplicateHook` if the name is taken.
    pub(crate) fn try_insert(&self, desc: &HookDescriptor) -> Result<()> {
        match self.inner.entry(desc.name.clone()) {
            Entry::Occupied(e) => Err(ModstrapError::DuplicateHook {
                name: e.key().clone(),
            }),
            Entry::Vacant(e) => {
                e.insert(HookRecord::for_descriptor(desc));
                Ok(())
            }
        }
    }

    pub(crate) fn mark_running(&self, name: &str, wave: usize) {
        if let Some(mut record) = self.inner.get_mut(name) {
            record.state = HookState::Running;
            record.wave = Some(wave);
            record.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn set_wave(&self, name: &str, wave: usize) {
        if let Some(mut record) = self.inner.get_mut(name) {
            record.wave = Some(wave);
        }
    }

    pub(crate) fn set_state(&self, name: &str, state: HookState) {
        if let Some(mut record) = self.inner.get_mut(name) {
            record.state = state;
        }
    }

    pub(crate) fn finish(&self, name: &str, state: HookState, error: Option<String>) {
        if let Some(mut record) = self.inner.get_mut(name) {
            record.state = state;
            record.error = error;
            record.finished_at = Some(Utc::now());
        }
    }
}

/// Hooks created by running hooks, executed after the current waves.
///
/// Also holds the first registration error raised through
/// [`HookContext::defer_hook`], so the scheduler can fail the run even if
/// the hook dropped the `Err`.
#[derive(Clone, Default)]
pub(crate) struct DeferredHooks {
    queue: Arc<Mutex<Vec<HookDescriptor>>>,
    fatal: Arc<Mutex<Option<ModstrapError>>>,
}

impl DeferredHooks {
    pub(crate) fn push(&self, desc: HookDescriptor) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(desc);
    }

    pub(crate) fn drain(&self) -> Vec<HookDescriptor> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record_fatal(&self, err: &ModstrapError) {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| err.clone());
    }

    pub(crate) fn take_fatal(&self) -> Option<ModstrapError> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Handle passed to every running hook.
#[derive(Clone)]
pub struct HookContext {
    name: String,
    dependencies: Arc<BTreeSet<String>>,
    container: Arc<ServiceContainer>,
    statuses: HookStatusMap,
    cancel: CancellationToken,
    deferred: DeferredHooks,
}

impl HookContext {
    pub(crate) fn new(
        name: String,
        dependencies: BTreeSet<String>,
        container: Arc<ServiceContainer>,
        statuses: HookStatusMap,
        cancel: CancellationToken,
        deferred: DeferredHooks,
    ) -> Self {
        Self {
            name,
            dependencies: Arc::new(dependencies),
            container,
            statuses,
            cancel,
            deferred,
        }
    }

    /// Name of the running hook.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    pub fn status_of(&self, hook: &str) -> Option<HookState> {
        self.statuses.state(hook)
    }

    /// Dependencies are only guaranteed to have *terminated*; use this when
    /// the hook needs them to have succeeded.
    pub fn dependency_succeeded(&self, hook: &str) -> bool {
        self.status_of(hook).is_some_and(HookState::is_success)
    }

    pub fn all_dependencies_succeeded(&self) -> bool {
        self.dependencies.iter().all(|d| self.dependency_succeeded(d))
    }

    /// Declared dependencies that did not succeed.
    pub fn unusable_dependencies(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| !self.dependency_succeeded(d))
            .cloned()
            .collect()
    }

    /// Cancelled when the hook times out or startup is aborted.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a hook for a later round that runs after the current waves.
    ///
    /// # Errors
    /// Returns [`ModstrapError::DuplicateHook`] if the name is already known.
    /// The error is also recorded, and Phase 2 fails with it once the current
    /// round ends.
    pub fn defer_hook(&self, desc: HookDescriptor) -> Result<()> {
        if let Err(err) = self.statuses.try_insert(&desc) {
            tracing::error!(hook = %desc.name, parent = %self.name, error = %err, "Fatal deferred hook registration");
            self.deferred.record_fatal(&err);
            return Err(err);
        }
        tracing::debug!(hook = %desc.name, parent = %self.name, "deferred hook queued");
        self.deferred.push(desc);
        Ok(())
    }
}
