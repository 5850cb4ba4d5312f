//! Hook Scheduler
//!
//! Runs Phase 2 hooks in dependency waves. Every hook of a wave is spawned
//! at once and the scheduler waits for all of them to reach a terminal
//! state before the next wave starts. Only that barrier orders hooks; two
//! hooks in the same wave have no ordering relative to each other.
//!
//! A failing or timed out hook never stops the scheduler. Its dependents
//! still run and can inspect the outcome through [`HookContext`].

use super::LifecycleError;
use super::hook::{DeferredHooks, HookContext, HookDescriptor, HookFn, HookState, HookStatusMap};
use crate::config::LifecycleConfig;
use crate::di::ServiceContainer;
use crate::error::{ModstrapError, Result};
use crate::graph::DependencyGraph;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Aggregate outcome of Phase 2.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Phase2Report {
    pub run_id: Option<Uuid>,
    /// Hook names per wave, each wave in priority order.
    pub waves: Vec<Vec<String>>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
    pub skipped: Vec<String>,
    /// Critical hooks that did not succeed. Non-empty means startup failed.
    pub critical_failures: Vec<String>,
    /// Timed out hooks whose tasks could not be confirmed stopped.
    pub abandoned: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Phase2Report {
    /// `true` unless a critical hook failed, timed out or was skipped.
    pub fn is_success(&self) -> bool {
        self.critical_failures.is_empty()
    }

    /// `true` if any hook did not succeed, critical or not.
    pub fn is_degraded(&self) -> bool {
        !(self.failed.is_empty() && self.timed_out.is_empty() && self.skipped.is_empty())
    }

    pub fn wave_of(&self, hook: &str) -> Option<usize> {
        self.waves.iter().position(|w| w.iter().any(|h| h == hook))
    }

    /// Turn critical failures into a startup error.
    pub fn check(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ModstrapError::CriticalHookFailed {
                hooks: self.critical_failures.clone(),
            })
        }
    }

    fn push(&mut self, name: &str, state: HookState) {
        let list = match state {
            HookState::Succeeded => &mut self.succeeded,
            HookState::Failed => &mut self.failed,
            HookState::TimedOut => &mut self.timed_out,
            HookState::Skipped => &mut self.skipped,
            HookState::Pending | HookState::Ready | HookState::Running => return,
        };
        list.push(name.to_string());
    }
}

struct HookOutcome {
    name: String,
    state: HookState,
    error: Option<LifecycleError>,
    abandoned: bool,
    elapsed: Duration,
}

/// Collects hooks during Phase 1 and executes them in Phase 2.
///
/// # Example
///
/// ```rust,no_run
/// use modstrap::di::ServiceContainer;
/// use modstrap::lifecycle::{HookDescriptor, HookScheduler};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> modstrap::Result<()> {
/// let scheduler = HookScheduler::default();
/// scheduler.register_hook(HookDescriptor::new("db.connect", |_| async { Ok(()) }).priority(10))?;
/// scheduler.register_hook(
///     HookDescriptor::new("cache.warm", |_| async { Ok(()) }).depends_on("db.connect"),
/// )?;
///
/// let report = scheduler
///     .run(Arc::new(ServiceContainer::new()), CancellationToken::new())
///     .await?;
/// assert_eq!(report.waves.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct HookScheduler {
    pending: Mutex<Vec<HookDescriptor>>,
    statuses: HookStatusMap,
    deferred: DeferredHooks,
    closed: AtomicBool,
    default_timeout: Duration,
    abandon_grace: Duration,
}

impl Default for HookScheduler {
    fn default() -> Self {
        Self::new(&LifecycleConfig::default())
    }
}

impl HookScheduler {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            statuses: HookStatusMap::default(),
            deferred: DeferredHooks::default(),
            closed: AtomicBool::new(false),
            default_timeout: config.default_hook_timeout,
            abandon_grace: config.hook_abandon_grace,
        }
    }

    /// Submit a hook for Phase 2.
    ///
    /// # Errors
    /// - [`ModstrapError::DuplicateHook`] if the name is already registered
    /// - [`ModstrapError::RegistrationClosed`] once [`run`](Self::run) has started
    pub fn register_hook(&self, desc: HookDescriptor) -> Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(ModstrapError::RegistrationClosed {
                name: desc.name().to_string(),
            });
        }
        self.statuses.try_insert(&desc)?;
        tracing::debug!(
            hook = %desc.name(),
            priority = desc.get_priority(),
            module = ?desc.module(),
            "registered hook"
        );
        pending.push(desc);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.statuses.contains(name)
    }

    pub fn status(&self, name: &str) -> Option<HookState> {
        self.statuses.state(name)
    }

    /// Shared status map, live during and after Phase 2.
    pub fn statuses(&self) -> HookStatusMap {
        self.statuses.clone()
    }

    pub fn hook_count(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Execute every registered hook, then any hooks deferred by running hooks.
    ///
    /// Closes registration first. A cycle in the hook graph is detected
    /// before anything executes and returned as [`ModstrapError::Cycle`].
    /// Hook failures are reported, not returned; see
    /// [`Phase2Report::check`] for the critical-hook policy.
    pub async fn run(
        &self,
        container: Arc<ServiceContainer>,
        cancel: CancellationToken,
    ) -> Result<Phase2Report> {
        let mut batch = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *pending)
        };

        let mut report = Phase2Report {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        tracing::info!(hooks = batch.len(), "Starting Phase 2");

        let mut round = 0usize;
        while !batch.is_empty() {
            if round > 0 {
                tracing::info!(round, hooks = batch.len(), "Running deferred hooks");
            }
            self.run_round(batch, &container, &cancel, &mut report)
                .await?;
            if let Some(err) = self.deferred.take_fatal() {
                tracing::error!(error = %err, "Deferred hook registration failed, aborting Phase 2");
                return Err(err);
            }
            batch = self.deferred.drain();
            round += 1;
        }

        report.finished_at = Some(Utc::now());
        tracing::info!(
            waves = report.waves.len(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            skipped = report.skipped.len(),
            "Phase 2 complete"
        );
        Ok(report)
    }

    async fn run_round(
        &self,
        hooks: Vec<HookDescriptor>,
        container: &Arc<ServiceContainer>,
        cancel: &CancellationToken,
        report: &mut Phase2Report,
    ) -> Result<()> {
        let mut graph = DependencyGraph::new();
        for hook in &hooks {
            graph.add_node(hook.name().to_string());
        }

        // Dependencies on hooks from an earlier round are already terminal.
        let mut missing: HashMap<String, String> = HashMap::new();
        for hook in &hooks {
            let name = hook.name().to_string();
            for dep in hook.get_dependencies() {
                if graph.contains(dep) {
                    graph.add_edge(&name, dep)?;
                } else if !self.statuses.state(dep).is_some_and(HookState::is_terminal) {
                    missing.entry(name.clone()).or_insert_with(|| dep.clone());
                }
            }
        }

        if let Some(path) = graph.detect_cycle() {
            tracing::error!(cycle = %path.join(" -> "), "Hook dependency cycle, aborting Phase 2");
            return Err(ModstrapError::Cycle { path });
        }

        let priorities: HashMap<String, i32> = hooks
            .iter()
            .map(|h| (h.name().to_string(), h.get_priority()))
            .collect();
        let waves = graph.topo_order_by(|name| Reverse(priorities.get(name).copied().unwrap_or(0)))?;

        let mut by_name: HashMap<String, HookDescriptor> = hooks
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();

        let offset = report.waves.len();
        for (i, wave) in waves.into_iter().enumerate() {
            report.waves.push(wave.clone());
            self.run_wave(offset + i, wave, &mut by_name, &missing, container, cancel, report)
                .await;
        }
        Ok(())
    }

    async fn run_wave(
        &self,
        wave_idx: usize,
        wave: Vec<String>,
        by_name: &mut HashMap<String, HookDescriptor>,
        missing: &HashMap<String, String>,
        container: &Arc<ServiceContainer>,
        cancel: &CancellationToken,
        report: &mut Phase2Report,
    ) {
        for name in &wave {
            self.statuses.set_wave(name, wave_idx);
        }

        if cancel.is_cancelled() {
            for name in &wave {
                self.conclude(
                    name,
                    HookState::Skipped,
                    Some("startup cancelled before the hook's wave".to_string()),
                    report,
                );
            }
            return;
        }

        tracing::debug!(wave = wave_idx, hooks = ?wave, "Starting wave");

        let mut tasks = JoinSet::new();
        for name in &wave {
            let Some(desc) = by_name.remove(name) else {
                continue;
            };

            if let Some(dep) = missing.get(name) {
                self.conclude(
                    name,
                    HookState::Skipped,
                    Some(format!("unknown dependency '{dep}'")),
                    report,
                );
                continue;
            }

            let timeout = desc.get_timeout().unwrap_or(self.default_timeout);
            let ctx = HookContext::new(
                name.clone(),
                desc.get_dependencies().clone(),
                Arc::clone(container),
                self.statuses.clone(),
                cancel.child_token(),
                self.deferred.clone(),
            );

            self.statuses.set_state(name, HookState::Ready);
            self.statuses.mark_running(name, wave_idx);
            tracing::info!(
                hook = %name,
                priority = desc.get_priority(),
                wave = wave_idx,
                "Starting hook"
            );

            tasks.spawn(supervise(
                name.clone(),
                desc.into_callable(),
                ctx,
                timeout,
                self.abandon_grace,
            ));
        }

        // Wave barrier.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.abandoned {
                        report.abandoned.push(outcome.name.clone());
                    }
                    tracing::debug!(hook = %outcome.name, elapsed = ?outcome.elapsed, "hook finished");
                    self.conclude(
                        &outcome.name,
                        outcome.state,
                        outcome.error.map(|e| e.to_string()),
                        report,
                    );
                }
                Err(e) => {
                    tracing::error!(wave = wave_idx, error = %e, "Hook supervisor task failed");
                }
            }
        }

        for name in &wave {
            if !self.statuses.state(name).is_some_and(HookState::is_terminal) {
                self.conclude(
                    name,
                    HookState::Failed,
                    Some("hook supervisor terminated unexpectedly".to_string()),
                    report,
                );
            }
        }
    }

    fn conclude(&self, name: &str, state: HookState, error: Option<String>, report: &mut Phase2Report) {
        let critical = self
            .statuses
            .record(name)
            .is_some_and(|record| record.critical);

        match (state, &error) {
            (HookState::Succeeded, _) => tracing::info!(hook = %name, "Hook succeeded"),
            (_, Some(err)) if critical => {
                tracing::error!(hook = %name, state = %state, error = %err, "Critical hook did not succeed");
            }
            (_, Some(err)) => tracing::warn!(hook = %name, state = %state, error = %err, "Hook did not succeed"),
            (_, None) => tracing::warn!(hook = %name, state = %state, "Hook did not succeed"),
        }

        self.statuses.finish(name, state, error.clone());
        report.push(name, state);
        if let Some(err) = error {
            report.errors.insert(name.to_string(), err);
        }
        if critical && !state.is_success() {
            report.critical_failures.push(name.to_string());
        }
    }
}

/// Run one hook in its own task, bounded by `timeout`.
///
/// On timeout the hook's token is cancelled and the task gets `grace` to
/// stop; after that it is aborted, and if even the abort is not observed
/// within `grace` the task is abandoned with a leak warning.
async fn supervise(
    name: String,
    callable: HookFn,
    ctx: HookContext,
    timeout: Duration,
    grace: Duration,
) -> HookOutcome {
    let token = ctx.cancellation_token().clone();
    let started = Instant::now();
    let mut handle = tokio::spawn(callable(ctx));

    let (state, error, abandoned) = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(()))) => (HookState::Succeeded, None, false),
        Ok(Ok(Err(e))) => (
            HookState::Failed,
            Some(LifecycleError::hook_failed(&name, format!("{e:#}"))),
            false,
        ),
        Ok(Err(join_err)) if join_err.is_panic() => (
            HookState::Failed,
            Some(LifecycleError::HookPanicked { hook: name.clone() }),
            false,
        ),
        Ok(Err(join_err)) => (
            HookState::Failed,
            Some(LifecycleError::hook_failed(&name, join_err.to_string())),
            false,
        ),
        Err(_) => {
            token.cancel();
            let mut abandoned = false;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
                if tokio::time::timeout(grace, &mut handle).await.is_err() {
                    tracing::warn!(hook = %name, "Hook task ignored cancellation and abort, abandoning it");
                    abandoned = true;
                }
            }
            (
                HookState::TimedOut,
                Some(LifecycleError::hook_timeout(&name, timeout)),
                abandoned,
            )
        }
    };

    HookOutcome {
        name,
        state,
        error,
        abandoned,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Barrier;

    fn fast_config() -> LifecycleConfig {
        LifecycleConfig {
            default_hook_timeout: Duration::from_secs(2),
            hook_abandon_grace: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn ok_hook(name: &str) -> HookDescriptor {
        HookDescriptor::new(name, |_| async { Ok(()) })
    }

    async fn run(scheduler: &HookScheduler) -> Result<Phase2Report> {
        scheduler
            .run(Arc::new(ServiceContainer::new()), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_waves_follow_dependencies_and_priority() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler.register_hook(ok_hook("h1").priority(10)).unwrap();
        scheduler
            .register_hook(
                HookDescriptor::new("h2", |ctx| async move {
                    assert_eq!(ctx.status_of("h1"), Some(HookState::Succeeded));
                    assert_eq!(ctx.status_of("h3"), Some(HookState::Succeeded));
                    Ok(())
                })
                .priority(5)
                .depends_on("h1"),
            )
            .unwrap();
        scheduler.register_hook(ok_hook("h3").priority(20)).unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.waves, vec![vec!["h3", "h1"], vec!["h2"]]);
        assert_eq!(report.succeeded.len(), 3);
        assert!(report.is_success());
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn test_wave_index_exceeds_dependency_waves() {
        let scheduler = HookScheduler::new(&fast_config());
        let edges: Vec<(&str, Vec<&str>)> = vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a", "b"]),
            ("d", vec![]),
            ("e", vec!["d", "c"]),
            ("f", vec!["b"]),
        ];
        for (name, deps) in &edges {
            scheduler
                .register_hook(ok_hook(name).dependencies(deps.iter().copied()))
                .unwrap();
        }

        let report = run(&scheduler).await.unwrap();
        for (name, deps) in &edges {
            let wave = report.wave_of(name).unwrap();
            assert_eq!(scheduler.statuses().record(name).unwrap().wave, Some(wave));
            for dep in deps {
                assert!(wave > report.wave_of(dep).unwrap(), "{name} vs {dep}");
            }
        }
    }

    #[tokio::test]
    async fn test_hooks_in_a_wave_run_concurrently() {
        let scheduler = HookScheduler::new(&fast_config());
        let barrier = Arc::new(Barrier::new(2));
        for name in ["left", "right"] {
            let barrier = Arc::clone(&barrier);
            scheduler
                .register_hook(HookDescriptor::new(name, move |_| async move {
                    barrier.wait().await;
                    Ok(())
                }))
                .unwrap();
        }

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.succeeded.len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_execution() {
        let scheduler = HookScheduler::new(&fast_config());
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executed);
        scheduler
            .register_hook(HookDescriptor::new("independent", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        scheduler.register_hook(ok_hook("a").depends_on("b")).unwrap();
        scheduler.register_hook(ok_hook("b").depends_on("a")).unwrap();

        let err = run(&scheduler).await.unwrap_err();
        assert!(matches!(err, ModstrapError::Cycle { ref path } if path == &["a", "b", "a"]));
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.status("independent"), Some(HookState::Ready));
    }

    #[tokio::test]
    async fn test_failed_dependency_does_not_block_dependent() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(HookDescriptor::new("broken", |_| async {
                Err(anyhow::anyhow!("connection refused"))
            }))
            .unwrap();
        scheduler
            .register_hook(
                HookDescriptor::new("dependent", |ctx| async move {
                    assert_eq!(ctx.status_of("broken"), Some(HookState::Failed));
                    assert_eq!(ctx.unusable_dependencies(), vec!["broken".to_string()]);
                    Ok(())
                })
                .depends_on("broken"),
            )
            .unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.failed, vec!["broken"]);
        assert_eq!(report.succeeded, vec!["dependent"]);
        assert!(report.errors["broken"].contains("connection refused"));
        assert!(report.is_success());
        assert!(report.is_degraded());
    }

    #[tokio::test]
    async fn test_critical_failure_fails_startup() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(
                HookDescriptor::new("db.connect", |_| async {
                    Err(anyhow::anyhow!("no database"))
                })
                    .critical(),
            )
            .unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.failed, vec!["db.connect"]);
        assert_eq!(report.critical_failures, vec!["db.connect"]);
        assert!(!report.is_success());
        assert!(matches!(
            report.check(),
            Err(ModstrapError::CriticalHookFailed { hooks }) if hooks == ["db.connect"]
        ));
    }

    #[tokio::test]
    async fn test_timeout_marks_hook_timed_out() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(
                HookDescriptor::new("slow", |_| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                })
                .timeout(Duration::from_millis(30)),
            )
            .unwrap();
        assert_eq!(scheduler.status("slow"), Some(HookState::Ready));

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.timed_out, vec!["slow"]);
        assert_eq!(scheduler.status("slow"), Some(HookState::TimedOut));
        assert!(report.abandoned.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blocking_hook_is_abandoned() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(
                HookDescriptor::new("blocker", |_| async {
                    // Holds the worker thread, so neither the token nor abort is observed.
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(())
                })
                .timeout(Duration::from_millis(30)),
            )
            .unwrap();

        let started = Instant::now();
        let report = run(&scheduler).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(report.timed_out, vec!["blocker"]);
        assert_eq!(report.abandoned, vec!["blocker"]);
        assert_eq!(scheduler.status("blocker"), Some(HookState::TimedOut));
    }

    #[tokio::test]
    async fn test_timed_out_hook_receives_cancellation() {
        let scheduler = HookScheduler::new(&fast_config());
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        scheduler
            .register_hook(
                HookDescriptor::new("cooperative", move |ctx| async move {
                    ctx.cancellation_token().cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .timeout(Duration::from_millis(30)),
            )
            .unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.timed_out, vec!["cooperative"]);
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_hook_is_failed() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(HookDescriptor::new("panics", |_| async {
                let exploded = true;
                assert!(!exploded, "hook exploded");
                Ok(())
            }))
            .unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.failed, vec!["panics"]);
        assert_eq!(report.errors["panics"], "Hook panicked: panics");
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_skipped() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(ok_hook("orphan").depends_on("never-registered"))
            .unwrap();
        scheduler.register_hook(ok_hook("after").depends_on("orphan")).unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.skipped, vec!["orphan"]);
        assert_eq!(report.succeeded, vec!["after"]);
        assert!(report.is_success());
        assert_eq!(scheduler.statuses().record("orphan").unwrap().wave, Some(0));
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler.register_hook(ok_hook("once")).unwrap();
        assert!(matches!(
            scheduler.register_hook(ok_hook("once")),
            Err(ModstrapError::DuplicateHook { .. })
        ));

        run(&scheduler).await.unwrap();
        assert!(scheduler.is_closed());
        assert!(matches!(
            scheduler.register_hook(ok_hook("late")),
            Err(ModstrapError::RegistrationClosed { name }) if name == "late"
        ));
    }

    #[tokio::test]
    async fn test_deferred_hooks_run_after_static_waves() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler
            .register_hook(HookDescriptor::new("spawner", |ctx| async move {
                ctx.defer_hook(
                    HookDescriptor::new("follow-up", |ctx| async move {
                        assert!(ctx.all_dependencies_succeeded());
                        Ok(())
                    })
                    .depends_on("spawner")
                    .depends_on("sibling"),
                )?;
                Ok(())
            }))
            .unwrap();
        scheduler.register_hook(ok_hook("sibling")).unwrap();

        let report = run(&scheduler).await.unwrap();
        assert_eq!(report.waves, vec![vec!["spawner", "sibling"], vec!["follow-up"]]);
        assert_eq!(scheduler.status("follow-up"), Some(HookState::Succeeded));
    }

    #[tokio::test]
    async fn test_ignored_duplicate_deferred_hook_is_fatal() {
        let scheduler = HookScheduler::new(&fast_config());
        let follow_up_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&follow_up_ran);
        scheduler
            .register_hook(HookDescriptor::new("spawner", move |ctx| async move {
                let _ = ctx.defer_hook(ok_hook("spawner"));
                ctx.defer_hook(HookDescriptor::new("follow-up", move |_| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }))?;
                Ok(())
            }))
            .unwrap();

        let err = run(&scheduler).await.unwrap_err();
        assert!(matches!(err, ModstrapError::DuplicateHook { ref name } if name == "spawner"));
        assert!(err.is_configuration_error());
        assert!(!follow_up_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancelled_startup_skips_hooks() {
        let scheduler = HookScheduler::new(&fast_config());
        scheduler.register_hook(ok_hook("a")).unwrap();
        scheduler.register_hook(ok_hook("b").critical()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = scheduler
            .run(Arc::new(ServiceContainer::new()), cancel)
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["a", "b"]);
        assert_eq!(report.critical_failures, vec!["b"]);
        let record = scheduler.statuses().record("b").unwrap();
        assert_eq!((record.state, record.wave), (HookState::Skipped, Some(0)));
    }
}
