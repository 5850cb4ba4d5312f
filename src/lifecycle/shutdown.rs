//! Shutdown Coordinator
//!
//! Holds graceful and forced teardown entries and runs them in reverse
//! registration order. Every entry is bounded by its own timeout clipped to
//! the remaining global deadline, and no entry failure stops the pass.

use super::LifecycleError;
use super::hook::BoxFuture;
use crate::config::LifecycleConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use strum_macros::Display;
use tokio::signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type GracefulFn = Box<dyn FnOnce() -> BoxFuture<anyhow::Result<()>> + Send>;
type ForcedFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Which teardown pass an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownKind {
    Graceful,
    Forced,
}

struct ShutdownEntry<F> {
    name: String,
    timeout: Duration,
    callable: F,
}

/// Outcome of one teardown pass.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub kind: ShutdownKind,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
    /// Entries never started because the global deadline ran out or the
    /// pass was interrupted.
    pub skipped: Vec<String>,
    /// Entries aborted mid-run when the pass was interrupted.
    pub aborted: Vec<String>,
    pub interrupted: bool,
    pub deadline_exceeded: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ShutdownReport {
    fn new(kind: ShutdownKind) -> Self {
        let now = Utc::now();
        Self {
            kind,
            completed: Vec::new(),
            failed: Vec::new(),
            timed_out: Vec::new(),
            skipped: Vec::new(),
            aborted: Vec::new(),
            interrupted: false,
            deadline_exceeded: false,
            started_at: now,
            finished_at: now,
        }
    }

    /// `true` if every entry completed in time.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.timed_out.is_empty()
            && self.skipped.is_empty()
            && self.aborted.is_empty()
    }
}

/// Coordinates teardown of everything registered during startup.
///
/// # Example
///
/// ```rust,no_run
/// use modstrap::lifecycle::ShutdownCoordinator;
/// use std::time::Duration;
///
/// # async fn demo() {
/// let coordinator = ShutdownCoordinator::new();
/// coordinator.register_graceful("db.pool", Duration::from_secs(5), || async {
///     // drain connections
///     Ok(())
/// });
/// coordinator.register_forced("db.socket", Duration::from_millis(200), || {
///     // close the raw socket
///     Ok(())
/// });
///
/// let report = coordinator.graceful_shutdown(Duration::from_secs(30)).await;
/// if report.deadline_exceeded {
///     coordinator.force_shutdown(Duration::from_secs(5)).await;
/// }
/// # }
/// ```
pub struct ShutdownCoordinator {
    graceful: Mutex<Vec<ShutdownEntry<GracefulFn>>>,
    forced: Mutex<Vec<ShutdownEntry<ForcedFn>>>,
    default_forced_timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::from_config(&LifecycleConfig::default())
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self {
            graceful: Mutex::new(Vec::new()),
            forced: Mutex::new(Vec::new()),
            default_forced_timeout: config.default_forced_entry_timeout,
        }
    }

    /// Register an asynchronous teardown step.
    pub fn register_graceful<F, Fut>(&self, name: impl Into<String>, timeout: Duration, callable: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(entry = %name, ?timeout, "registered graceful shutdown entry");
        self.graceful
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ShutdownEntry {
                name,
                timeout,
                callable: Box::new(move || -> BoxFuture<anyhow::Result<()>> {
                    Box::pin(callable())
                }),
            });
    }

    /// Register a fast, synchronous cleanup step such as closing a file
    /// descriptor. It runs on the blocking pool under a hard time bound.
    /// `None` selects the configured default forced-entry timeout.
    pub fn register_forced<F>(
        &self,
        name: impl Into<String>,
        timeout: impl Into<Option<Duration>>,
        callable: F,
    ) where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        let timeout = timeout.into().unwrap_or(self.default_forced_timeout);
        tracing::debug!(entry = %name, ?timeout, "registered forced shutdown entry");
        self.forced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ShutdownEntry {
                name,
                timeout,
                callable: Box::new(callable),
            });
    }

    pub fn graceful_count(&self) -> usize {
        self.graceful.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn forced_count(&self) -> usize {
        self.forced.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run graceful entries newest-first within `deadline`.
    ///
    /// Entries are consumed; a second call finds nothing to do. Failures and
    /// timeouts are logged and recorded, never propagated.
    pub async fn graceful_shutdown(&self, deadline: Duration) -> ShutdownReport {
        self.graceful_shutdown_until(deadline, CancellationToken::new())
            .await
    }

    /// Like [`graceful_shutdown`](Self::graceful_shutdown), but stops early
    /// once `interrupt` is cancelled: the running entry is aborted and the
    /// rest are skipped.
    pub async fn graceful_shutdown_until(
        &self,
        deadline: Duration,
        interrupt: CancellationToken,
    ) -> ShutdownReport {
        let entries = std::mem::take(&mut *self.graceful.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = ShutdownReport::new(ShutdownKind::Graceful);
        let deadline_at = Instant::now() + deadline;

        tracing::info!(entries = entries.len(), ?deadline, "Starting graceful shutdown...");

        for entry in entries.into_iter().rev() {
            if report.interrupted {
                report.skipped.push(entry.name);
                continue;
            }
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(entry = %entry.name, "Graceful shutdown deadline exceeded, skipping entry");
                report.deadline_exceeded = true;
                report.skipped.push(entry.name);
                continue;
            }

            let bound = entry.timeout.min(remaining);
            let mut handle = tokio::spawn((entry.callable)());
            let finished = tokio::select! {
                result = tokio::time::timeout(bound, &mut handle) => Some(result),
                _ = interrupt.cancelled() => None,
            };
            let Some(result) = finished else {
                handle.abort();
                tracing::warn!(entry = %entry.name, "Graceful shutdown interrupted, entry aborted");
                report.interrupted = true;
                report.aborted.push(entry.name);
                continue;
            };
            match result {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(entry = %entry.name, "Shutdown entry complete");
                    report.completed.push(entry.name);
                }
                Ok(Ok(Err(e))) => {
                    let err = LifecycleError::shutdown_failed(&entry.name, format!("{e:#}"));
                    tracing::error!(error = %err, "Shutdown entry failed");
                    report.failed.push(entry.name);
                }
                Ok(Err(join_err)) => {
                    let err = LifecycleError::shutdown_failed(&entry.name, join_err.to_string());
                    tracing::error!(error = %err, "Shutdown entry failed");
                    report.failed.push(entry.name);
                }
                Err(_) => {
                    handle.abort();
                    let err = LifecycleError::shutdown_timeout(&entry.name, bound);
                    tracing::warn!(error = %err, "Shutdown entry timed out");
                    if bound < entry.timeout {
                        report.deadline_exceeded = true;
                    }
                    report.timed_out.push(entry.name);
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            skipped = report.skipped.len(),
            aborted = report.aborted.len(),
            "Graceful shutdown complete"
        );
        report
    }

    /// Run forced entries newest-first within `deadline`.
    ///
    /// Each entry runs on the blocking pool. A handler that hangs is left
    /// behind once its bound expires, so this call always returns in about
    /// `deadline`.
    pub async fn force_shutdown(&self, deadline: Duration) -> ShutdownReport {
        let entries = std::mem::take(&mut *self.forced.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = ShutdownReport::new(ShutdownKind::Forced);
        let deadline_at = Instant::now() + deadline;

        tracing::warn!(entries = entries.len(), ?deadline, "Starting forced shutdown...");

        for entry in entries.into_iter().rev() {
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                report.deadline_exceeded = true;
                report.skipped.push(entry.name);
                continue;
            }

            let bound = entry.timeout.min(remaining);
            let handle = tokio::task::spawn_blocking(entry.callable);
            match tokio::time::timeout(bound, handle).await {
                Ok(Ok(Ok(()))) => report.completed.push(entry.name),
                Ok(Ok(Err(e))) => {
                    let err = LifecycleError::shutdown_failed(&entry.name, format!("{e:#}"));
                    tracing::error!(error = %err, "Forced shutdown entry failed");
                    report.failed.push(entry.name);
                }
                Ok(Err(join_err)) => {
                    let err = LifecycleError::shutdown_failed(&entry.name, join_err.to_string());
                    tracing::error!(error = %err, "Forced shutdown entry failed");
                    report.failed.push(entry.name);
                }
                Err(_) => {
                    let err = LifecycleError::shutdown_timeout(&entry.name, bound);
                    tracing::error!(error = %err, "Forced shutdown entry hung, leaving it behind");
                    report.timed_out.push(entry.name);
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            skipped = report.skipped.len(),
            "Forced shutdown complete"
        );
        report
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// # Example
///
/// ```rust,ignore
/// use modstrap::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         tracing::info!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
