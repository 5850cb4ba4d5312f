//! Lifecycle Module
//!
//! Phase 2 hook scheduling, teardown and the [`Application`] facade that
//! ties both phases together.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration Loading
//!    ↓
//! 2. Module Resolution                 (ordered, warnings only)
//!    ↓
//! 3. Phase 1: Module Registration      (sequential, synchronous)
//!    ↓
//! 4. Phase 2: Hooks                    (wave-parallel, async)
//!    ↓
//! [Running...]
//!    ↓
//! 5. Shutdown Signal (SIGTERM/SIGINT)
//!    ↓
//! 6. Graceful Shutdown                 (reverse order, deadline bound)
//!    ↓
//! 7. Forced Shutdown                   (only if 6 overran, or 2nd signal)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use modstrap::lifecycle::{Application, HookDescriptor};
//! use modstrap::ModuleDescriptor;
//!
//! # async fn demo() -> modstrap::Result<()> {
//! let db = ModuleDescriptor::new("db", Vec::<String>::new(), |r| {
//!     r.register_hook(HookDescriptor::new("db.connect", |_| async { Ok(()) }).critical())?;
//!     Ok(())
//! });
//!
//! let app = Application::builder().module(db).start().await?;
//! app.wait_for_shutdown().await;
//! # Ok(())
//! # }
//! ```

mod application;
mod error;
mod hook;
mod scheduler;
mod shutdown;
mod traits;

pub use application::{Application, ApplicationBuilder, ShutdownOutcome};
pub use error::LifecycleError;
pub use hook::{BoxFuture, HookContext, HookDescriptor, HookRecord, HookState, HookStatusMap};
pub use scheduler::{HookScheduler, Phase2Report};
pub use shutdown::{ShutdownCoordinator, ShutdownKind, ShutdownReport, shutdown_signal};
pub use traits::{OnModuleDestroy, OnModuleInit};
