//! # Modstrap
//!
//! Two-phase startup orchestration for modular async applications.
//!
//! Modstrap loads a set of modules, each with an id and a list of module
//! dependencies, and brings them up in two phases:
//!
//! - **Phase 1** runs every module's synchronous registration step in a
//!   deterministic dependency order. Modules declare services, Phase 2 hooks
//!   and shutdown entries. A failing module is marked degraded and the rest
//!   still load.
//! - **Phase 2** runs the registered async hooks in dependency waves. Hooks
//!   within a wave run concurrently; a wave starts only after every hook of
//!   the previous one has finished, successfully or not.
//!
//! Teardown runs graceful entries in reverse registration order under a
//! global deadline and escalates to fast, forced entries when that deadline
//! is exceeded.
//!
//! ## Features
//!
//! - **Service Container**: thread-safe, name-keyed, typed lookups
//! - **Module Resolution**: missing dependencies and cycles degrade, never crash
//! - **Hook Waves**: priorities, per-hook timeouts, cooperative cancellation
//! - **Critical Hooks**: opt-in fail-fast for essential infrastructure
//! - **Status Reports**: serializable snapshots for health endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modstrap::prelude::*;
//! use std::time::Duration;
//!
//! pub struct Database {
//!     url: String,
//! }
//!
//! #[module(id = "db")]
//! pub struct DbModule;
//!
//! impl Module for DbModule {
//!     fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
//!         registrar.register_service("db", Database { url: "postgres://localhost".into() })?;
//!         registrar.register_hook(
//!             HookDescriptor::new("db.connect", |ctx| async move {
//!                 let db = ctx.container().get::<Database>("db")?;
//!                 tracing::info!(url = %db.url, "connected");
//!                 Ok(())
//!             })
//!             .priority(100)
//!             .timeout(Duration::from_secs(5))
//!             .critical(),
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Application::builder()
//!         .module(ModuleDescriptor::of(DbModule))
//!         .start()
//!         .await
//!         .unwrap_or_else(|e| {
//!             eprintln!("fatal: {e}");
//!             std::process::exit(1);
//!         });
//!
//!     app.wait_for_shutdown().await;
//! }
//! ```

extern crate self as modstrap;

pub mod config;
pub mod di;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod module;

// Re-export core types
pub use config::{ConfigService, LifecycleConfig};
pub use di::ServiceContainer;
pub use error::{ModstrapError, Result};
pub use graph::DependencyGraph;
pub use lifecycle::{
    Application, ApplicationBuilder, HookContext, HookDescriptor, HookScheduler, HookState,
    Phase2Report, ShutdownCoordinator, ShutdownReport,
};
pub use module::{
    Module, ModuleDescriptor, ModuleMetadata, ModuleResolver, ModuleState, ModuleStatusReport,
    Phase1Runner, Registrar, ResolutionWarning,
};

// Re-export macros
pub use modstrap_macro::module;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// ```
/// use modstrap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::LifecycleConfig;
    pub use crate::di::ServiceContainer;
    pub use crate::error::{ModstrapError, Result};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, HookContext, HookDescriptor, HookState, OnModuleDestroy,
        OnModuleInit, ShutdownOutcome, shutdown_signal,
    };
    pub use crate::module::{Module, ModuleDescriptor, ModuleMetadata, Registrar};
    pub use crate::module;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
