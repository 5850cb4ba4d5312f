//! Lifecycle hook traits
//!
//! Object-safe alternatives to closures for services that take part in
//! Phase 2 initialization or graceful teardown. Wrap them with
//! [`HookDescriptor::from_init`](super::HookDescriptor::from_init) and
//! [`Registrar::register_destroy`](crate::module::Registrar::register_destroy).

use super::HookContext;
use async_trait::async_trait;

/// Asynchronous setup that runs once the container is populated
///
/// Use this hook to:
/// - Open database connections
/// - Warm up caches
/// - Call into services registered by other modules
///
/// # Example
///
/// ```rust,ignore
/// use modstrap::lifecycle::{HookContext, OnModuleInit};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnModuleInit for CacheWarmer {
///     async fn on_module_init(&self, ctx: HookContext) -> anyhow::Result<()> {
///         let db = ctx.container().get::<Database>("db")?;
///         self.load_from(&db).await
///     }
/// }
/// ```
#[async_trait]
pub trait OnModuleInit: Send + Sync {
    /// Called in the service's Phase 2 wave, after every hook it depends on
    /// has reached a terminal state.
    async fn on_module_init(&self, ctx: HookContext) -> anyhow::Result<()>;
}

/// Called during graceful shutdown
///
/// Entries run in **reverse registration order**, so services registered by
/// later modules are torn down before the services they depend on.
#[async_trait]
pub trait OnModuleDestroy: Send + Sync {
    /// Release resources. Errors are logged and teardown continues.
    async fn on_module_destroy(&self) -> anyhow::Result<()>;
}
