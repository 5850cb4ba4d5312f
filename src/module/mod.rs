//! Modules and their Phase 1 registration.
//!
//! A module is described by a [`ModuleDescriptor`]: a unique id, the ids of
//! the modules it depends on, and a synchronous registration entry. The
//! [`ModuleResolver`] orders descriptors and the [`Phase1Runner`] executes
//! their entries one at a time.

mod phase1;
mod resolver;
mod status;

pub use phase1::{Phase1Runner, Registrar};
pub use resolver::{ModuleResolver, Resolution, ResolutionWarning};
pub use status::{ModuleState, ModuleStatus, ModuleStatusReport};

use std::collections::BTreeSet;
use std::fmt;

pub(crate) type ModuleEntry = Box<dyn FnOnce(&mut Registrar<'_>) -> anyhow::Result<()> + Send>;

/// Trait for application modules
///
/// `register` runs during Phase 1. It must be fast and must not block,
/// perform I/O or await anything: it only declares services, hooks and
/// shutdown entries. Real setup belongs in a Phase 2 hook.
///
/// # Example
/// ```
/// use modstrap::{Module, ModuleDescriptor, Registrar};
///
/// struct Config;
///
/// struct ConfigModule;
///
/// impl Module for ConfigModule {
///     fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
///         registrar.register_service("config", Config)?;
///         Ok(())
///     }
/// }
///
/// let descriptor = ModuleDescriptor::new("config", Vec::<String>::new(), |r| {
///     ConfigModule.register(r)
/// });
/// assert_eq!(descriptor.id(), "config");
/// ```
pub trait Module: Send + 'static {
    /// Declare this module's services, hooks and shutdown entries.
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()>;
}

/// Static identity of a module, normally generated by `#[module(...)]`.
pub trait ModuleMetadata {
    const ID: &'static str;
    const DEPENDENCIES: &'static [&'static str];
}

/// Everything the orchestrator needs to know about one module.
///
/// Immutable once built. The entry is handed to the [`Phase1Runner`] and
/// called exactly once.
pub struct ModuleDescriptor {
    id: String,
    dependencies: BTreeSet<String>,
    entry: ModuleEntry,
}

impl ModuleDescriptor {
    pub fn new<I, S, F>(id: impl Into<String>, dependencies: I, entry: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut Registrar<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            id: id.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            entry: Box::new(entry),
        }
    }

    /// Build a descriptor from a module type carrying static metadata.
    pub fn of<M>(module: M) -> Self
    where
        M: Module + ModuleMetadata,
    {
        Self::new(M::ID, M::DEPENDENCIES.iter().copied(), move |registrar| {
            module.register(registrar)
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub(crate) fn into_entry(self) -> ModuleEntry {
        self.entry
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
