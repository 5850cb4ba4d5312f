use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModstrapError>;

#[derive(Debug, Clone, Error)]
pub enum ModstrapError {
    #[error("Duplicate service name: {name}")]
    DuplicateService { name: String },

    #[error("Duplicate hook name: {name}")]
    DuplicateHook { name: String },

    #[error("Duplicate module id: {id}")]
    DuplicateModule { id: String },

    #[error("Hook registration is closed, '{name}' was submitted after Phase 2 began")]
    RegistrationClosed { name: String },

    #[error("Service not found: {name}")]
    ServiceNotFound { name: String },

    #[error("Service '{name}' is not of type {type_name}")]
    ServiceTypeMismatch { name: String, type_name: String },

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Unknown graph node: {id}")]
    UnknownNode { id: String },

    #[error("Critical hook failed: {}", .hooks.join(", "))]
    CriticalHookFailed { hooks: Vec<String> },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModstrapError {
    /// Returns `true` for errors caused by a programming mistake in module
    /// wiring (duplicate names, late registration). These always abort startup.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ModstrapError::DuplicateService { .. }
                | ModstrapError::DuplicateHook { .. }
                | ModstrapError::DuplicateModule { .. }
                | ModstrapError::RegistrationClosed { .. }
        )
    }

    /// Returns `true` if this error must abort the startup sequence.
    pub fn is_fatal(&self) -> bool {
        self.is_configuration_error()
            || matches!(
                self,
                ModstrapError::Cycle { .. } | ModstrapError::CriticalHookFailed { .. }
            )
    }
}
