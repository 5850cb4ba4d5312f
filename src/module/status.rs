use super::ResolutionWarning;
use serde::Serialize;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModuleState {
    Ready,
    /// Registration failed or a dependency contract is unmet. The module's
    /// own services and hooks may be missing.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub id: String,
    pub state: ModuleState,
    pub reasons: Vec<String>,
    pub services: Vec<String>,
    pub hooks: Vec<String>,
}

impl ModuleStatus {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ModuleState::Ready,
            reasons: Vec::new(),
            services: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub(crate) fn degrade(&mut self, reason: impl Into<String>) {
        self.state = ModuleState::Degraded;
        self.reasons.push(reason.into());
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModuleState::Ready
    }
}

/// Read-only Phase 1 snapshot for health checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleStatusReport {
    pub run_id: Option<Uuid>,
    pub load_order: Vec<String>,
    pub modules: Vec<ModuleStatus>,
    pub warnings: Vec<ResolutionWarning>,
}

impl ModuleStatusReport {
    pub fn module(&self, id: &str) -> Option<&ModuleStatus> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn degraded(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| !m.is_ready())
            .map(|m| m.id.as_str())
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.modules.iter().any(|m| !m.is_ready())
    }
}
