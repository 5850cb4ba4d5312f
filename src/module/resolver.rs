//! Module Resolver
//!
//! Orders modules for Phase 1. A misconfigured dependency never stops
//! startup: missing dependencies are ignored and cycles are broken, both
//! with a recorded warning.

use super::ModuleDescriptor;
use crate::error::{ModstrapError, Result};
use crate::graph::DependencyGraph;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Non-fatal problem found while resolving module dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    #[error("Module {module} depends on unknown module {dependency}")]
    MissingDependency { module: String, dependency: String },

    #[error(
        "Circular module dependency {}, dropped edge {} -> {}",
        .cycle.join(" -> "),
        .dropped.0,
        .dropped.1
    )]
    CircularDependency {
        cycle: Vec<String>,
        dropped: (String, String),
    },
}

impl ResolutionWarning {
    /// The module whose dependency contract is unmet.
    pub fn module(&self) -> &str {
        match self {
            ResolutionWarning::MissingDependency { module, .. } => module,
            ResolutionWarning::CircularDependency { dropped, .. } => &dropped.0,
        }
    }
}

/// Resolved load order.
#[derive(Debug)]
pub struct Resolution {
    /// Descriptors in load order: by wave, then by module id.
    pub order: Vec<ModuleDescriptor>,
    pub waves: Vec<Vec<String>>,
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    pub fn ids(&self) -> Vec<&str> {
        self.order.iter().map(ModuleDescriptor::id).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleResolver;

impl ModuleResolver {
    pub fn new() -> Self {
        Self
    }

    /// Order `descriptors` so every module follows its resolvable dependencies.
    ///
    /// A cycle is broken by dropping the lexicographically largest
    /// `(from, to)` edge on it, repeatedly, until the graph is acyclic.
    ///
    /// # Errors
    /// Returns [`ModstrapError::DuplicateModule`] if two descriptors share an id.
    pub fn resolve(&self, descriptors: Vec<ModuleDescriptor>) -> Result<Resolution> {
        let mut graph = DependencyGraph::new();
        for desc in &descriptors {
            if graph.contains(&desc.id) {
                return Err(ModstrapError::DuplicateModule {
                    id: desc.id.clone(),
                });
            }
            graph.add_node(desc.id.clone());
        }

        let mut warnings = Vec::new();
        for desc in &descriptors {
            for dep in &desc.dependencies {
                if graph.contains(dep) {
                    graph.add_edge(&desc.id, dep)?;
                } else {
                    tracing::warn!(module = %desc.id, dependency = %dep, "Module depends on unknown module");
                    warnings.push(ResolutionWarning::MissingDependency {
                        module: desc.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        while let Some(cycle) = graph.detect_cycle() {
            let Some(dropped) = cycle
                .windows(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .max()
            else {
                break;
            };
            graph.remove_edge(&dropped.0, &dropped.1);
            tracing::warn!(
                cycle = %cycle.join(" -> "),
                from = %dropped.0,
                to = %dropped.1,
                "Circular module dependency, dropping edge"
            );
            warnings.push(ResolutionWarning::CircularDependency { cycle, dropped });
        }

        let waves = graph.topo_order_by(Clone::clone)?;

        let mut by_id: HashMap<String, ModuleDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let order = waves
            .iter()
            .flatten()
            .filter_map(|id| by_id.remove(id))
            .collect();

        Ok(Resolution {
            order,
            waves,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, deps: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor::new(id, deps.iter().copied(), |_| Ok(()))
    }

    fn resolve(mods: Vec<ModuleDescriptor>) -> Resolution {
        ModuleResolver::new().resolve(mods).unwrap()
    }

    #[test]
    fn test_chain_resolves_in_dependency_order() {
        let resolution = resolve(vec![
            module("C", &["B"]),
            module("A", &[]),
            module("B", &["A"]),
        ]);
        assert_eq!(resolution.ids(), vec!["A", "B", "C"]);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_same_wave_is_ordered_by_id() {
        let resolution = resolve(vec![
            module("zeta", &[]),
            module("alpha", &[]),
            module("app", &["zeta", "alpha"]),
        ]);
        assert_eq!(resolution.waves, vec![vec!["alpha", "zeta"], vec!["app"]]);
        assert_eq!(resolution.ids(), vec!["alpha", "zeta", "app"]);
    }

    #[test]
    fn test_every_module_follows_its_dependencies() {
        let specs: Vec<(&str, Vec<&str>)> = vec![
            ("web", vec!["auth", "db", "cache"]),
            ("auth", vec!["db"]),
            ("cache", vec![]),
            ("db", vec!["config"]),
            ("config", vec![]),
            ("jobs", vec!["db", "web"]),
        ];
        let resolution = resolve(specs.iter().map(|(id, deps)| module(id, deps)).collect());
        let ids = resolution.ids();
        let pos = |id: &str| ids.iter().position(|m| *m == id).unwrap();
        for (id, deps) in &specs {
            for dep in deps {
                assert!(pos(*id) > pos(*dep), "{id} must load after {dep}");
            }
        }
    }

    #[test]
    fn test_missing_dependency_is_a_warning() {
        let resolution = resolve(vec![module("users", &["db", "ghost"]), module("db", &[])]);
        assert_eq!(resolution.ids(), vec!["db", "users"]);
        assert_eq!(
            resolution.warnings,
            vec![ResolutionWarning::MissingDependency {
                module: "users".into(),
                dependency: "ghost".into(),
            }]
        );
        assert_eq!(resolution.warnings[0].module(), "users");
    }

    #[test]
    fn test_cycle_is_broken_deterministically() {
        let resolution = resolve(vec![
            module("a", &["b"]),
            module("b", &["c"]),
            module("c", &["a"]),
            module("d", &["c"]),
        ]);
        // Edges on the cycle: (a,b) (b,c) (c,a); the largest is (c,a).
        assert_eq!(resolution.waves, vec![vec!["c"], vec!["b", "d"], vec!["a"]]);
        match &resolution.warnings[..] {
            [ResolutionWarning::CircularDependency { cycle, dropped }] => {
                assert_eq!(cycle, &["a", "b", "c", "a"]);
                assert_eq!(dropped, &("c".to_string(), "a".to_string()));
            }
            other => panic!("unexpected warnings: {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_cycles_terminate() {
        let resolution = resolve(vec![
            module("a", &["b", "c"]),
            module("b", &["a", "c"]),
            module("c", &["a", "b"]),
            module("self", &["self"]),
        ]);
        assert_eq!(resolution.order.len(), 4);
        assert!(resolution.warnings.len() >= 3);
        assert!(resolution
            .warnings
            .iter()
            .all(|w| matches!(w, ResolutionWarning::CircularDependency { .. })));

        let again = resolve(vec![
            module("a", &["b", "c"]),
            module("b", &["a", "c"]),
            module("c", &["a", "b"]),
            module("self", &["self"]),
        ]);
        assert_eq!(again.ids(), resolution.ids());
        assert_eq!(again.warnings, resolution.warnings);
    }

    #[test]
    fn test_duplicate_module_id_is_fatal() {
        let err = ModuleResolver::new()
            .resolve(vec![module("db", &[]), module("db", &[])])
            .unwrap_err();
        assert!(matches!(err, ModstrapError::DuplicateModule { id } if id == "db"));
    }
}
