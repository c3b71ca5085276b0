//! Collector catalog
//!
//! A collector is a named table of handlers, one per role it knows how to
//! collect. The coordinator asks each enabled collector for the handler of
//! every discovered role and turns each hit into tasks; roles without a
//! handler are skipped.
//!
//! | collector     | kind  | roles                  |
//! |---------------|-------|------------------------|
//! | `ceph`        | bulk  | master, monitor, osd   |
//! | `node`        | bulk  | node                   |
//! | `performance` | bulk  | node                   |
//! | `resource`    | usage | node                   |
//!
//! Usage collectors run once in each phase so their samples bracket the
//! bulk collection.

pub mod ceph;
pub mod node;
pub mod performance;
pub mod usage;

use crate::context::CollectContext;
use crate::error::{ConfigError, TaskResult};
use crate::topology::{Params, Role};
use std::collections::BTreeMap;
use std::fmt;

/// Entry point collecting one (node, params) pair of a role
pub type Handler = fn(&CollectContext, &str, &Params) -> TaskResult<()>;

/// Collectors enabled when none are requested explicitly
pub const DEFAULT_COLLECTORS: &[&str] = &["ceph", "node", "resource"];

/// When a collector runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    /// Phase 1 only
    Bulk,
    /// Sampled in phase 1 and again after the dwell interval
    Usage,
}

/// Named capability table: role -> handler
#[derive(Clone)]
pub struct Collector {
    name: &'static str,
    kind: CollectorKind,
    handlers: BTreeMap<Role, Handler>,
}

impl Collector {
    pub fn new(name: &'static str, kind: CollectorKind) -> Self {
        Self {
            name,
            kind,
            handlers: BTreeMap::new(),
        }
    }

    /// Register the handler for a role
    pub fn on(mut self, role: Role, handler: Handler) -> Self {
        self.handlers.insert(role, handler);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> CollectorKind {
        self.kind
    }

    /// Handler for a role, if this collector has one
    pub fn handler(&self, role: Role) -> Option<Handler> {
        self.handlers.get(&role).copied()
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.handlers.keys().copied()
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("roles", &self.roles().collect::<Vec<_>>())
            .finish()
    }
}

/// Every collector shipped with the tool
pub fn catalog() -> Vec<Collector> {
    vec![
        ceph::collector(),
        node::collector(),
        performance::collector(),
        usage::collector(),
    ]
}

/// Collectors selected for a run
#[derive(Debug, Clone, Default)]
pub struct CollectorSet {
    bulk: Vec<Collector>,
    usage: Option<Collector>,
}

impl CollectorSet {
    /// Pick collectors from the catalog by name
    pub fn select<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let catalog = catalog();
        let mut selected = Vec::new();

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }

            let collector = catalog.iter().find(|c| c.name() == name).ok_or_else(|| {
                ConfigError::UnknownCollector {
                    name: name.to_string(),
                    known: catalog.iter().map(Collector::name).collect::<Vec<_>>().join(","),
                }
            })?;

            if !selected.iter().any(|c: &Collector| c.name() == name) {
                selected.push(collector.clone());
            }
        }

        Ok(Self::from_collectors(selected))
    }

    /// Split arbitrary collectors by kind (the first usage collector wins)
    pub fn from_collectors(collectors: Vec<Collector>) -> Self {
        let mut set = Self::default();
        for collector in collectors {
            match collector.kind() {
                CollectorKind::Bulk => set.bulk.push(collector),
                CollectorKind::Usage if set.usage.is_none() => set.usage = Some(collector),
                CollectorKind::Usage => {}
            }
        }
        set
    }

    pub fn bulk(&self) -> &[Collector] {
        &self.bulk
    }

    pub fn usage(&self) -> Option<&Collector> {
        self.usage.as_ref()
    }

    /// Names of all selected collectors
    pub fn names(&self) -> Vec<&'static str> {
        self.bulk
            .iter()
            .chain(self.usage.iter())
            .map(Collector::name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_capabilities() {
        let catalog = catalog();
        let ceph = catalog.iter().find(|c| c.name() == "ceph").unwrap();
        assert!(ceph.handler(Role::Master).is_some());
        assert!(ceph.handler(Role::Osd).is_some());
        assert!(ceph.handler(Role::Monitor).is_some());
        assert!(ceph.handler(Role::Node).is_none());

        let node = catalog.iter().find(|c| c.name() == "node").unwrap();
        assert_eq!(node.roles().collect::<Vec<_>>(), vec![Role::Node]);
    }

    #[test]
    fn test_select_defaults() {
        let set = CollectorSet::select(DEFAULT_COLLECTORS).unwrap();
        assert_eq!(set.bulk().len(), 2);
        assert_eq!(set.usage().map(Collector::name), Some("resource"));
        assert_eq!(set.names(), vec!["ceph", "node", "resource"]);
    }

    #[test]
    fn test_select_without_usage() {
        let set = CollectorSet::select(&["node", "node", " performance "]).unwrap();
        assert_eq!(set.names(), vec!["node", "performance"]);
        assert!(set.usage().is_none());
    }

    #[test]
    fn test_select_unknown() {
        let err = CollectorSet::select(&["ceph", "gpu"]).unwrap_err();
        match err {
            ConfigError::UnknownCollector { name, known } => {
                assert_eq!(name, "gpu");
                assert!(known.contains("resource"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
