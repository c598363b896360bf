//! The host metric-metadata oracle.
//!
//! Binding a registration needs to resolve `Name` leaves against whatever
//! namespace the embedding engine actually exposes — a real performance
//! metrics domain agent, a test fixture, anything. [`HostContext`] is that
//! seam; this crate never assumes a concrete namespace implementation.

use crate::ast::Descriptor;
use crate::collections::HashMap;
use crate::id::MetricId;

/// Per-context metric dictionary consulted by the binder.
///
/// Implementations must be safe to call with the registry's mutex held:
/// `open_context` invokes every method here while still holding it, so a
/// `HostContext` must be thread-safe in its own right.
pub trait HostContext {
    /// Resolve a dotted metric name to its id, if the host's namespace
    /// knows it.
    fn lookup_name(&self, name: &str) -> Option<MetricId>;

    /// Resolve an id to its descriptor. Only ever called with an id this
    /// same host just returned from `lookup_name`.
    fn lookup_desc(&self, id: MetricId) -> Option<Descriptor>;

    /// Whether `id` belongs to this host's namespace of *non-derived*
    /// metrics — used by the name-clash rule: a derived
    /// registration whose name resolves to a non-derived id in this
    /// context's namespace is silently disabled for that context.
    fn is_non_derived(&self, id: MetricId) -> bool {
        !id.is_derived()
    }
}

/// An in-memory [`HostContext`] backed by a flat name→(id, descriptor) map,
/// for tests and for embedders that already keep their namespace in memory.
#[derive(Debug, Default, Clone)]
pub struct MapHost {
    entries: HashMap<String, (MetricId, Descriptor)>,
}

impl MapHost {
    pub fn new() -> Self {
        MapHost {
            entries: HashMap::default(),
        }
    }

    /// Register a metric this host can resolve. Last write wins.
    pub fn with_metric(mut self, name: impl Into<String>, id: MetricId, descriptor: Descriptor) -> Self {
        self.entries.insert(name.into(), (id, descriptor));
        self
    }
}

impl HostContext for MapHost {
    fn lookup_name(&self, name: &str) -> Option<MetricId> {
        self.entries.get(name).map(|(id, _)| *id)
    }

    fn lookup_desc(&self, id: MetricId) -> Option<Descriptor> {
        self.entries.values().find(|(i, _)| *i == id).map(|(_, d)| d.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Semantics, ValueType};

    #[test]
    fn map_host_resolves_registered_metric() {
        let id = MetricId::derived(1);
        let host = MapHost::new().with_metric(
            "disk.dev.read",
            id,
            Descriptor::scalar(ValueType::U64, Semantics::Counter),
        );
        assert_eq!(host.lookup_name("disk.dev.read"), Some(id));
        assert!(host.lookup_desc(id).is_some());
        assert_eq!(host.lookup_name("nonesuch"), None);
    }
}
