// ── Capability URI interning ──
//
// Capability strings repeat across every device of the same model; the
// interner keeps one shared allocation per distinct URI. It is an ordinary
// value owned by the topology manager, not a process-wide table.

use std::sync::Arc;

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct CapabilityInterner {
    uris: DashMap<Arc<str>, ()>,
}

impl CapabilityInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared instance for `uri`, inserting it on first use.
    pub fn intern(&self, uri: &str) -> Arc<str> {
        if let Some(existing) = self.uris.get(uri) {
            return Arc::clone(existing.key());
        }
        Arc::clone(self.uris.entry(Arc::from(uri)).or_insert(()).key())
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}
