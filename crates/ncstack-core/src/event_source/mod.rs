// ── Event sources ──
//
// One `NetconfEventSource` per connected device advertising NETCONF
// notifications, created and retired by the `EventSourceManager` as the
// operational topology changes.

mod manager;
mod registry;
mod source;

pub use manager::EventSourceManager;
pub use registry::EventSourceRegistry;
pub use source::{JoinTopicStatus, NetconfEventSource};
