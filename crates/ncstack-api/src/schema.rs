// ── Schema naming ──
//
// Qualified names and absolute schema paths. A notification type is
// identified by the schema path of its definition; the namespace of the
// last component decides which event-source registrations own it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace-qualified name of a schema node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QName {
    /// Renders in the `(namespace)name` form used throughout log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}){}", self.namespace, self.name)
    }
}

/// Absolute path of a schema node, root first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaPath(Vec<QName>);

impl SchemaPath {
    pub fn new(components: Vec<QName>) -> Self {
        Self(components)
    }

    /// Path with a single component.
    pub fn of(qname: QName) -> Self {
        Self(vec![qname])
    }

    pub fn components(&self) -> &[QName] {
        &self.0
    }

    pub fn last(&self) -> Option<&QName> {
        self.0.last()
    }

    /// Namespace of the last component, empty for the root path.
    pub fn namespace(&self) -> &str {
        self.last().map_or("", |q| q.namespace.as_str())
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for qname in &self.0 {
            write!(f, "/{qname}")?;
        }
        Ok(())
    }
}

/// The parts of a device's resolved schema the core cares about: the
/// notification types the device can emit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaContext {
    pub notifications: Vec<SchemaPath>,
}

impl SchemaContext {
    pub fn with_notifications(notifications: Vec<SchemaPath>) -> Self {
        Self { notifications }
    }
}
