// ── XML element tree ──
//
// Namespace-resolved element tree exchanged with the transport: RPC
// inputs/outputs, notification bodies and subtree filters. Parsing and
// serialization of the XML text itself belong to the transport.

use serde::{Deserialize, Serialize};

/// Namespace URI of `xmlns` / `xmlns:*` declaration attributes.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// An attribute with its resolved namespace (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlAttribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

impl XmlAttribute {
    /// `true` for `xmlns` and `xmlns:prefix` namespace declarations.
    pub fn is_namespace_declaration(&self) -> bool {
        self.namespace.as_deref() == Some(XMLNS_NAMESPACE)
            || self.name == "xmlns"
            || self.name.starts_with("xmlns:")
    }
}

/// An element node. Mixed content is not modelled: an element carries
/// either child elements or text (both may be empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    pub name: String,
    /// Resolved namespace URI; `None` when the element is unqualified.
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn qualified(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    // ── Builder-style helpers ────────────────────────────────────────

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(XmlAttribute {
            name: name.into(),
            namespace: None,
            value: value.into(),
        });
        self
    }

    pub fn with_qualified_attribute(
        mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(XmlAttribute {
            name: name.into(),
            namespace: Some(namespace.into()),
            value: value.into(),
        });
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn child_elements(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn has_child_elements(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }

    /// Attribute value by local name and namespace.
    pub fn attribute(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    /// First child element with the given name and namespace.
    pub fn child(&self, name: &str, namespace: Option<&str>) -> Option<&XmlElement> {
        self.children
            .iter()
            .find(|c| c.name == name && c.namespace.as_deref() == namespace)
    }

    /// Copy of this element without its children (attributes and text kept).
    pub fn shallow_clone(&self) -> XmlElement {
        XmlElement {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
            text: self.text.clone(),
        }
    }
}
