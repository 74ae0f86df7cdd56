// ── Subtree filter siblings ──
//
// RFC 6241 §6.2 node kinds. A sibling set keeps content-match, selection
// and containment nodes in separate lists; order is preserved within a
// list but not across lists.

use ncstack_api::{QName, XmlElement};

use crate::error::CoreError;

/// XML whitespace characters (XML 1.0 `S` production).
const XML_WHITESPACE: [char; 4] = [' ', '\t', '\r', '\n'];

// ── NamespaceSelection ───────────────────────────────────────────────

/// How a filter node selects its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceSelection {
    /// Name in one specific namespace.
    Exact(QName),
    /// Name in any namespace (the filter element had no namespace).
    Wildcard(String),
}

impl NamespaceSelection {
    pub fn exact(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Exact(QName::new(namespace, name))
    }

    pub fn wildcard(name: impl Into<String>) -> Self {
        Self::Wildcard(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Exact(qname) => &qname.name,
            Self::Wildcard(name) => name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Exact(qname) => Some(&qname.namespace),
            Self::Wildcard(_) => None,
        }
    }

    /// Name must be equal; a wildcard accepts any namespace.
    pub fn matches(&self, element: &XmlElement) -> bool {
        match self {
            Self::Exact(qname) => {
                element.name == qname.name
                    && element.namespace.as_deref() == Some(qname.namespace.as_str())
            }
            Self::Wildcard(name) => element.name == *name,
        }
    }

    fn from_element(element: &XmlElement) -> Self {
        match element.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => Self::exact(ns, element.name.clone()),
            _ => Self::wildcard(element.name.clone()),
        }
    }
}

// ── AttributeMatch ───────────────────────────────────────────────────

/// Attribute that a selected element must carry with this exact value.
/// An empty namespace stands for an unqualified attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeMatch {
    pub selection: QName,
    pub value: String,
}

impl AttributeMatch {
    pub fn new(selection: QName, value: impl Into<String>) -> Self {
        Self {
            selection,
            value: value.into(),
        }
    }

    pub fn matches(&self, element: &XmlElement) -> bool {
        element.attributes.iter().any(|attr| {
            attr.name == self.selection.name
                && attr.namespace.as_deref().unwrap_or("") == self.selection.namespace
                && attr.value == self.value
        })
    }
}

// ── Node kinds ───────────────────────────────────────────────────────

/// Leaf with text content: selects siblings whose value equals it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentMatchNode {
    selection: NamespaceSelection,
    value: String,
}

impl ContentMatchNode {
    /// Fails if `value` is empty or starts/ends with XML whitespace.
    pub fn new(selection: NamespaceSelection, value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(CoreError::invalid_argument(format!(
                "content match value for {} must not be empty",
                selection.name()
            )));
        }
        if value.starts_with(XML_WHITESPACE) || value.ends_with(XML_WHITESPACE) {
            return Err(CoreError::invalid_argument(format!(
                "content match value {value:?} for {} has leading or trailing whitespace",
                selection.name()
            )));
        }
        Ok(Self { selection, value })
    }

    pub fn selection(&self) -> &NamespaceSelection {
        &self.selection
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn matches(&self, element: &XmlElement) -> bool {
        self.selection.matches(element)
            && !element.has_child_elements()
            && element.text_content().trim_matches(XML_WHITESPACE) == self.value
    }
}

/// Empty leaf: selects the whole subtree of matching siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionNode {
    selection: NamespaceSelection,
    attribute_matches: Vec<AttributeMatch>,
}

impl SelectionNode {
    pub fn new(selection: NamespaceSelection) -> Self {
        Self {
            selection,
            attribute_matches: Vec::new(),
        }
    }

    pub fn builder(selection: NamespaceSelection) -> SelectionNodeBuilder {
        SelectionNodeBuilder {
            node: Self::new(selection),
        }
    }

    pub fn selection(&self) -> &NamespaceSelection {
        &self.selection
    }

    pub fn attribute_matches(&self) -> &[AttributeMatch] {
        &self.attribute_matches
    }

    pub(crate) fn matches(&self, element: &XmlElement) -> bool {
        self.selection.matches(element) && self.attribute_matches.iter().all(|a| a.matches(element))
    }
}

#[derive(Debug)]
pub struct SelectionNodeBuilder {
    node: SelectionNode,
}

impl SelectionNodeBuilder {
    pub fn add(mut self, attribute: AttributeMatch) -> Self {
        self.node.attribute_matches.push(attribute);
        self
    }

    pub fn build(self) -> SelectionNode {
        self.node
    }
}

/// Inner node: restricts the children of matching siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainmentNode {
    selection: NamespaceSelection,
    children: SiblingSet,
}

impl ContainmentNode {
    pub fn builder(selection: NamespaceSelection) -> ContainmentNodeBuilder {
        ContainmentNodeBuilder {
            selection,
            children: SiblingSet::default(),
        }
    }

    pub fn selection(&self) -> &NamespaceSelection {
        &self.selection
    }

    pub fn children(&self) -> &SiblingSet {
        &self.children
    }
}

#[derive(Debug)]
pub struct ContainmentNodeBuilder {
    selection: NamespaceSelection,
    children: SiblingSet,
}

impl ContainmentNodeBuilder {
    pub fn add(mut self, sibling: impl Into<Sibling>) -> Self {
        self.children.push(sibling.into());
        self
    }

    pub fn build(self) -> ContainmentNode {
        ContainmentNode {
            selection: self.selection,
            children: self.children,
        }
    }
}

// ── Sibling / SiblingSet ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sibling {
    ContentMatch(ContentMatchNode),
    Selection(SelectionNode),
    Containment(ContainmentNode),
}

impl Sibling {
    pub fn selection(&self) -> &NamespaceSelection {
        match self {
            Self::ContentMatch(node) => node.selection(),
            Self::Selection(node) => node.selection(),
            Self::Containment(node) => node.selection(),
        }
    }
}

impl From<ContentMatchNode> for Sibling {
    fn from(node: ContentMatchNode) -> Self {
        Self::ContentMatch(node)
    }
}

impl From<SelectionNode> for Sibling {
    fn from(node: SelectionNode) -> Self {
        Self::Selection(node)
    }
}

impl From<ContainmentNode> for Sibling {
    fn from(node: ContainmentNode) -> Self {
        Self::Containment(node)
    }
}

/// Siblings at one level of the filter, partitioned by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SiblingSet {
    content_matches: Vec<ContentMatchNode>,
    selections: Vec<SelectionNode>,
    containments: Vec<ContainmentNode>,
}

impl SiblingSet {
    pub(crate) fn push(&mut self, sibling: Sibling) {
        match sibling {
            Sibling::ContentMatch(node) => self.content_matches.push(node),
            Sibling::Selection(node) => self.selections.push(node),
            Sibling::Containment(node) => self.containments.push(node),
        }
    }

    pub fn content_matches(&self) -> &[ContentMatchNode] {
        &self.content_matches
    }

    pub fn selections(&self) -> &[SelectionNode] {
        &self.selections
    }

    pub fn containments(&self) -> &[ContainmentNode] {
        &self.containments
    }

    pub fn is_empty(&self) -> bool {
        self.content_matches.is_empty() && self.selections.is_empty() && self.containments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.content_matches.len() + self.selections.len() + self.containments.len()
    }

    /// Only content-match nodes at this level.
    pub fn is_content_only(&self) -> bool {
        !self.content_matches.is_empty() && self.selections.is_empty() && self.containments.is_empty()
    }

    // ── Reading ──────────────────────────────────────────────────────

    /// Classifies every child element of `parent` into this set.
    pub(crate) fn read_children(parent: &XmlElement) -> Result<Self, CoreError> {
        let mut set = Self::default();
        for child in parent.child_elements() {
            set.push(read_sibling(child)?);
        }
        Ok(set)
    }
}

fn read_sibling(element: &XmlElement) -> Result<Sibling, CoreError> {
    let selection = NamespaceSelection::from_element(element);
    if element.has_child_elements() {
        let children = SiblingSet::read_children(element)?;
        return Ok(Sibling::Containment(ContainmentNode {
            selection,
            children,
        }));
    }
    if element.text_content().is_empty() {
        let attribute_matches = element
            .attributes
            .iter()
            .filter(|attr| !attr.is_namespace_declaration())
            .map(|attr| {
                AttributeMatch::new(
                    QName::new(attr.namespace.clone().unwrap_or_default(), attr.name.clone()),
                    attr.value.clone(),
                )
            })
            .collect();
        return Ok(Sibling::Selection(SelectionNode {
            selection,
            attribute_matches,
        }));
    }
    ContentMatchNode::new(selection, element.text_content()).map(Sibling::ContentMatch)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sel() -> NamespaceSelection {
        NamespaceSelection::exact("urn:example:users", "name")
    }

    #[test]
    fn content_match_rejects_boundary_whitespace() {
        for bad in [" fred", "fred ", "\tfred", "fred\t", "\rfred", "fred\r", "\nfred", "fred\n", " "] {
            assert!(
                matches!(ContentMatchNode::new(sel(), bad), Err(CoreError::InvalidArgument { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn content_match_rejects_empty_value() {
        assert!(matches!(
            ContentMatchNode::new(sel(), ""),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn content_match_accepts_inner_whitespace() {
        for good in ["fred", "fred flintstone", "a\tb", "x\ny", "0"] {
            let node = ContentMatchNode::new(sel(), good);
            assert!(node.is_ok(), "{good:?} should be accepted");
        }
    }

    #[test]
    fn wildcard_matches_any_namespace() {
        let wildcard = NamespaceSelection::wildcard("users");
        assert!(wildcard.matches(&XmlElement::qualified("users", "urn:a")));
        assert!(wildcard.matches(&XmlElement::new("users")));
        assert!(!wildcard.matches(&XmlElement::new("user")));

        let exact = NamespaceSelection::exact("urn:a", "users");
        assert!(exact.matches(&XmlElement::qualified("users", "urn:a")));
        assert!(!exact.matches(&XmlElement::qualified("users", "urn:b")));
        assert!(!exact.matches(&XmlElement::new("users")));
    }

    #[test]
    fn sibling_set_partitions_by_kind() {
        let mut set = SiblingSet::default();
        set.push(SelectionNode::new(NamespaceSelection::wildcard("a")).into());
        set.push(ContentMatchNode::new(sel(), "x").unwrap().into());
        set.push(SelectionNode::new(NamespaceSelection::wildcard("b")).into());
        assert_eq!(set.len(), 3);
        assert_eq!(set.content_matches().len(), 1);
        let names: Vec<_> = set.selections().iter().map(|s| s.selection().name()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(!set.is_content_only());
    }
}
