// ── RFC 6241 subtree filters ──
//
// Immutable filter AST used to build `<get>` / `<get-config>` payloads and
// to evaluate filters locally. Equality and hashing are structural.

mod apply;
mod prefixes;
mod pretty;
mod sibling;

use ncstack_api::XmlElement;

pub use prefixes::Prefixes;
pub use sibling::{
    AttributeMatch, ContainmentNode, ContainmentNodeBuilder, ContentMatchNode, NamespaceSelection,
    SelectionNode, SelectionNodeBuilder, Sibling, SiblingSet,
};

use crate::error::CoreError;

/// A frozen subtree filter: the sibling set directly below `<filter>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubtreeFilter {
    siblings: SiblingSet,
}

impl SubtreeFilter {
    pub fn builder() -> SubtreeFilterBuilder {
        SubtreeFilterBuilder::default()
    }

    pub fn siblings(&self) -> &SiblingSet {
        &self.siblings
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    /// Reads the children of a `<filter>` element.
    ///
    /// Elements with children become containment nodes, empty elements
    /// become selection nodes (non-`xmlns` attributes turn into attribute
    /// matches) and text-only elements become content-match nodes. An
    /// element without a namespace selects by name only.
    pub fn read_from(filter: &XmlElement) -> Result<Self, CoreError> {
        Ok(Self {
            siblings: SiblingSet::read_children(filter)?,
        })
    }

    /// Writes this filter's siblings under `filter`. Not implemented yet.
    pub fn write_to(&self, _filter: &mut XmlElement) -> Result<(), CoreError> {
        Err(CoreError::Unsupported {
            operation: "SubtreeFilter::write_to".into(),
        })
    }

    /// Renders the filter with synthetic namespace prefixes.
    pub fn pretty_tree(&self) -> Result<String, CoreError> {
        pretty::pretty_tree(self)
    }

    /// Applies the filter to the children of `data` (typically `<data>`),
    /// returning a copy of `data` that holds only the selected content.
    pub fn apply(&self, data: &XmlElement) -> XmlElement {
        let mut result = data.shallow_clone();
        if self.is_empty() {
            return result;
        }
        if let Some(children) = apply::select_children(&self.siblings, data) {
            result.children = children;
        }
        result
    }
}

/// Accumulates siblings; [`build`](Self::build) freezes them.
#[derive(Debug, Default)]
pub struct SubtreeFilterBuilder {
    siblings: SiblingSet,
}

impl SubtreeFilterBuilder {
    pub fn add(mut self, sibling: impl Into<Sibling>) -> Self {
        self.siblings.push(sibling.into());
        self
    }

    pub fn build(self) -> SubtreeFilter {
        SubtreeFilter {
            siblings: self.siblings,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ncstack_api::xml::XMLNS_NAMESPACE;
    use ncstack_api::{QName, XmlElement};
    use pretty_assertions::assert_eq;

    use super::*;

    const NS: &str = "http://example.com/schema/1.2/config";
    const NS2: &str = "http://example.com/schema/1.2/config2";

    fn exact(ns: &str, name: &str) -> NamespaceSelection {
        NamespaceSelection::exact(ns, name)
    }

    fn filter_element() -> XmlElement {
        XmlElement::qualified("filter", "urn:ietf:params:xml:ns:netconf:base:1.0")
            .with_attribute("type", "subtree")
    }

    // <t:top xmlns:t="..."><t:interfaces><t:interface t:ifName="eth0"/></t:interfaces></t:top>
    #[test]
    fn reads_attribute_match_example() {
        let xml = filter_element().with_child(
            XmlElement::qualified("top", NS)
                .with_qualified_attribute("t", XMLNS_NAMESPACE, NS)
                .with_child(
                    XmlElement::qualified("interfaces", NS).with_child(
                        XmlElement::qualified("interface", NS)
                            .with_qualified_attribute("ifName", NS, "eth0"),
                    ),
                ),
        );

        let expected = SubtreeFilter::builder()
            .add(
                ContainmentNode::builder(exact(NS, "top"))
                    .add(
                        ContainmentNode::builder(exact(NS, "interfaces"))
                            .add(
                                SelectionNode::builder(exact(NS, "interface"))
                                    .add(AttributeMatch::new(QName::new(NS, "ifName"), "eth0"))
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .build();

        assert_eq!(SubtreeFilter::read_from(&xml).unwrap(), expected);
    }

    #[test]
    fn reads_wildcards_for_unqualified_elements() {
        let xml = filter_element().with_child(
            XmlElement::qualified("top", NS).with_child(XmlElement::new("users").with_attribute("xmlns", "")),
        );

        let expected = SubtreeFilter::builder()
            .add(
                ContainmentNode::builder(exact(NS, "top"))
                    .add(SelectionNode::new(NamespaceSelection::wildcard("users")))
                    .build(),
            )
            .build();

        assert_eq!(SubtreeFilter::read_from(&xml).unwrap(), expected);
    }

    #[test]
    fn reads_content_match_nodes() {
        let xml = filter_element().with_child(
            XmlElement::qualified("users", NS).with_child(
                XmlElement::qualified("user", NS)
                    .with_child(XmlElement::qualified("name", NS).with_text("fred"))
                    .with_child(XmlElement::qualified("company-info", NS)),
            ),
        );

        let filter = SubtreeFilter::read_from(&xml).unwrap();
        let user = &filter.siblings().containments()[0].children().containments()[0];
        assert_eq!(user.children().content_matches()[0].value(), "fred");
        assert_eq!(user.children().selections().len(), 1);
    }

    #[test]
    fn read_rejects_padded_content() {
        let xml = filter_element()
            .with_child(XmlElement::qualified("name", NS).with_text("\n  fred\n"));
        assert!(matches!(
            SubtreeFilter::read_from(&xml),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn equality_is_structural_within_partitions() {
        let selection = || SelectionNode::new(exact(NS, "users"));
        let content = || ContentMatchNode::new(exact(NS, "name"), "fred").unwrap();

        // Partitions are independent, so cross-kind insertion order is irrelevant.
        let a = SubtreeFilter::builder().add(selection()).add(content()).build();
        let b = SubtreeFilter::builder().add(content()).add(selection()).build();
        assert_eq!(a, b);

        let c = SubtreeFilter::builder()
            .add(SelectionNode::new(exact(NS, "a")))
            .add(SelectionNode::new(exact(NS, "b")))
            .build();
        let d = SubtreeFilter::builder()
            .add(SelectionNode::new(exact(NS, "b")))
            .add(SelectionNode::new(exact(NS, "a")))
            .build();
        assert_ne!(c, d);
    }

    #[test]
    fn write_to_is_unsupported() {
        let mut target = filter_element();
        let result = SubtreeFilter::builder().build().write_to(&mut target);
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
    }

    #[test]
    fn pretty_tree_declares_namespaces_at_depth_one() {
        let filter = SubtreeFilter::builder()
            .add(
                ContainmentNode::builder(exact(NS, "top"))
                    .add(
                        ContainmentNode::builder(exact(NS2, "users"))
                            .add(ContentMatchNode::new(NamespaceSelection::wildcard("id"), "123").unwrap())
                            .build(),
                    )
                    .add(
                        SelectionNode::builder(exact(NS, "interface"))
                            .add(AttributeMatch::new(QName::new(NS, "ifName"), "say \"eth0\""))
                            .build(),
                    )
                    .build(),
            )
            .build();

        let expected = concat!(
            "<filter type=\"subtree\">\n",
            "  <a:top xmlns:a=\"http://example.com/schema/1.2/config\" xmlns:b=\"http://example.com/schema/1.2/config2\">\n",
            "    <a:interface a:ifName=\"say &quot;eth0&quot;\"/>\n",
            "    <b:users>\n",
            "      <id>\n",
            "        123\n",
            "      </id>\n",
            "    </b:users>\n",
            "  </a:top>\n",
            "</filter>\n",
        );
        assert_eq!(filter.pretty_tree().unwrap(), expected);
    }

    #[test]
    fn pretty_tree_of_rfc_users_example() {
        let user = |name: &str, dept: Option<&str>| {
            let mut builder = ContainmentNode::builder(exact(NS, "user"))
                .add(ContentMatchNode::new(exact(NS, "name"), name).unwrap());
            builder = match dept {
                Some(leaf) => builder.add(
                    ContainmentNode::builder(exact(NS, "company-info"))
                        .add(SelectionNode::new(exact(NS, leaf)))
                        .build(),
                ),
                None => builder.add(SelectionNode::new(exact(NS, "company-info"))),
            };
            builder.build()
        };

        let filter = SubtreeFilter::builder()
            .add(
                ContainmentNode::builder(exact(NS, "top"))
                    .add(
                        ContainmentNode::builder(exact(NS, "users"))
                            .add(user("root", None))
                            .add(user("fred", Some("id")))
                            .add(user("barney", Some("dept")))
                            .build(),
                    )
                    .build(),
            )
            .build();

        insta::assert_snapshot!("rfc_users_pretty_tree", filter.pretty_tree().unwrap());
    }
}
