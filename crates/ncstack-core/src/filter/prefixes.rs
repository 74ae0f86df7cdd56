// ── Namespace prefix assignment ──
//
// Rendering a filter needs a prefix per namespace. Prefixes are synthetic
// (`a`..`z`, `aa`..) and assigned in lexicographic namespace order, so the
// same filter always renders the same way.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use super::SubtreeFilter;
use super::sibling::{NamespaceSelection, SiblingSet};
use crate::error::CoreError;

/// Prefixes XML reserves for itself.
const RESERVED: [&str; 2] = ["xml", "xmlns"];

/// Namespace -> prefix map of one filter, in assignment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixes {
    by_namespace: IndexMap<String, String>,
}

impl Prefixes {
    /// Assigns a prefix to every namespace used by an exact selection or a
    /// qualified attribute match anywhere in `filter`.
    pub fn of(filter: &SubtreeFilter) -> Self {
        let mut namespaces = BTreeSet::new();
        collect_namespaces(filter.siblings(), &mut namespaces);

        let mut counter = PrefixCounter::default();
        let by_namespace = namespaces
            .into_iter()
            .map(|ns| (ns.to_owned(), counter.next_prefix()))
            .collect();
        Self { by_namespace }
    }

    /// Prefix assigned to `namespace`. Asking for a namespace the filter
    /// never referenced is a logic error.
    pub fn get_prefix(&self, namespace: &str) -> Result<&str, CoreError> {
        self.by_namespace
            .get(namespace)
            .map(String::as_str)
            .ok_or_else(|| CoreError::illegal_state(format!("no prefix assigned to namespace {namespace}")))
    }

    /// `(prefix, namespace)` pairs in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_namespace
            .iter()
            .map(|(ns, prefix)| (prefix.as_str(), ns.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_namespace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_namespace.is_empty()
    }
}

fn collect_namespaces<'a>(set: &'a SiblingSet, out: &mut BTreeSet<&'a str>) {
    let mut add = |selection: &'a NamespaceSelection| {
        if let NamespaceSelection::Exact(qname) = selection {
            out.insert(qname.namespace.as_str());
        }
    };
    for node in set.content_matches() {
        add(node.selection());
    }
    for node in set.selections() {
        add(node.selection());
    }
    for node in set.containments() {
        add(node.selection());
    }

    for node in set.selections() {
        for attribute in node.attribute_matches() {
            if !attribute.selection.namespace.is_empty() {
                out.insert(attribute.selection.namespace.as_str());
            }
        }
    }
    for node in set.containments() {
        collect_namespaces(node.children(), out);
    }
}

// ── Counting scheme ──────────────────────────────────────────────────

/// Bijective base-26 rendering: 0 -> `a`, 25 -> `z`, 26 -> `aa`.
/// Negative indexes render as the empty string.
pub(crate) fn prefix_for(index: i64) -> String {
    let mut letters = Vec::new();
    let mut i = index;
    while i >= 0 {
        let offset = u8::try_from(i.rem_euclid(26)).unwrap_or_default();
        letters.push(char::from(b'a' + offset));
        i = i / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Hands out successive prefixes, skipping the reserved ones.
#[derive(Debug, Default)]
pub(crate) struct PrefixCounter {
    next: i64,
}

impl PrefixCounter {
    #[cfg(test)]
    fn starting_at(next: i64) -> Self {
        Self { next }
    }

    pub(crate) fn next_prefix(&mut self) -> String {
        loop {
            let prefix = prefix_for(self.next);
            self.next += 1;
            if !RESERVED.contains(&prefix.as_str()) {
                return prefix;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filter::{ContainmentNode, SelectionNode};

    #[test]
    fn counting_scheme() {
        assert_eq!(prefix_for(-1), "");
        assert_eq!(prefix_for(0), "a");
        assert_eq!(prefix_for(25), "z");
        assert_eq!(prefix_for(26), "aa");
        assert_eq!(prefix_for(51), "az");
        assert_eq!(prefix_for(52), "ba");
        assert_eq!(prefix_for(701), "zz");
        assert_eq!(prefix_for(702), "aaa");
    }

    #[test]
    fn counter_skips_xml() {
        // 16573 renders as "xml".
        assert_eq!(prefix_for(16_573), "xml");
        let mut counter = PrefixCounter::starting_at(16_572);
        assert_eq!(counter.next_prefix(), "xmk");
        assert_eq!(counter.next_prefix(), "xmm");
    }

    #[test]
    fn prefixes_follow_namespace_order() {
        let filter = SubtreeFilter::builder()
            .add(
                ContainmentNode::builder(NamespaceSelection::exact("urn:b", "top"))
                    .add(SelectionNode::new(NamespaceSelection::exact("urn:a", "users")))
                    .add(SelectionNode::new(NamespaceSelection::wildcard("groups")))
                    .build(),
            )
            .build();

        let prefixes = Prefixes::of(&filter);
        assert_eq!(prefixes.get_prefix("urn:a").unwrap(), "a");
        assert_eq!(prefixes.get_prefix("urn:b").unwrap(), "b");
        assert_eq!(
            prefixes.iter().collect::<Vec<_>>(),
            vec![("a", "urn:a"), ("b", "urn:b")]
        );
        assert!(matches!(
            prefixes.get_prefix("urn:c"),
            Err(CoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn wildcard_only_filter_has_no_prefixes() {
        let filter = SubtreeFilter::builder()
            .add(SelectionNode::new(NamespaceSelection::wildcard("top")))
            .build();
        assert!(Prefixes::of(&filter).is_empty());
    }
}
