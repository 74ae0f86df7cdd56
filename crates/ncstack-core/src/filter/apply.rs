// ── Filter evaluation (RFC 6241 §6.2) ──
//
// Content-match nodes at one level are ANDed and gate their parent.
// Selection nodes keep whole subtrees. Containment nodes recurse and are
// dropped when nothing below them survives. A level made only of
// content-match nodes keeps the parent's full content.

use ncstack_api::XmlElement;
use tracing::trace;

use super::sibling::{ContainmentNode, SiblingSet};

/// Children of `parent` selected by `set`, or `None` when a content-match
/// node is not satisfied (the parent is then not selected at all).
pub(crate) fn select_children(set: &SiblingSet, parent: &XmlElement) -> Option<Vec<XmlElement>> {
    for content in set.content_matches() {
        if !parent.child_elements().iter().any(|c| content.matches(c)) {
            trace!(element = %parent.name, content = content.value(), "content match failed");
            return None;
        }
    }

    if set.is_content_only() {
        return Some(parent.children.clone());
    }

    let mut selected = Vec::new();
    for child in parent.child_elements() {
        let keep_whole = set.content_matches().iter().any(|n| n.matches(child))
            || set.selections().iter().any(|n| n.matches(child));
        if keep_whole {
            selected.push(child.clone());
        } else if let Some(filtered) = set.containments().iter().find_map(|n| apply_containment(n, child)) {
            selected.push(filtered);
        }
    }
    Some(selected)
}

fn apply_containment(node: &ContainmentNode, element: &XmlElement) -> Option<XmlElement> {
    if !node.selection().matches(element) {
        return None;
    }
    if node.children().is_empty() {
        return Some(element.clone());
    }
    let children = select_children(node.children(), element)?;
    if children.is_empty() {
        return None;
    }
    let mut filtered = element.shallow_clone();
    filtered.children = children;
    Some(filtered)
}
