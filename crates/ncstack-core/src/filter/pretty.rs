// ── Filter pretty-printer ──
//
// Human-readable rendering used in logs and tests. Not a serializer: text
// content is emitted verbatim and only `"` is escaped in attribute values.

use super::SubtreeFilter;
use super::prefixes::Prefixes;
use super::sibling::{NamespaceSelection, SiblingSet};
use crate::error::CoreError;

const INDENT: &str = "  ";

pub(crate) fn pretty_tree(filter: &SubtreeFilter) -> Result<String, CoreError> {
    let prefixes = Prefixes::of(filter);
    let mut out = String::from("<filter type=\"subtree\">\n");
    Renderer {
        prefixes: &prefixes,
        out: &mut out,
    }
    .render_set(filter.siblings(), 1)?;
    out.push_str("</filter>\n");
    Ok(out)
}

struct Renderer<'a> {
    prefixes: &'a Prefixes,
    out: &'a mut String,
}

impl Renderer<'_> {
    fn render_set(&mut self, set: &SiblingSet, depth: usize) -> Result<(), CoreError> {
        for node in set.content_matches() {
            let tag = self.tag(node.selection())?;
            self.open(&tag, depth, "", false);
            self.line(depth + 1, node.value());
            self.close(&tag, depth);
        }
        for node in set.selections() {
            let tag = self.tag(node.selection())?;
            let mut attributes = String::new();
            for attribute in node.attribute_matches() {
                attributes.push(' ');
                if !attribute.selection.namespace.is_empty() {
                    attributes.push_str(self.prefixes.get_prefix(&attribute.selection.namespace)?);
                    attributes.push(':');
                }
                attributes.push_str(&attribute.selection.name);
                attributes.push_str("=\"");
                attributes.push_str(&attribute.value.replace('"', "&quot;"));
                attributes.push('"');
            }
            self.open(&tag, depth, &attributes, true);
        }
        for node in set.containments() {
            let tag = self.tag(node.selection())?;
            self.open(&tag, depth, "", false);
            self.render_set(node.children(), depth + 1)?;
            self.close(&tag, depth);
        }
        Ok(())
    }

    fn tag(&self, selection: &NamespaceSelection) -> Result<String, CoreError> {
        Ok(match selection {
            NamespaceSelection::Exact(qname) => {
                format!("{}:{}", self.prefixes.get_prefix(&qname.namespace)?, qname.name)
            }
            NamespaceSelection::Wildcard(name) => name.clone(),
        })
    }

    fn open(&mut self, tag: &str, depth: usize, attributes: &str, self_closing: bool) {
        self.indent(depth);
        self.out.push('<');
        self.out.push_str(tag);
        if depth == 1 {
            for (prefix, namespace) in self.prefixes.iter() {
                self.out.push_str(&format!(" xmlns:{prefix}=\"{namespace}\""));
            }
        }
        self.out.push_str(attributes);
        self.out.push_str(if self_closing { "/>\n" } else { ">\n" });
    }

    fn close(&mut self, tag: &str, depth: usize) {
        self.indent(depth);
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    fn line(&mut self, depth: usize, text: &str) {
        self.indent(depth);
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }
}
