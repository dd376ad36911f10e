//! DOM query functionality (getElementById, getElementsByTagName, etc.)

use crate::node::{Node, NodeKind};

/// Trait for querying a parse tree
pub trait Queryable {
    /// All descendants in document order, excluding `self`
    fn descendants(&self) -> Vec<&Node>;

    /// Find the first opening element with the given ID attribute
    fn get_element_by_id(&self, id: &str) -> Option<&Node>;

    /// Find opening elements by tag name (case-insensitive, local name)
    fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<&Node>;

    /// Concatenated text of all descendant text and CDATA nodes
    fn text_content(&self) -> String;
}

impl Queryable for Node {
    fn descendants(&self) -> Vec<&Node> {
        let mut result = Vec::new();
        collect_descendants(self, &mut result);
        result
    }

    fn get_element_by_id(&self, id: &str) -> Option<&Node> {
        self.descendants().into_iter().find(|node| {
            node.as_element()
                .map(|e| !e.is_closer && e.id() == Some(id))
                .unwrap_or(false)
        })
    }

    fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<&Node> {
        self.descendants()
            .into_iter()
            .filter(|node| {
                node.as_element()
                    .map(|e| !e.is_closer && e.local_name().eq_ignore_ascii_case(tag_name))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn text_content(&self) -> String {
        let mut result = String::new();
        collect_text(self, &mut result);
        result
    }
}

fn collect_descendants<'a>(node: &'a Node, result: &mut Vec<&'a Node>) {
    for child in &node.children {
        result.push(child.as_ref());
        collect_descendants(child, result);
    }
}

fn collect_text(node: &Node, result: &mut String) {
    match &node.kind {
        NodeKind::Text(text) | NodeKind::CdataSection(text) => result.push_str(text),
        NodeKind::Comment { .. } | NodeKind::ProcessingInstruction { .. } => {}
        _ => {
            for child in &node.children {
                collect_text(child, result);
            }
        }
    }
}
