//! Text rendering of parse trees

use crate::node::{Node, NodeKind};

/// Replace control characters with their Unicode control pictures
///
/// Line feeds keep a real newline after the picture so multi-line values
/// stay readable.
pub fn replace_invisible(s: &str) -> String {
    let mut output = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{7F}' => output.push('\u{2421}'),
            '\n' => output.push_str("\u{240A}\n"),
            c if (c as u32) < 0x20 => {
                // The Control Pictures block mirrors C0 at a fixed offset
                output.push(char::from_u32(c as u32 + 0x2400).unwrap_or(c));
            }
            c => output.push(c),
        }
    }
    output
}

/// Indented text renderer with the same toggles as the debugger UI
#[derive(Debug, Clone, Copy, Default)]
pub struct TreePrinter {
    pub show_closers: bool,
    pub show_invisible: bool,
    pub show_virtual: bool,
}

impl TreePrinter {
    /// Render `node` and its descendants, one node per line
    pub fn print(&self, node: &Node) -> String {
        let mut output = String::new();
        self.print_node(node, 0, &mut output);
        output
    }

    fn print_node(&self, node: &Node, depth: usize, output: &mut String) {
        if node.is_closer() && !self.show_closers {
            return;
        }

        let indent = "  ".repeat(depth);
        output.push_str(&indent);

        match &node.kind {
            NodeKind::Document => output.push_str("#document"),
            NodeKind::DocumentType(doctype) => {
                output.push_str("DOCTYPE: ");
                output.push_str(&doctype.name);
            }
            NodeKind::Element(element) => {
                if element.is_closer {
                    output.push('/');
                }
                output.push_str(&element.name);
                for attribute in &element.attributes {
                    output.push_str(&format!(" {}=\"{}\"", attribute.name, attribute.value));
                }
                if element.matches_selector == Some(true) {
                    output.push_str(" [matches]");
                }
            }
            NodeKind::Comment { kind, .. } => {
                output.push_str(&format!("#comment ({})", kind.as_str()));
            }
            _ => output.push_str(node.node_name()),
        }

        if self.show_virtual {
            match node.diagnostics.as_ref().and_then(|d| d.is_virtual) {
                Some(true) => output.push_str(" (virtual)"),
                Some(false) => output.push_str(" (real)"),
                None => {}
            }
        }

        if let Some(value) = node.node_value() {
            let value = if self.show_invisible {
                replace_invisible(value)
            } else {
                value.to_string()
            };
            output.push_str(": ");
            output.push_str(&format!("{:?}", value));
        }
        output.push('\n');

        for child in &node.children {
            self.print_node(child, depth + 1, output);
        }
    }
}
