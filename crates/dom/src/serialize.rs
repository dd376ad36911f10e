//! Normalized HTML output
//!
//! Writes a reconstructed tree back out as HTML. Closer nodes are skipped
//! because the end tag is implied by the element's extent in the tree.

use crate::elements::{is_self_contained_element, is_void_element};
use crate::node::{CommentKind, DoctypeData, ElementData, Namespace, Node, NodeKind};

/// Serialize a node and its descendants
pub fn to_html(node: &Node) -> String {
    let mut output = String::new();
    write_node(node, false, &mut output);
    output
}

fn write_node(node: &Node, raw_text: bool, output: &mut String) {
    match &node.kind {
        NodeKind::Document => write_children(node, false, output),
        NodeKind::DocumentType(doctype) => write_doctype(doctype, output),
        NodeKind::Element(element) if element.is_closer => {}
        NodeKind::Element(element) => write_element(node, element, output),
        NodeKind::Text(text) => {
            if raw_text {
                output.push_str(text);
            } else {
                escape_text(text, output);
            }
        }
        NodeKind::CdataSection(text) => {
            output.push_str("<![CDATA[");
            output.push_str(text);
            output.push_str("]]>");
        }
        NodeKind::Comment {
            kind: CommentKind::PiLookalike,
            ..
        } => {
            output.push_str("<!--?");
            if let Some(NodeKind::ProcessingInstruction { target, data }) = node.child(0).map(|c| &c.kind) {
                output.push_str(&target.to_ascii_lowercase());
                if !data.is_empty() {
                    output.push(' ');
                    output.push_str(data);
                }
            }
            output.push_str("?-->");
        }
        NodeKind::Comment { value, .. } => {
            output.push_str("<!--");
            output.push_str(value);
            output.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            output.push_str("<?");
            output.push_str(target);
            if !data.is_empty() {
                output.push(' ');
                output.push_str(data);
            }
            output.push_str("?>");
        }
    }
}

fn write_children(node: &Node, raw_text: bool, output: &mut String) {
    for child in &node.children {
        write_node(child, raw_text, output);
    }
}

fn write_doctype(doctype: &DoctypeData, output: &mut String) {
    output.push_str("<!DOCTYPE ");
    output.push_str(&doctype.name);
    match (&doctype.public_id, &doctype.system_id) {
        (Some(public), Some(system)) => {
            output.push_str(&format!(" PUBLIC \"{}\" \"{}\"", public, system));
        }
        (Some(public), None) => output.push_str(&format!(" PUBLIC \"{}\"", public)),
        (None, Some(system)) => output.push_str(&format!(" SYSTEM \"{}\"", system)),
        (None, None) => {}
    }
    output.push('>');
}

fn write_element(node: &Node, element: &ElementData, output: &mut String) {
    let name = match element.namespace {
        Namespace::Html => element.local_name().to_ascii_lowercase(),
        _ => element.local_name().to_string(),
    };

    output.push('<');
    output.push_str(&name);
    for attribute in &element.attributes {
        output.push(' ');
        output.push_str(&attribute.name);
        output.push_str("=\"");
        escape_attribute(&attribute.value, output);
        output.push('"');
    }
    output.push('>');

    let html = element.namespace == Namespace::Html;
    if html && is_void_element(&name) {
        return;
    }

    let raw_text = html && is_self_contained_element(&name) && name != "textarea" && name != "title";
    write_children(node, raw_text, output);

    output.push_str("</");
    output.push_str(&name);
    output.push('>');
}

fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '\u{A0}' => output.push_str("&nbsp;"),
            c => output.push(c),
        }
    }
}

fn escape_attribute(value: &str, output: &mut String) {
    for c in value.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\u{A0}' => output.push_str("&nbsp;"),
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Attribute;

    fn el(name: &str) -> ElementData {
        ElementData::new(name, Namespace::Html)
    }

    #[test]
    fn test_closers_are_skipped() {
        let root = Node::document()
            .with_child(Node::element(el("P")).with_child(Node::text("a < b")))
            .with_child(Node::element(ElementData::closer("P", Namespace::Html)));

        assert_eq!(to_html(&root), "<p>a &lt; b</p>");
    }

    #[test]
    fn test_void_and_attributes() {
        let mut img = el("IMG");
        img.attributes.push(Attribute::new("alt", "say \"hi\""));
        img.attributes.push(Attribute::new("hidden", ""));
        let root = Node::document().with_child(Node::element(img));

        assert_eq!(to_html(&root), "<img alt=\"say &quot;hi&quot;\" hidden=\"\">");
    }

    #[test]
    fn test_raw_text_is_not_escaped() {
        let root = Node::document()
            .with_child(Node::element(el("SCRIPT")).with_child(Node::text("a && b")))
            .with_child(Node::element(el("TITLE")).with_child(Node::text("x & y")));

        assert_eq!(to_html(&root), "<script>a && b</script><title>x &amp; y</title>");
    }

    #[test]
    fn test_doctype_comment_and_foreign() {
        let root = Node::document()
            .with_child(Node::new(NodeKind::DocumentType(DoctypeData {
                name: "html".into(),
                public_id: None,
                system_id: None,
            })))
            .with_child(Node::comment(" note ", CommentKind::HtmlComment))
            .with_child(Node::element(ElementData::new("svg foreignObject", Namespace::Svg)));

        assert_eq!(
            to_html(&root),
            "<!DOCTYPE html><!-- note --><foreignObject></foreignObject>"
        );
    }

    #[test]
    fn test_pi_lookalike_comes_from_child() {
        let instruction = Node::new(NodeKind::ProcessingInstruction {
            target: "PHP".into(),
            data: "echo 1; ".into(),
        });
        let root = Node::document().with_child(Node::comment("", CommentKind::PiLookalike).with_child(instruction));

        assert_eq!(root.child(0).and_then(|c| c.node_value()), None);
        assert_eq!(to_html(&root), "<!--?php echo 1; ?-->");
    }
}
