//! Persistent DOM tree
//!
//! The tree is a single shared root. Appending copies only the nodes on the
//! path from the root to the insertion point (`Arc::make_mut`), so a snapshot
//! taken before the append keeps seeing the old nodes while every untouched
//! subtree stays shared between the two versions.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::error::{DomError, DomResult};
use crate::node::{Node, NodeKind};
use crate::render::TreePrinter;

/// Child indices leading from the root to a node
pub type NodePath = SmallVec<[usize; 16]>;

/// Parse tree rooted at a document node
#[derive(Clone)]
pub struct DomTree {
    root: Arc<Node>,
}

impl DomTree {
    /// Create a tree holding only a document node
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::document()),
        }
    }

    /// Root document node
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Cheap immutable handle on the current state
    pub fn snapshot(&self) -> Arc<Node> {
        Arc::clone(&self.root)
    }

    /// Consume the tree, returning its root
    pub fn into_root(self) -> Arc<Node> {
        self.root
    }

    /// Get the node at `path`
    pub fn get(&self, path: &[usize]) -> Option<&Node> {
        let mut current: &Node = &self.root;
        for &index in path {
            current = current.child(index)?;
        }
        Some(current)
    }

    /// Append `node` as the last child of the node at `path`, returning its index
    pub fn append_child(&mut self, path: &[usize], node: Node) -> DomResult<usize> {
        let mut current: &mut Node = Arc::make_mut(&mut self.root);
        for &index in path {
            let child = current
                .children
                .get_mut(index)
                .ok_or_else(|| DomError::InvalidPath(path.to_vec()))?;
            current = Arc::make_mut(child);
        }

        if !current.can_have_children() {
            return Err(DomError::NotAContainer(path.to_vec()));
        }

        current.children.push(Arc::new(node));
        Ok(current.children.len() - 1)
    }

    /// Number of nodes in the tree, document included
    pub fn len(&self) -> usize {
        self.root.node_count()
    }

    /// Check if the tree is empty (only has the document node)
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Depth-first list of (path, node) pairs, document excluded
    pub fn walk(&self) -> Vec<(NodePath, &Node)> {
        let mut result = Vec::new();
        let mut path = NodePath::new();
        collect(&self.root, &mut path, &mut result);
        result
    }

    /// Pretty print the tree for debugging
    pub fn pretty_print(&self) -> String {
        TreePrinter::default().print(&self.root)
    }
}

fn collect<'a>(node: &'a Node, path: &mut NodePath, result: &mut Vec<(NodePath, &'a Node)>) {
    for (index, child) in node.children.iter().enumerate() {
        path.push(index);
        result.push((path.clone(), child.as_ref()));
        collect(child, path, result);
        path.pop();
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DomTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty_print())
    }
}

impl From<Arc<Node>> for DomTree {
    fn from(root: Arc<Node>) -> Self {
        debug_assert!(matches!(root.kind, NodeKind::Document));
        Self { root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ElementData, Namespace};

    fn element(name: &str) -> Node {
        Node::element(ElementData::new(name, Namespace::Html))
    }

    #[test]
    fn test_append_along_path() {
        let mut tree = DomTree::new();
        let html = tree.append_child(&[], element("HTML")).unwrap();
        let body = tree.append_child(&[html], element("BODY")).unwrap();
        tree.append_child(&[html, body], Node::text("Hello, World!")).unwrap();

        assert_eq!(tree.len(), 4); // document + html + body + text
        assert_eq!(tree.get(&[0, 0, 0]).and_then(|n| n.as_text()), Some("Hello, World!"));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let mut tree = DomTree::new();
        tree.append_child(&[], element("DIV")).unwrap();
        let before = tree.snapshot();

        tree.append_child(&[0], Node::text("late")).unwrap();

        assert!(before.children[0].children.is_empty());
        assert_eq!(tree.root().children[0].children.len(), 1);
    }

    #[test]
    fn test_untouched_subtrees_are_shared() {
        let mut tree = DomTree::new();
        tree.append_child(&[], element("A")).unwrap();
        tree.append_child(&[], element("B")).unwrap();
        tree.append_child(&[0], Node::text("in a")).unwrap();
        let before = tree.snapshot();

        tree.append_child(&[1], Node::text("in b")).unwrap();

        assert!(Arc::ptr_eq(&before.children[0], &tree.root().children[0]));
        assert!(!Arc::ptr_eq(&before.children[1], &tree.root().children[1]));
    }

    #[test]
    fn test_invalid_path() {
        let mut tree = DomTree::new();
        assert!(matches!(
            tree.append_child(&[3], Node::text("x")),
            Err(DomError::InvalidPath(_))
        ));

        tree.append_child(&[], Node::text("leaf")).unwrap();
        assert!(matches!(
            tree.append_child(&[0], Node::text("x")),
            Err(DomError::NotAContainer(_))
        ));
    }

    #[test]
    fn test_walk_paths() {
        let mut tree = DomTree::new();
        tree.append_child(&[], element("UL")).unwrap();
        tree.append_child(&[0], element("LI")).unwrap();
        tree.append_child(&[0], element("LI")).unwrap();

        let paths: Vec<Vec<usize>> = tree.walk().into_iter().map(|(p, _)| p.to_vec()).collect();
        assert_eq!(paths, vec![vec![0], vec![0, 0], vec![0, 1]]);
    }
}
