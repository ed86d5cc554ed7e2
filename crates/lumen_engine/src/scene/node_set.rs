//! Eager, restartable node queries
//!
//! A [`NodeSet`] materializes its result at every query call: the scene
//! graph is mutated interleaved with queries, so results must not alias live
//! graph state. Each method returns a new set holding plain node handles.

use super::node::Node;

/// A materialized, ordered set of scene nodes
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: Vec<Node>,
}

impl NodeSet {
    /// Set containing a single seed node
    pub fn from(seed: &Node) -> Self {
        Self {
            nodes: vec![seed.clone()],
        }
    }

    /// Set containing the given seed nodes, in order
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// All descendants of the seed set, depth-first pre-order
    pub fn descendants(&self, include_self: bool) -> Self {
        let mut nodes = Vec::new();
        for seed in &self.nodes {
            collect_descendants(seed, include_self, &mut nodes);
        }
        Self { nodes }
    }

    /// All ancestors of the seed set, nearest first
    pub fn ancestors(&self, include_self: bool) -> Self {
        let mut nodes = Vec::new();
        for seed in &self.nodes {
            if include_self {
                push_unique(&mut nodes, seed.clone());
            }
            let mut current = seed.parent();
            while let Some(ancestor) = current {
                current = ancestor.parent();
                push_unique(&mut nodes, ancestor);
            }
        }
        Self { nodes }
    }

    /// The distinct roots of the seed set
    pub fn roots(&self) -> Self {
        let mut nodes = Vec::new();
        for seed in &self.nodes {
            push_unique(&mut nodes, seed.root());
        }
        Self { nodes }
    }

    /// Keep only nodes matching the predicate
    pub fn where_(&self, predicate: impl Fn(&Node) -> bool) -> Self {
        Self {
            nodes: self.nodes.iter().filter(|n| predicate(n)).cloned().collect(),
        }
    }

    /// The materialized nodes
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes in the set
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the set contains `node`
    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.iter().any(|n| n == node)
    }
}

fn collect_descendants(node: &Node, include_self: bool, out: &mut Vec<Node>) {
    if include_self {
        out.push(node.clone());
    }
    for child in node.children() {
        collect_descendants(&child, true, out);
    }
}

fn push_unique(nodes: &mut Vec<Node>, node: Node) {
    if !nodes.iter().any(|n| *n == node) {
        nodes.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (Node, Node, Node, Node) {
        let root = Node::new("root");
        let a = Node::new("a");
        let b = Node::new("b");
        let leaf = Node::new("leaf");
        root.add_child(&a).unwrap();
        root.add_child(&b).unwrap();
        a.add_child(&leaf).unwrap();
        (root, a, b, leaf)
    }

    #[test]
    fn test_descendants_depth_first() {
        let (root, a, b, leaf) = small_tree();
        let set = NodeSet::from(&root).descendants(true);
        assert_eq!(set.nodes(), &[root, a, leaf, b]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let (root, a, _b, leaf) = small_tree();
        let set = NodeSet::from(&leaf).ancestors(false);
        assert_eq!(set.nodes(), &[a, root]);
    }

    #[test]
    fn test_where_filters_by_name() {
        let (root, _a, b, _leaf) = small_tree();
        let set = NodeSet::from(&root)
            .descendants(false)
            .where_(|n| n.name() == "b");
        assert_eq!(set.nodes(), &[b]);
    }

    #[test]
    fn test_results_do_not_alias_graph() {
        let (root, a, _b, leaf) = small_tree();
        let before = NodeSet::from(&root).descendants(true);
        a.remove_child(&leaf).unwrap();
        // The materialized set still holds the removed node.
        assert!(before.contains(&leaf));
        let after = NodeSet::from(&root).descendants(true);
        assert!(!after.contains(&leaf));
    }

    #[test]
    fn test_roots_dedup() {
        let (root, a, b, _leaf) = small_tree();
        let set = NodeSet::from_nodes(vec![a, b]).roots();
        assert_eq!(set.nodes(), &[root]);
    }
}
