//! Tree store.
//!
//! An immutable-shape arena of [`TreeNode`]s. Children are owned by the
//! arena and listed by their parent in input order; the parent link is a
//! plain [`NodeId`] back-reference that never owns anything.
//!
//! Only the per-node [`LockState`](crate::state::LockState) behind each
//! node's latch ever changes after [`Tree::build`] returns.

use std::collections::{HashMap, VecDeque};

use crate::ancestry::AncestorIndex;
use crate::error::ConstructionError;
use crate::ids::NodeId;
use crate::latch::NodeLatch;
use crate::tracing_helpers::debug_log;

// ============================================================================
//  TreeShape
// ============================================================================

/// How the flat name list is linked into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeShape {
    /// Implicit m-ary layout: the children of the i-th name are the next
    /// `m` names not yet used, in order. The first name is the root.
    Arity(usize),

    /// Explicit `parent -> children` adjacency, children in order.
    ///
    /// A parent may appear in several entries; its children are appended.
    Edges(Vec<(String, Vec<String>)>),
}

// ============================================================================
//  TreeNode
// ============================================================================

/// One lockable resource.
#[derive(Debug)]
pub struct TreeNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    latch: NodeLatch,
}

impl TreeNode {
    /// Unique node name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent id, [`None`] for the root.
    #[inline]
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in input order.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the root.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// The latch guarding this node's lock state.
    #[inline]
    #[must_use]
    pub(crate) const fn latch(&self) -> &NodeLatch {
        &self.latch
    }
}

// ============================================================================
//  Tree
// ============================================================================

/// Fixed tree of lockable nodes.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    by_name: HashMap<String, NodeId>,
    root: NodeId,
    height: usize,
    ancestry: AncestorIndex,
}

impl Tree {
    /// Build a tree from unique `names` linked according to `shape`.
    ///
    /// # Errors
    /// Returns [`ConstructionError`] if the description is empty, repeats a
    /// name, references an unknown name, gives a node two parents, has
    /// more or fewer than one root, or contains a cycle.
    pub fn build<I, S>(names: I, shape: TreeShape) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ConstructionError::Empty);
        }
        check_capacity(names.len())?;

        let mut by_name: HashMap<String, NodeId> = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if by_name.insert(name.clone(), NodeId::from_index(i)).is_some() {
                return Err(ConstructionError::DuplicateName(name.clone()));
            }
        }

        let mut parents: Vec<Option<NodeId>> = vec![None; names.len()];
        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); names.len()];

        match shape {
            TreeShape::Arity(m) => link_arity(names.len(), m, &mut parents, &mut children),
            TreeShape::Edges(edges) => {
                link_edges(&names, &by_name, &edges, &mut parents, &mut children)?;
            }
        }

        let roots: Vec<NodeId> = (0..names.len())
            .filter(|&i| parents[i].is_none())
            .map(NodeId::from_index)
            .collect();

        let root: NodeId = match roots.as_slice() {
            [root] => *root,
            [] => return Err(ConstructionError::Cycle(names[0].clone())),
            _ => {
                return Err(ConstructionError::MultipleRoots {
                    roots: roots.iter().map(|r| names[r.index()].clone()).collect(),
                });
            }
        };

        let depths: Vec<usize> = compute_depths(root, &children, &names)?;
        let height: usize = depths.iter().copied().max().unwrap_or(0);
        let ancestry = AncestorIndex::build(&parents, &depths, height);

        let nodes: Vec<TreeNode> = names
            .into_iter()
            .zip(parents)
            .zip(children)
            .zip(depths)
            .map(|(((name, parent), children), depth)| TreeNode {
                name,
                parent,
                children,
                depth,
                latch: NodeLatch::new(),
            })
            .collect();

        debug_log!(nodes = nodes.len(), height, "tree built");

        Ok(Self {
            nodes,
            by_name,
            root,
            height,
            ancestry,
        })
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a built tree has at least its root.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Maximum depth of any node.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The binary-lifting ancestor index.
    #[inline]
    #[must_use]
    pub const fn ancestry(&self) -> &AncestorIndex {
        &self.ancestry
    }

    /// Look up a node by name.
    #[inline]
    #[must_use]
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// The node with id `id`.
    ///
    /// # Panics
    /// Panics if `id` was not issued by this tree.
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    /// Name of node `id`.
    #[inline]
    #[must_use]
    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].name
    }

    /// Parent of node `id`.
    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Children of node `id`, in input order.
    #[inline]
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Depth of node `id`.
    #[inline]
    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.nodes[id.index()].depth
    }

    /// All node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    /// The chain `root, ..., id`, top-down.
    #[must_use]
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = Vec::with_capacity(self.depth(id) + 1);
        path.push(id);
        path.extend(self.ancestry.ancestors(id));
        path.reverse();
        path
    }

    /// Strict descendants of `id`, pre-order.
    ///
    /// Uses an explicit stack so deep trees cannot overflow the call stack.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();

        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }

        out
    }
}

// ============================================================================
//  Construction helpers
// ============================================================================

/// Every arena index must fit in a [`NodeId`].
fn check_capacity(count: usize) -> Result<(), ConstructionError> {
    if u32::try_from(count).is_err() {
        return Err(ConstructionError::TooManyNodes {
            count,
            max: NodeId::MAX_COUNT,
        });
    }
    Ok(())
}

fn link_arity(
    len: usize,
    m: usize,
    parents: &mut [Option<NodeId>],
    children: &mut [Vec<NodeId>],
) {
    let mut next: usize = 1;

    for parent in 0..len {
        for _ in 0..m {
            if next >= len {
                return;
            }
            parents[next] = Some(NodeId::from_index(parent));
            children[parent].push(NodeId::from_index(next));
            next += 1;
        }
    }
}

fn link_edges(
    names: &[String],
    by_name: &HashMap<String, NodeId>,
    edges: &[(String, Vec<String>)],
    parents: &mut [Option<NodeId>],
    children: &mut [Vec<NodeId>],
) -> Result<(), ConstructionError> {
    let lookup = |name: &String| {
        by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConstructionError::UnknownName(name.clone()))
    };

    for (parent_name, child_names) in edges {
        let parent: NodeId = lookup(parent_name)?;

        for child_name in child_names {
            let child: NodeId = lookup(child_name)?;

            if child == parent {
                return Err(ConstructionError::Cycle(child_name.clone()));
            }

            if let Some(existing) = parents[child.index()] {
                return Err(ConstructionError::MultipleParents {
                    child: child_name.clone(),
                    first: names[existing.index()].clone(),
                    second: parent_name.clone(),
                });
            }

            parents[child.index()] = Some(parent);
            children[parent.index()].push(child);
        }
    }

    Ok(())
}

/// Breadth-first depth assignment from `root`.
///
/// Every non-root node has exactly one parent at this point, so a node the
/// walk never reaches must sit on a parent cycle.
fn compute_depths(
    root: NodeId,
    children: &[Vec<NodeId>],
    names: &[String],
) -> Result<Vec<usize>, ConstructionError> {
    let mut depths: Vec<Option<usize>> = vec![None; children.len()];
    let mut queue: VecDeque<NodeId> = VecDeque::from([root]);
    depths[root.index()] = Some(0);

    while let Some(node) = queue.pop_front() {
        let child_depth: usize = depths[node.index()].unwrap_or(0) + 1;
        for &child in &children[node.index()] {
            depths[child.index()] = Some(child_depth);
            queue.push_back(child);
        }
    }

    depths
        .into_iter()
        .enumerate()
        .map(|(i, depth)| depth.ok_or_else(|| ConstructionError::Cycle(names[i].clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_edges() -> TreeShape {
        TreeShape::Edges(vec![
            ("World".into(), vec!["Asia".into(), "Africa".into()]),
            ("Asia".into(), vec!["China".into(), "India".into()]),
            ("Africa".into(), vec!["SouthAfrica".into(), "Egypt".into()]),
        ])
    }

    const WORLD: [&str; 7] = [
        "World",
        "Asia",
        "Africa",
        "China",
        "India",
        "SouthAfrica",
        "Egypt",
    ];

    #[test]
    fn test_arity_layout_matches_edges() {
        let by_arity = Tree::build(WORLD, TreeShape::Arity(2)).unwrap();
        let by_edges = Tree::build(WORLD, world_edges()).unwrap();

        for name in WORLD {
            let a = by_arity.id(name).unwrap();
            let e = by_edges.id(name).unwrap();
            assert_eq!(by_arity.depth(a), by_edges.depth(e), "{name}");
            assert_eq!(
                by_arity.parent(a).map(|p| by_arity.name(p).to_string()),
                by_edges.parent(e).map(|p| by_edges.name(p).to_string()),
            );
        }

        assert_eq!(by_arity.height(), 2);
        assert_eq!(by_arity.name(by_arity.root()), "World");
    }

    #[test]
    fn test_arity_partial_last_level() {
        let tree = Tree::build(["a", "b", "c", "d", "e"], TreeShape::Arity(3)).unwrap();
        let a = tree.id("a").unwrap();
        let b = tree.id("b").unwrap();

        assert_eq!(tree.children(a).len(), 3);
        assert_eq!(tree.children(b).len(), 1);
        assert_eq!(tree.name(tree.children(b)[0]), "e");
    }

    #[test]
    fn test_single_node_tree() {
        let tree = Tree::build(["only"], TreeShape::Arity(0)).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.height(), 0);
        assert!(tree.descendants(tree.root()).is_empty());
    }

    #[test]
    fn test_path_and_descendants() {
        let tree = Tree::build(WORLD, world_edges()).unwrap();
        let india = tree.id("India").unwrap();
        let path: Vec<&str> = tree
            .path_from_root(india)
            .into_iter()
            .map(|id| tree.name(id))
            .collect();
        assert_eq!(path, ["World", "Asia", "India"]);

        let below: Vec<&str> = tree
            .descendants(tree.root())
            .into_iter()
            .map(|id| tree.name(id))
            .collect();
        assert_eq!(
            below,
            ["Asia", "China", "India", "Africa", "SouthAfrica", "Egypt"]
        );
    }

    #[test]
    fn test_rejects_empty() {
        let names: [&str; 0] = [];
        assert_eq!(
            Tree::build(names, TreeShape::Arity(2)).unwrap_err(),
            ConstructionError::Empty
        );
    }

    #[test]
    fn test_capacity_limit() {
        assert_eq!(check_capacity(1), Ok(()));
        assert_eq!(check_capacity(NodeId::MAX_COUNT), Ok(()));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_rejects_more_nodes_than_ids() {
        let count: usize = NodeId::MAX_COUNT + 1;
        assert_eq!(
            check_capacity(count),
            Err(ConstructionError::TooManyNodes {
                count,
                max: NodeId::MAX_COUNT,
            })
        );
    }

    #[test]
    fn test_rejects_duplicate_name() {
        assert_eq!(
            Tree::build(["a", "b", "a"], TreeShape::Arity(2)).unwrap_err(),
            ConstructionError::DuplicateName("a".into())
        );
    }

    #[test]
    fn test_rejects_zero_arity_forest() {
        let err = Tree::build(["a", "b"], TreeShape::Arity(0)).unwrap_err();
        assert!(matches!(err, ConstructionError::MultipleRoots { .. }));
    }

    #[test]
    fn test_rejects_unknown_name() {
        let shape = TreeShape::Edges(vec![("a".into(), vec!["zzz".into()])]);
        assert_eq!(
            Tree::build(["a", "b"], shape).unwrap_err(),
            ConstructionError::UnknownName("zzz".into())
        );
    }

    #[test]
    fn test_rejects_two_parents() {
        let shape = TreeShape::Edges(vec![
            ("a".into(), vec!["b".into(), "c".into()]),
            ("b".into(), vec!["c".into()]),
        ]);
        assert!(matches!(
            Tree::build(["a", "b", "c"], shape).unwrap_err(),
            ConstructionError::MultipleParents { .. }
        ));
    }

    #[test]
    fn test_rejects_cycle() {
        // a is the root; b <-> c form a detached cycle.
        let shape = TreeShape::Edges(vec![
            ("b".into(), vec!["c".into()]),
            ("c".into(), vec!["b".into()]),
        ]);
        assert!(matches!(
            Tree::build(["a", "b", "c"], shape).unwrap_err(),
            ConstructionError::Cycle(_)
        ));

        let self_loop = TreeShape::Edges(vec![("a".into(), vec!["a".into()])]);
        assert!(matches!(
            Tree::build(["a"], self_loop).unwrap_err(),
            ConstructionError::Cycle(_)
        ));
    }

    #[test]
    fn test_rejects_forest() {
        let shape = TreeShape::Edges(vec![("a".into(), vec!["b".into()])]);
        let err = Tree::build(["a", "b", "c"], shape).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::MultipleRoots {
                roots: vec!["a".into(), "c".into()]
            }
        );
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let names: Vec<String> = (0..50_000).map(|i| format!("n{i}")).collect();
        let tree = Tree::build(names, TreeShape::Arity(1)).unwrap();

        assert_eq!(tree.height(), 49_999);
        assert_eq!(tree.descendants(tree.root()).len(), 49_999);

        let leaf = tree.id("n49999").unwrap();
        assert_eq!(tree.ancestry().kth_ancestor(leaf, 49_999), Some(tree.root()));
    }
}
