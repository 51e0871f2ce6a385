//! Variable Tree (Vtree): the fixed decomposition structure of a circuit.
//!
//! A vtree is a full binary tree whose leaves correspond to Boolean variables.
//! Every decision node of a regression circuit is bound to an internal vtree
//! node, and every terminal is bound to a leaf.
//!
//! # Properties
//!
//! - Every internal node has exactly two children (left and right)
//! - Leaves are labeled with variables (1-indexed)
//! - Every node knows the full set of variables in its subtree
//!
//! The vtree is immutable once built and is shared by reference for the whole
//! lifetime of a circuit.
//!
//! # Example
//!
//! For variables {x₁, x₂, x₃, x₄}, a balanced vtree looks like:
//!
//! ```text
//!        (3)
//!        / \
//!       /   \
//!     (1)   (5)
//!     / \   / \
//!    x₁ x₂ x₃ x₄
//! ```
//!
//! Numbers in parentheses are node indices. Constructed vtrees use in-order
//! positions as indices; vtrees read from a file keep the ids of the file.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display};

/// Unique identifier for a vtree node (its slot in the node array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VtreeId(u32);

impl VtreeId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the index (0-based) for array access.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for VtreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A vtree node: either a leaf (variable) or internal (with left/right children).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtreeNode {
    /// A leaf node labeled with a variable (1-indexed).
    Leaf { var: u32 },

    /// An internal node with left and right children.
    Internal { left: VtreeId, right: VtreeId },
}

impl VtreeNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, VtreeNode::Leaf { .. })
    }

    /// Returns the variable if this is a leaf, None otherwise.
    #[inline]
    pub fn var(&self) -> Option<u32> {
        match self {
            VtreeNode::Leaf { var } => Some(*var),
            VtreeNode::Internal { .. } => None,
        }
    }

    /// Returns the children if this is an internal node, None otherwise.
    #[inline]
    pub fn children(&self) -> Option<(VtreeId, VtreeId)> {
        match self {
            VtreeNode::Internal { left, right } => Some((*left, *right)),
            VtreeNode::Leaf { .. } => None,
        }
    }
}

/// A complete variable tree (vtree).
///
/// Nodes are stored in a flat array for efficient access.
#[derive(Debug, Clone)]
pub struct Vtree {
    /// All vtree nodes, indexed by VtreeId.
    nodes: Vec<VtreeNode>,
    /// The root node ID.
    root: VtreeId,
    /// Number of variables.
    num_vars: u32,
    /// Mapping from variable to its leaf vtree node.
    var_to_vtree: Vec<VtreeId>,
    /// External index of each node, as written in vtree and circuit files.
    indices: Vec<u32>,
    /// Reverse mapping of `indices`.
    index_to_id: HashMap<u32, VtreeId>,
    /// Variables under each node.
    variables: Vec<BTreeSet<u32>>,
}

impl Vtree {
    /// Creates a balanced vtree for the given number of variables.
    ///
    /// Variables are numbered 1 to `num_vars`.
    pub fn balanced(num_vars: u32) -> Self {
        assert!(num_vars > 0, "Must have at least one variable");

        let mut nodes = Vec::new();
        let vars: Vec<u32> = (1..=num_vars).collect();
        let root = Self::build_balanced(&vars, &mut nodes);
        Self::with_inorder_indices(nodes, root)
    }

    /// Creates a right-linear (chain) vtree for the given number of variables.
    ///
    /// ```text
    ///            (root)
    ///            /    \
    ///           x₁    ( )
    ///                /   \
    ///               x₂   ( )
    ///                   /   \
    ///                  x₃   x₄
    /// ```
    pub fn right_linear(num_vars: u32) -> Self {
        assert!(num_vars > 0, "Must have at least one variable");

        let mut nodes = Vec::new();
        let root = Self::build_right_linear(1, num_vars, &mut nodes);
        Self::with_inorder_indices(nodes, root)
    }

    /// Creates a left-linear (chain) vtree for the given number of variables.
    ///
    /// ```text
    ///        (root)
    ///        /    \
    ///       ( )   x₄
    ///      /   \
    ///     ( )  x₃
    ///    /   \
    ///   x₁   x₂
    /// ```
    pub fn left_linear(num_vars: u32) -> Self {
        assert!(num_vars > 0, "Must have at least one variable");

        let mut nodes = Vec::new();
        let root = Self::build_left_linear(1, num_vars, &mut nodes);
        Self::with_inorder_indices(nodes, root)
    }

    fn build_balanced(vars: &[u32], nodes: &mut Vec<VtreeNode>) -> VtreeId {
        if vars.len() == 1 {
            return Self::push(nodes, VtreeNode::Leaf { var: vars[0] });
        }
        let mid = vars.len() / 2;
        let left = Self::build_balanced(&vars[..mid], nodes);
        let right = Self::build_balanced(&vars[mid..], nodes);
        Self::push(nodes, VtreeNode::Internal { left, right })
    }

    fn build_right_linear(first: u32, last: u32, nodes: &mut Vec<VtreeNode>) -> VtreeId {
        let left = Self::push(nodes, VtreeNode::Leaf { var: first });
        if first == last {
            return left;
        }
        let right = Self::build_right_linear(first + 1, last, nodes);
        Self::push(nodes, VtreeNode::Internal { left, right })
    }

    fn build_left_linear(first: u32, last: u32, nodes: &mut Vec<VtreeNode>) -> VtreeId {
        if first == last {
            return Self::push(nodes, VtreeNode::Leaf { var: first });
        }
        let left = Self::build_left_linear(first, last - 1, nodes);
        let right = Self::push(nodes, VtreeNode::Leaf { var: last });
        Self::push(nodes, VtreeNode::Internal { left, right })
    }

    fn push(nodes: &mut Vec<VtreeNode>, node: VtreeNode) -> VtreeId {
        let id = VtreeId::new(nodes.len() as u32);
        nodes.push(node);
        id
    }

    fn with_inorder_indices(nodes: Vec<VtreeNode>, root: VtreeId) -> Self {
        let mut indices = vec![0; nodes.len()];
        let mut pos = 0u32;
        Self::inorder(&nodes, root, &mut indices, &mut pos);
        Self::from_parts(nodes, root, indices)
    }

    fn inorder(nodes: &[VtreeNode], id: VtreeId, indices: &mut [u32], pos: &mut u32) {
        match nodes[id.index()] {
            VtreeNode::Leaf { .. } => {
                indices[id.index()] = *pos;
                *pos += 1;
            }
            VtreeNode::Internal { left, right } => {
                Self::inorder(nodes, left, indices, pos);
                indices[id.index()] = *pos;
                *pos += 1;
                Self::inorder(nodes, right, indices, pos);
            }
        }
    }

    /// Creates a vtree from raw parts.
    ///
    /// Children must appear before their parents in `nodes`.
    /// This is mainly used for deserialization.
    pub(crate) fn from_parts(nodes: Vec<VtreeNode>, root: VtreeId, indices: Vec<u32>) -> Self {
        let mut variables: Vec<BTreeSet<u32>> = Vec::with_capacity(nodes.len());
        let mut num_vars = 0;
        for node in &nodes {
            let vars = match *node {
                VtreeNode::Leaf { var } => {
                    num_vars = num_vars.max(var);
                    BTreeSet::from([var])
                }
                VtreeNode::Internal { left, right } => {
                    variables[left.index()].union(&variables[right.index()]).copied().collect()
                }
            };
            variables.push(vars);
        }

        let mut var_to_vtree = vec![VtreeId::new(0); (num_vars + 1) as usize];
        for (i, node) in nodes.iter().enumerate() {
            if let VtreeNode::Leaf { var } = node {
                var_to_vtree[*var as usize] = VtreeId::new(i as u32);
            }
        }

        let index_to_id = indices
            .iter()
            .enumerate()
            .map(|(i, &index)| (index, VtreeId::new(i as u32)))
            .collect();

        Self {
            nodes,
            root,
            num_vars,
            var_to_vtree,
            indices,
            index_to_id,
            variables,
        }
    }

    #[inline]
    pub fn root(&self) -> VtreeId {
        self.root
    }

    /// Returns the number of variables.
    #[inline]
    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, id: VtreeId) -> &VtreeNode {
        &self.nodes[id.index()]
    }

    /// Returns the external index of a vtree node.
    #[inline]
    pub fn index(&self, id: VtreeId) -> u32 {
        self.indices[id.index()]
    }

    /// Looks up a node by its external index.
    pub fn by_index(&self, index: u32) -> Option<VtreeId> {
        self.index_to_id.get(&index).copied()
    }

    /// Returns the leaf vtree node for a variable.
    #[inline]
    pub fn var_vtree(&self, var: u32) -> VtreeId {
        self.var_to_vtree[var as usize]
    }

    #[inline]
    pub fn is_leaf(&self, id: VtreeId) -> bool {
        self.node(id).is_leaf()
    }

    /// Returns the left child of an internal node.
    ///
    /// # Panics
    ///
    /// Panics if the node is a leaf.
    #[inline]
    pub fn left(&self, id: VtreeId) -> VtreeId {
        self.node(id).children().expect("Node is not internal").0
    }

    /// Returns the right child of an internal node.
    ///
    /// # Panics
    ///
    /// Panics if the node is a leaf.
    #[inline]
    pub fn right(&self, id: VtreeId) -> VtreeId {
        self.node(id).children().expect("Node is not internal").1
    }

    /// Returns the variable of a leaf node.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a leaf.
    #[inline]
    pub fn var(&self, id: VtreeId) -> u32 {
        self.node(id).var().expect("Node is not a leaf")
    }

    /// All variables in the subtree rooted at `id`.
    #[inline]
    pub fn variables(&self, id: VtreeId) -> &BTreeSet<u32> {
        &self.variables[id.index()]
    }

    /// Height of the subtree rooted at `id` (a leaf has height 0).
    pub fn height(&self, id: VtreeId) -> usize {
        match self.node(id) {
            VtreeNode::Leaf { .. } => 0,
            VtreeNode::Internal { left, right } => 1 + self.height(*left).max(self.height(*right)),
        }
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<VtreeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.node(id) {
                VtreeNode::Leaf { .. } => leaves.push(id),
                VtreeNode::Internal { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        leaves
    }
}

impl Display for Vtree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vtree({} vars, {} nodes)", self.num_vars, self.nodes.len())
    }
}
