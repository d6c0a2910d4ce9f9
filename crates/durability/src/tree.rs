//! Delta trees
//!
//! One tree per aggregate root touched by a commit. Nodes live in an arena
//! (`Vec<DeltaNode>`) and refer to their children by index; an
//! `ObjectId -> index` map guarantees each object appears once, so a cyclic
//! object graph can never recurse.
//!
//! Trees are built by the engine, consumed by the materializer, and never
//! persisted directly.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use chronicle_core::{AuditAction, EntityTag, ObjectId, PersistentObject};

/// One object inside a delta tree
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaNode {
    /// The object
    pub object_id: ObjectId,
    /// Owning parent, None at the aggregate root
    pub parent_object_id: Option<ObjectId>,
    /// Aggregate root the object belongs to
    pub root_object_id: ObjectId,
    /// Entity type
    pub entity_tag: EntityTag,
    /// The object itself was written by this commit
    pub is_dirty: bool,
    /// Some descendant was written by this commit
    pub child_is_dirty: bool,
    /// The aggregate was rolled back in this unit of work
    pub rolled_back: bool,
    /// Aggregate valid-from, inherited from the root
    pub valid_from: DateTime<Utc>,
    /// Arena indices of owned children
    pub children: Vec<usize>,
    /// Row action: the lock's action when dirty, Update for ancestor-only rows
    pub action: AuditAction,
    /// State before the commit
    pub prior_state: Option<PersistentObject>,
    /// State after the commit
    pub new_state: Option<PersistentObject>,
}

impl DeltaNode {
    /// Check whether the node gets an audit row
    pub fn needs_row(&self) -> bool {
        self.is_dirty || self.child_is_dirty
    }
}

/// Arena of the nodes of one aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaTree {
    root_object_id: ObjectId,
    nodes: Vec<DeltaNode>,
    index: FxHashMap<ObjectId, usize>,
}

impl DeltaTree {
    /// Start a tree at its top node
    ///
    /// The top node is usually the aggregate root; for objects detached from
    /// their aggregate it is the detached object itself.
    pub fn new(top: DeltaNode) -> Self {
        let mut index = FxHashMap::default();
        index.insert(top.object_id, 0);
        DeltaTree {
            root_object_id: top.root_object_id,
            nodes: vec![top],
            index,
        }
    }

    /// Aggregate root id shared by every node
    pub fn root_object_id(&self) -> ObjectId {
        self.root_object_id
    }

    /// Top node of the tree
    pub fn top(&self) -> &DeltaNode {
        &self.nodes[0]
    }

    /// Attach a child node under `parent`
    ///
    /// Returns the child's index, or None if the object is already in the tree.
    pub fn push_child(&mut self, parent: usize, node: DeltaNode) -> Option<usize> {
        if self.index.contains_key(&node.object_id) || parent >= self.nodes.len() {
            return None;
        }
        let idx = self.nodes.len();
        self.index.insert(node.object_id, idx);
        self.nodes.push(node);
        self.nodes[parent].children.push(idx);
        Some(idx)
    }

    /// Check whether an object is in the tree
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.index.contains_key(&object_id)
    }

    /// Node of an object
    pub fn get(&self, object_id: ObjectId) -> Option<&DeltaNode> {
        self.index.get(&object_id).map(|&idx| &self.nodes[idx])
    }

    /// Node by arena index
    pub fn node(&self, idx: usize) -> &DeltaNode {
        &self.nodes[idx]
    }

    /// Mutable node by arena index
    pub fn node_mut(&mut self, idx: usize) -> &mut DeltaNode {
        &mut self.nodes[idx]
    }

    /// All nodes in arena order
    pub fn nodes(&self) -> &[DeltaNode] {
        &self.nodes
    }

    /// Mutable access to all nodes
    pub fn nodes_mut(&mut self) -> &mut [DeltaNode] {
        &mut self.nodes
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its top node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node indices in pre-order (parent before children)
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        order
    }

    /// Set `child_is_dirty` on every node with a dirty descendant
    pub fn propagate_dirty(&mut self) {
        // Children always have higher arena indices than their parent.
        for idx in (0..self.nodes.len()).rev() {
            let dirty_below = self.nodes[idx]
                .children
                .iter()
                .any(|&c| self.nodes[c].is_dirty || self.nodes[c].child_is_dirty);
            self.nodes[idx].child_is_dirty = dirty_below;
        }
    }

    /// Tag every node rolled back if any node is
    pub fn spread_rolled_back(&mut self) -> bool {
        let any = self.nodes.iter().any(|n| n.rolled_back);
        if any {
            for node in &mut self.nodes {
                node.rolled_back = true;
            }
        }
        any
    }

    /// Check whether the tree produces any audit row
    pub fn has_rows(&self) -> bool {
        self.nodes.iter().any(DeltaNode::needs_row)
    }
}
