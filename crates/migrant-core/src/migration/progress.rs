//! Weighted progress tree with cooperative cancellation.
//!
//! Each node counts `completed` out of `total` units. A child attached with
//! weight `w` contributes `w` units of its parent, pro rata while it runs and
//! in full once it finishes. Cancelling a node marks the node and every
//! unfinished descendant, including children attached later.

use parking_lot::RwLock;
use std::sync::Arc;

/// Callback fired once when a node is cancelled.
pub(crate) type CancellationHandler = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Identifier of a node in a [`ProgressTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

struct ProgressNode {
    label: String,
    total_units: u64,
    completed_units: u64,
    parent: Option<(NodeId, u64)>,
    children: Vec<NodeId>,
    cancelled: bool,
    handlers: Vec<CancellationHandler>,
}

impl ProgressNode {
    fn is_finished(&self) -> bool {
        self.completed_units >= self.total_units
    }
}

/// Read-only view of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    /// Node label.
    pub label: String,
    /// Total units.
    pub total_units: u64,
    /// Units completed, not counting running children.
    pub completed_units: u64,
    /// Completion in `[0, 1]`, including running children.
    pub fraction_completed: f64,
    /// Whether the node has been cancelled.
    pub cancelled: bool,
    /// Snapshots of the children, in attachment order.
    pub children: Vec<NodeSnapshot>,
}

/// Arena of progress nodes.
///
/// Node ids never leave the crate, and every id handed to a tree was minted
/// by that same tree.
pub(crate) struct ProgressTree {
    nodes: Vec<ProgressNode>,
}

impl std::fmt::Debug for ProgressTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTree")
            .field("nodes", &self.nodes.len())
            .field("fraction_completed", &self.fraction_completed(self.root()))
            .finish()
    }
}

impl ProgressTree {
    /// Create a tree with a single root node.
    pub fn new(label: impl Into<String>, total_units: u64) -> Self {
        Self {
            nodes: vec![ProgressNode {
                label: label.into(),
                total_units,
                completed_units: 0,
                parent: None,
                children: Vec::new(),
                cancelled: false,
                handlers: Vec::new(),
            }],
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Attach a child worth `weight` units of `parent`.
    ///
    /// A child of a cancelled node starts cancelled.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        total_units: u64,
        weight: u64,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let cancelled = self.nodes[parent.0].cancelled;
        self.nodes.push(ProgressNode {
            label: label.into(),
            total_units,
            completed_units: 0,
            parent: Some((parent, weight)),
            children: Vec::new(),
            cancelled,
            handlers: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Change the total of a node that has not completed anything yet.
    pub fn set_total_units(&mut self, node: NodeId, total_units: u64) {
        let entry = &mut self.nodes[node.0];
        entry.total_units = total_units.max(entry.completed_units);
    }

    /// Set the completed units of a node.
    ///
    /// Completion never goes backwards and is clamped to the total. When the
    /// node becomes finished its weight is credited to the parent, which may
    /// finish in turn.
    pub fn set_completed(&mut self, node: NodeId, completed_units: u64) {
        let mut current = node;
        let mut value = completed_units;
        loop {
            let entry = &mut self.nodes[current.0];
            let was_finished = entry.is_finished();
            entry.completed_units = value.clamp(entry.completed_units, entry.total_units);

            if was_finished || !entry.is_finished() {
                return;
            }
            let parent = entry.parent;
            match parent {
                Some((parent, weight)) => {
                    value = self.nodes[parent.0].completed_units + weight;
                    current = parent;
                }
                None => return,
            }
        }
    }

    /// Record progress reported from inside the work `node` stands for.
    ///
    /// The node is resized to `total` and completion moves to `completed`.
    /// Reports for a finished node, or with a zero total, are ignored.
    pub fn report(&mut self, node: NodeId, completed: u64, total: u64) {
        if total == 0 || self.nodes[node.0].is_finished() {
            return;
        }
        self.set_total_units(node, total);
        self.set_completed(node, completed);
    }

    /// Mark a node as fully completed.
    pub fn complete(&mut self, node: NodeId) {
        let total = self.nodes[node.0].total_units;
        self.set_completed(node, total);
    }

    /// Completion of `node` in `[0, 1]`, counting running children pro rata.
    pub fn fraction_completed(&self, node: NodeId) -> f64 {
        let entry = &self.nodes[node.0];
        if entry.total_units == 0 || entry.is_finished() {
            return 1.0;
        }

        let running: f64 = entry
            .children
            .iter()
            .filter(|child| !self.nodes[child.0].is_finished())
            .map(|&child| {
                let weight = self.nodes[child.0].parent.map_or(0, |(_, w)| w);
                weight as f64 * self.fraction_completed(child)
            })
            .sum();

        ((entry.completed_units as f64 + running) / entry.total_units as f64).min(1.0)
    }

    /// Check if a node is finished.
    pub fn is_finished(&self, node: NodeId) -> bool {
        self.nodes[node.0].is_finished()
    }

    /// Check if a node is cancelled.
    pub fn is_cancelled(&self, node: NodeId) -> bool {
        self.nodes[node.0].cancelled
    }

    /// Add a cancellation callback to `node`.
    ///
    /// Callbacks accumulate and fire in registration order. If the node is
    /// already cancelled the handler is handed back so the caller can run it
    /// right away.
    pub fn add_cancellation_handler(
        &mut self,
        node: NodeId,
        handler: CancellationHandler,
    ) -> Option<CancellationHandler> {
        let entry = &mut self.nodes[node.0];
        if entry.cancelled {
            return Some(handler);
        }
        entry.handlers.push(handler);
        None
    }

    /// Cancel `node` and its unfinished descendants.
    ///
    /// Returns the callbacks to fire. A finished or already cancelled node
    /// yields nothing.
    #[must_use]
    pub fn cancel(&mut self, node: NodeId) -> Vec<CancellationHandler> {
        let entry = &self.nodes[node.0];
        if entry.is_finished() || entry.cancelled {
            return Vec::new();
        }

        let mut handlers = Vec::new();
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let entry = &mut self.nodes[current.0];
            if entry.cancelled || entry.is_finished() {
                continue;
            }
            entry.cancelled = true;
            handlers.append(&mut entry.handlers);
            pending.extend(entry.children.iter().copied());
        }
        handlers
    }

    /// Snapshot of `node` and its subtree.
    pub fn snapshot(&self, node: NodeId) -> NodeSnapshot {
        let entry = &self.nodes[node.0];
        NodeSnapshot {
            label: entry.label.clone(),
            total_units: entry.total_units,
            completed_units: entry.completed_units,
            fraction_completed: self.fraction_completed(node),
            cancelled: entry.cancelled,
            children: entry.children.iter().map(|&c| self.snapshot(c)).collect(),
        }
    }
}

/// Shared handle on the progress of one migration.
///
/// The migrator is the only writer of completion. Any clone may read
/// progress or request cancellation from another thread.
#[derive(Debug, Clone)]
pub struct MigrationProgress {
    tree: Arc<RwLock<ProgressTree>>,
}

impl MigrationProgress {
    /// Create a progress handle whose root has a single pending unit.
    ///
    /// The migrator resizes the root once the plan is known.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            tree: Arc::new(RwLock::new(ProgressTree::new(label, 1))),
        }
    }

    /// Overall completion in `[0, 1]`.
    pub fn fraction_completed(&self) -> f64 {
        let tree = self.tree.read();
        tree.fraction_completed(tree.root())
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        let tree = self.tree.read();
        tree.is_cancelled(tree.root())
    }

    /// Check if the migration finished.
    pub fn is_finished(&self) -> bool {
        let tree = self.tree.read();
        tree.is_finished(tree.root())
    }

    /// Request cancellation.
    ///
    /// The running mapping completes; no further mapping starts. Callbacks
    /// run on the calling thread before this returns.
    pub fn cancel(&self) {
        let handlers = {
            let mut tree = self.tree.write();
            let root = tree.root();
            tree.cancel(root)
        };
        for handler in handlers {
            handler();
        }
    }

    /// Register a callback fired when the migration is cancelled.
    ///
    /// Every registered callback fires once. Runs immediately if
    /// cancellation was already requested.
    pub fn on_cancel(&self, handler: impl FnOnce() + Send + Sync + 'static) {
        let pending = {
            let mut tree = self.tree.write();
            let root = tree.root();
            tree.add_cancellation_handler(root, Box::new(handler))
        };
        if let Some(handler) = pending {
            handler();
        }
    }

    /// Snapshot of the whole tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        let tree = self.tree.read();
        tree.snapshot(tree.root())
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&ProgressTree) -> T) -> T {
        f(&self.tree.read())
    }

    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut ProgressTree) -> T) -> T {
        f(&mut self.tree.write())
    }
}
