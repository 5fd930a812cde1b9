// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use slotmap::SlotMap;

use crate::{geometry::Aabb, handles::BroadPhaseHandle};

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Branch {
        left: BroadPhaseHandle,
        right: BroadPhaseHandle,
    },
    Leaf(T),
}

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    parent: Option<BroadPhaseHandle>,
    kind: NodeKind<T>,
}

/// Online AABB tree for broad-phase culling.
///
/// Every branch box is the union of its children's boxes. Leaves carry a payload
/// and are addressed through generational handles, so a handle outliving its
/// leaf is detected instead of aliasing a newer node.
#[derive(Debug)]
pub struct DynamicAabbTree<T> {
    nodes: SlotMap<BroadPhaseHandle, Node<T>>,
    root: Option<BroadPhaseHandle>,
    leaves: usize,
}

impl<T> Default for DynamicAabbTree<T> {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            leaves: 0,
        }
    }
}

impl<T> DynamicAabbTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, handle: BroadPhaseHandle) -> Option<&T> {
        match &self.nodes.get(handle)?.kind {
            NodeKind::Leaf(payload) => Some(payload),
            NodeKind::Branch { .. } => None,
        }
    }

    pub fn aabb(&self, handle: BroadPhaseHandle) -> Option<Aabb> {
        self.nodes.get(handle).map(|node| node.aabb)
    }

    pub fn root_aabb(&self) -> Option<Aabb> {
        self.root.map(|root| self.nodes[root].aabb)
    }

    /// Longest root-to-leaf path counted in edges; 0 for a single leaf or none.
    pub fn height(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut height = 0;
        let mut stack = vec![(root, 0usize)];
        while let Some((handle, depth)) = stack.pop() {
            height = height.max(depth);
            if let NodeKind::Branch { left, right } = self.nodes[handle].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        height
    }

    pub fn insert(&mut self, aabb: Aabb, payload: T) -> BroadPhaseHandle {
        let leaf = self.nodes.insert(Node {
            aabb,
            parent: None,
            kind: NodeKind::Leaf(payload),
        });
        self.leaves += 1;

        let new_root = match self.root {
            None => leaf,
            Some(root) => self.place(root, leaf),
        };
        self.nodes[new_root].parent = None;
        self.root = Some(new_root);
        leaf
    }

    /// Inserts `leaf` into the subtree rooted at `node` and returns the root of the
    /// resulting subtree.
    fn place(&mut self, node: BroadPhaseHandle, leaf: BroadPhaseHandle) -> BroadPhaseHandle {
        let aabb = self.nodes[leaf].aabb;

        if let NodeKind::Branch { left, right } = self.nodes[node].kind {
            let left_aabb = self.nodes[left].aabb;
            let right_aabb = self.nodes[right].aabb;

            let cost_here = self.nodes[node].aabb.area() + aabb.area();
            let cost_left = left_aabb.union(&aabb).area() + right_aabb.area();
            let cost_right = right_aabb.union(&aabb).area() + left_aabb.area();

            if cost_left < cost_here && cost_left < cost_right {
                let new_left = self.place(left, leaf);
                self.attach(node, new_left, right);
                return node;
            }
            if cost_right < cost_here && cost_right < cost_left {
                let new_right = self.place(right, leaf);
                self.attach(node, left, new_right);
                return node;
            }
        }

        // Wrap: a new branch over the new leaf and the existing subtree.
        let branch = self.nodes.insert(Node {
            aabb: self.nodes[node].aabb.union(&aabb),
            parent: self.nodes[node].parent,
            kind: NodeKind::Branch {
                left: leaf,
                right: node,
            },
        });
        self.nodes[leaf].parent = Some(branch);
        self.nodes[node].parent = Some(branch);
        branch
    }

    fn attach(&mut self, node: BroadPhaseHandle, left: BroadPhaseHandle, right: BroadPhaseHandle) {
        self.nodes[left].parent = Some(node);
        self.nodes[right].parent = Some(node);
        let aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
        let target = &mut self.nodes[node];
        target.kind = NodeKind::Branch { left, right };
        target.aabb = aabb;
    }

    /// Removes a leaf and returns its payload.
    ///
    /// Returns `None` for stale handles and for handles that do not name a leaf.
    pub fn erase(&mut self, handle: BroadPhaseHandle) -> Option<T> {
        if !matches!(self.nodes.get(handle)?.kind, NodeKind::Leaf(_)) {
            return None;
        }
        let node = self.nodes.remove(handle)?;
        self.leaves -= 1;

        match node.parent {
            None => self.root = None,
            Some(parent) => self.splice_out(parent, handle),
        }

        match node.kind {
            NodeKind::Leaf(payload) => Some(payload),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Replaces `parent` by the sibling of `removed`, then refits upward.
    fn splice_out(&mut self, parent: BroadPhaseHandle, removed: BroadPhaseHandle) {
        let Some(parent_node) = self.nodes.remove(parent) else {
            return;
        };
        let NodeKind::Branch { left, right } = parent_node.kind else {
            return;
        };
        let sibling = if left == removed { right } else { left };
        let grand_parent = parent_node.parent;
        self.nodes[sibling].parent = grand_parent;

        let Some(grand_parent) = grand_parent else {
            self.root = Some(sibling);
            return;
        };

        if let NodeKind::Branch { left, right } = &mut self.nodes[grand_parent].kind {
            if *left == parent {
                *left = sibling;
            } else {
                *right = sibling;
            }
        }
        self.refit_upwards(grand_parent);
    }

    fn refit_upwards(&mut self, mut handle: BroadPhaseHandle) {
        loop {
            if let NodeKind::Branch { left, right } = self.nodes[handle].kind {
                let aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
                self.nodes[handle].aabb = aabb;
            }
            match self.nodes[handle].parent {
                Some(parent) => handle = parent,
                None => break,
            }
        }
    }

    /// Refreshes a leaf against its new `tight` box.
    ///
    /// Nothing happens while the stored box still contains `tight`. Otherwise the
    /// leaf is erased and reinserted with `tight` loosened by `margin`, and its new
    /// handle is returned.
    pub fn update(
        &mut self,
        handle: BroadPhaseHandle,
        tight: Aabb,
        margin: f32,
    ) -> Option<BroadPhaseHandle> {
        let stored = self.aabb(handle)?;
        if stored.contains(&tight) {
            return None;
        }
        let payload = self.erase(handle)?;
        Some(self.insert(tight.loosen(margin), payload))
    }

    /// Payloads of every leaf whose box overlaps `aabb`.
    pub fn query(&self, aabb: Aabb) -> Query<'_, T> {
        Query {
            tree: self,
            aabb,
            stack: self.root.into_iter().collect(),
        }
    }

    #[cfg(test)]
    fn validate(&self) {
        let mut leaves = 0;
        if let Some(root) = self.root {
            assert!(self.nodes[root].parent.is_none());
        }
        for (handle, node) in &self.nodes {
            match node.kind {
                NodeKind::Leaf(_) => leaves += 1,
                NodeKind::Branch { left, right } => {
                    assert_eq!(self.nodes[left].parent, Some(handle));
                    assert_eq!(self.nodes[right].parent, Some(handle));
                    assert_eq!(node.aabb, self.nodes[left].aabb.union(&self.nodes[right].aabb));
                }
            }
        }
        assert_eq!(leaves, self.leaves);
        assert_eq!(self.nodes.len(), if leaves == 0 { 0 } else { 2 * leaves - 1 });
    }
}

/// Iterator returned by [`DynamicAabbTree::query`].
pub struct Query<'a, T> {
    tree: &'a DynamicAabbTree<T>,
    aabb: Aabb,
    stack: Vec<BroadPhaseHandle>,
}

impl<T: Clone> Iterator for Query<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while let Some(handle) = self.stack.pop() {
            let node = &self.tree.nodes[handle];
            if !node.aabb.intersects(&self.aabb) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(payload) => return Some(payload.clone()),
                NodeKind::Branch { left, right } => {
                    self.stack.push(*right);
                    self.stack.push(*left);
                }
            }
        }
        None
    }
}
