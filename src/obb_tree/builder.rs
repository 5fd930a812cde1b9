// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::collections::VecDeque;

use crate::{
    assets::mesh::{Mesh, WorkingMesh},
    geometry::Obb,
    settings::ObbSettings,
    utils::scope_timer::ScopeTimer,
};

use super::{ObbNode, ObbTree, ObbTreeError};

/// Height of a perfectly balanced binary tree over `n` leaves.
pub fn balanced_height(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    (usize::BITS - (n - 1).leading_zeros()).max(1) as usize
}

impl ObbTree {
    /// Builds a tree over every triangle of `mesh`.
    ///
    /// Splitting runs top-down breadth first, then a single backward pass over the
    /// arena tightens every box bottom-up. The result only depends on the
    /// triangle order of the mesh.
    pub fn build(mesh: &Mesh, settings: &ObbSettings) -> Result<ObbTree, ObbTreeError> {
        let _timer = ScopeTimer::new("ObbTree::build");

        let count = mesh.len();
        if count == 0 {
            return Err(ObbTreeError::EmptyMesh(mesh.name.clone()));
        }

        let min_thickness = settings.min_thickness;
        let capacity = 2 * count - 1;
        log::debug!(
            "Building OBB tree for {}: {} triangles, {} nodes, balanced height {}",
            mesh.name,
            count,
            capacity,
            balanced_height(count)
        );

        let mut nodes: Vec<ObbNode> = Vec::with_capacity(capacity);
        let mut parents: Vec<Option<usize>> = Vec::with_capacity(capacity);
        let mut queue: VecDeque<(WorkingMesh, Option<usize>)> = VecDeque::new();
        queue.push_back((WorkingMesh::from_mesh(mesh), None));

        while let Some((subset, parent)) = queue.pop_front() {
            let index = nodes.len();
            parents.push(parent);

            if let [triangle] = subset.triangles() {
                nodes.push(ObbNode::Leaf(*triangle));
                continue;
            }

            let candidate = Obb::fit_triangles(subset.triangles(), min_thickness);
            let (left, right) = split(subset, &candidate);

            // Everything still queued is numbered before the new children.
            let first_child = index + queue.len() + 1;
            nodes.push(ObbNode::Branch {
                bounds: candidate,
                children: [first_child, first_child + 1],
            });
            queue.push_back((left, Some(index)));
            queue.push_back((right, Some(index)));
        }
        debug_assert_eq!(nodes.len(), capacity);

        for index in (0..nodes.len()).rev() {
            if let ObbNode::Branch { bounds, children } = nodes[index] {
                let corners: Vec<_> = children
                    .iter()
                    .flat_map(|&child| nodes[child].bounds(min_thickness).corners())
                    .collect();
                nodes[index] = ObbNode::Branch {
                    bounds: Obb::from_frame_and_points(bounds.frame(), corners, min_thickness),
                    children,
                };
            }
        }

        Ok(ObbTree::from_parts(mesh.name.clone(), nodes, parents, min_thickness))
    }
}

/// Splits `subset` across the mean centroid along the longest box axis, trying the
/// other two axes before falling back to halving by order.
fn split(subset: WorkingMesh, candidate: &Obb) -> (WorkingMesh, WorkingMesh) {
    let mean = subset.centroid();
    let frame = candidate.frame();
    let longest = candidate.longest_axis();

    for attempt in 0..3 {
        let axis = frame.col((longest + attempt) % 3);
        let threshold = axis.dot(mean);
        let below = subset
            .triangles()
            .iter()
            .filter(|t| t.max_projection(axis) < threshold)
            .count();
        if below > 0 && below < subset.len() {
            return subset.partition_by_max_projection(axis, threshold);
        }
    }

    log::trace!("Degenerate split of {} triangles, halving by order", subset.len());
    let mut left = subset.into_triangles();
    let right = left.split_off(left.len() / 2);
    (WorkingMesh::from_triangles(left), WorkingMesh::from_triangles(right))
}
