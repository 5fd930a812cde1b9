// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use bevy_ecs::entity::Entity;
use glam::Vec3;

use crate::{
    TransformComponent,
    geometry::triangle_contact,
    obb_tree::{ObbNode, ObbTree},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub entity_a: Entity,
    pub entity_b: Entity,
    pub contact_point: Vec3, // Point of contact in world space
    pub normal_a: Vec3,      // Unit face normal on A's surface
    pub normal_b: Vec3,      // Unit face normal on B's surface
}

/// Dual OBB-tree traversal. Keeps its work list between queries.
#[derive(Debug, Default)]
pub struct NarrowPhase {
    work_list: Vec<(usize, usize)>,
}

impl NarrowPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every triangle-pair contact between two placed trees.
    pub fn query(
        &mut self,
        entity_a: Entity,
        tree_a: &ObbTree,
        transform_a: &TransformComponent,
        entity_b: Entity,
        tree_b: &ObbTree,
        transform_b: &TransformComponent,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();
        self.query_into(
            (entity_a, tree_a, transform_a),
            (entity_b, tree_b, transform_b),
            &mut contacts,
        );
        contacts
    }

    pub fn query_into(
        &mut self,
        (entity_a, tree_a, transform_a): (Entity, &ObbTree, &TransformComponent),
        (entity_b, tree_b, transform_b): (Entity, &ObbTree, &TransformComponent),
        contacts: &mut Vec<Contact>,
    ) {
        if tree_a.is_empty() || tree_b.is_empty() {
            return;
        }

        let world_a = transform_a.to_mat4();
        let world_b = transform_b.to_mat4();

        self.work_list.clear();
        self.work_list.push((0, 0));

        while let Some((index_a, index_b)) = self.work_list.pop() {
            let node_a = tree_a.node(index_a);
            let node_b = tree_b.node(index_b);

            if let (ObbNode::Leaf(triangle_a), ObbNode::Leaf(triangle_b)) = (node_a, node_b) {
                let world_triangle_a = triangle_a.transformed(&world_a);
                let world_triangle_b = triangle_b.transformed(&world_b);
                if let Some(contact) = triangle_contact(&world_triangle_a, &world_triangle_b) {
                    contacts.push(Contact {
                        entity_a,
                        entity_b,
                        contact_point: contact.point,
                        normal_a: contact.normal_a,
                        normal_b: contact.normal_b,
                    });
                }
                continue;
            }

            let box_a = tree_a.bounds(index_a).transformed(&world_a);
            let box_b = tree_b.bounds(index_b).transformed(&world_b);
            if !box_a.overlaps_conservative(&box_b) {
                continue;
            }

            match (node_a.children(), node_b.children()) {
                (Some([left, right]), None) => {
                    self.work_list.push((left, index_b));
                    self.work_list.push((right, index_b));
                }
                (None, Some([left, right])) => {
                    self.work_list.push((index_a, left));
                    self.work_list.push((index_a, right));
                }
                (Some([left_a, right_a]), Some([left_b, right_b])) => {
                    if box_a.volume() > box_b.volume() {
                        self.work_list.push((left_a, index_b));
                        self.work_list.push((right_a, index_b));
                    } else {
                        self.work_list.push((index_a, left_b));
                        self.work_list.push((index_a, right_b));
                    }
                }
                (None, None) => {}
            }
        }
    }
}
