// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use bevy_ecs::{
    lifecycle::RemovedComponents,
    prelude::{Added, Changed, Component, Entity, Or, Query, ResMut},
};
use std::{collections::HashMap, sync::Arc};

use crate::{
    TransformComponent, obb_tree::ObbTree, physics::collision_resource::CollisionResource,
};

/// Marks an entity as taking part in collision detection with the given tree.
#[derive(Component, Debug, Clone)]
pub struct MeshCollider {
    pub tree: Arc<ObbTree>,
}

impl MeshCollider {
    pub fn new(tree: Arc<ObbTree>) -> Self {
        Self { tree }
    }
}

#[derive(Default)]
pub struct CollisionSystem {}

impl CollisionSystem {
    /// Tracks new colliders, colliders whose entity just got a transform and
    /// colliders whose tree was replaced.
    pub fn register_colliders(
        query: Query<
            (Entity, &MeshCollider, &TransformComponent),
            Or<(Changed<MeshCollider>, Added<TransformComponent>)>,
        >,
        mut collision: ResMut<CollisionResource>,
    ) {
        for (entity, collider, transform) in &query {
            if let Some(current) = collision.tree(entity) {
                if Arc::ptr_eq(current, &collider.tree) {
                    continue;
                }
                log::debug!(
                    "Collider of {} replaced: {} -> {}",
                    entity,
                    current.name(),
                    collider.tree.name()
                );
                collision.remove(entity);
            }
            collision.add(entity, collider.tree.clone(), transform);
        }
    }

    pub fn cleanup_removed_colliders(
        mut removed: RemovedComponents<MeshCollider>,
        mut collision: ResMut<CollisionResource>,
    ) {
        for entity in removed.read() {
            collision.remove(entity);
        }
    }

    pub fn update_contacts(
        query: Query<(Entity, &TransformComponent)>,
        mut collision: ResMut<CollisionResource>,
    ) {
        let transforms: HashMap<Entity, TransformComponent> = query
            .iter()
            .filter(|(entity, _)| collision.is_tracked(*entity))
            .map(|(entity, transform)| (entity, *transform))
            .collect();

        collision.per_tick(|entity| transforms.get(&entity).copied());
    }
}
