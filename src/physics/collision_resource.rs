// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use bevy_ecs::prelude::*;
use rayon::prelude::*;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error;

use crate::{
    TransformComponent,
    geometry::Aabb,
    handles::BroadPhaseHandle,
    obb_tree::{ObbTree, ObbTreeError, loader::ObbTreeLoader},
    physics::{
        dynamic_aabb_tree::DynamicAabbTree,
        narrow_phase::{Contact, NarrowPhase},
    },
    settings::CollisionSettings,
    utils::scope_timer::ScopeTimer,
};

#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("Failed to load collider: {0}")]
    Load(#[from] ObbTreeError),
}

/// What one call to [`CollisionResource::per_tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub tracked: usize,
    pub reinserted: usize,
    pub candidate_pairs: usize,
    pub contacts: usize,
}

#[derive(Debug, Clone)]
struct TrackedBody {
    tree: Arc<ObbTree>,
    loose_bound: Aabb,
    leaf: BroadPhaseHandle,
}

/// Tracked colliders, the broad phase over them and the contacts of the last tick.
#[derive(Resource)]
pub struct CollisionResource {
    settings: CollisionSettings,
    loader: ObbTreeLoader,
    bodies: BTreeMap<Entity, TrackedBody>,
    broadphase: DynamicAabbTree<Entity>,
    candidate_pairs: Vec<(Entity, Entity)>,
    contacts: Vec<Contact>,
}

impl Default for CollisionResource {
    fn default() -> Self {
        Self::new(CollisionSettings::default())
    }
}

pub(crate) fn ordered_pair(a: Entity, b: Entity) -> (Entity, Entity) {
    if a.to_bits() <= b.to_bits() {
        (a, b)
    } else {
        (b, a)
    }
}

impl CollisionResource {
    pub fn new(settings: CollisionSettings) -> Self {
        let loader = ObbTreeLoader::with_file_source(settings.obb.clone(), settings.cache.clone());
        Self::with_loader(settings, loader)
    }

    pub fn with_loader(settings: CollisionSettings, loader: ObbTreeLoader) -> Self {
        Self {
            settings,
            loader,
            bodies: BTreeMap::new(),
            broadphase: DynamicAabbTree::new(),
            candidate_pairs: Vec::new(),
            contacts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &CollisionSettings {
        &self.settings
    }

    pub fn loader_mut(&mut self) -> &mut ObbTreeLoader {
        &mut self.loader
    }

    /// Starts tracking `entity`. Returns false if it was already tracked.
    pub fn add(
        &mut self,
        entity: Entity,
        tree: Arc<ObbTree>,
        transform: &TransformComponent,
    ) -> bool {
        if self.bodies.contains_key(&entity) {
            return false;
        }

        let tight = tree.world_bound(&transform.to_mat4());
        let loose_bound = tight.loosen(self.settings.broad_phase.loose_margin);
        let leaf = self.broadphase.insert(loose_bound, entity);
        log::debug!("Tracking {} with collider {}", entity, tree.name());
        self.bodies.insert(
            entity,
            TrackedBody {
                tree,
                loose_bound,
                leaf,
            },
        );
        true
    }

    /// Resolves the collider named `name` through the loader and tracks `entity`
    /// with it.
    pub fn add_mesh(
        &mut self,
        entity: Entity,
        name: &str,
        transform: &TransformComponent,
    ) -> Result<bool, CollisionError> {
        if self.bodies.contains_key(&entity) {
            return Ok(false);
        }
        let tree = self.loader.load(name)?;
        Ok(self.add(entity, tree, transform))
    }

    /// Stops tracking `entity`. Returns false if it was not tracked.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(body) = self.bodies.remove(&entity) else {
            return false;
        };
        if self.broadphase.erase(body.leaf).is_none() {
            log::warn!("Broad-phase leaf of {} was already gone", entity);
        }
        log::debug!("Stopped tracking {}", entity);
        true
    }

    pub fn is_tracked(&self, entity: Entity) -> bool {
        self.bodies.contains_key(&entity)
    }

    pub fn tracked_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn tree(&self, entity: Entity) -> Option<&Arc<ObbTree>> {
        self.bodies.get(&entity).map(|body| &body.tree)
    }

    /// Loose broad-phase box currently stored for `entity`.
    pub fn loose_bound(&self, entity: Entity) -> Option<Aabb> {
        self.bodies.get(&entity).map(|body| body.loose_bound)
    }

    /// Contacts found by the last tick.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Deduplicated broad-phase pairs of the last tick, smaller entity first.
    pub fn candidate_pairs(&self) -> &[(Entity, Entity)] {
        &self.candidate_pairs
    }

    /// Recomputes every contact from scratch.
    ///
    /// Objects for which `transforms` has nothing are left where they were and
    /// take no part in this tick.
    pub fn per_tick<F>(&mut self, transforms: F) -> TickStats
    where
        F: Fn(Entity) -> Option<TransformComponent>,
    {
        let _timer = match self.settings.tick.budget() {
            Some(budget) => ScopeTimer::with_budget("CollisionResource::per_tick", budget),
            None => ScopeTimer::new("CollisionResource::per_tick"),
        };
        let margin = self.settings.broad_phase.loose_margin;

        // --- 1. Refresh loose boxes ---
        let mut placed: BTreeMap<Entity, (TransformComponent, Aabb)> = BTreeMap::new();
        let mut reinserted = 0;
        for (&entity, body) in self.bodies.iter_mut() {
            let Some(transform) = transforms(entity) else {
                log::debug!("No transform for {} this tick, skipping", entity);
                continue;
            };

            let tight = body.tree.world_bound(&transform.to_mat4());
            if let Some(leaf) = self.broadphase.update(body.leaf, tight, margin) {
                body.leaf = leaf;
                body.loose_bound = tight.loosen(margin);
                reinserted += 1;
            }
            placed.insert(entity, (transform, tight));
        }

        // --- 2. Candidate pairs ---
        let mut pairs = BTreeSet::new();
        for (&entity, (_, tight)) in &placed {
            for other in self.broadphase.query(*tight) {
                if other != entity && placed.contains_key(&other) {
                    pairs.insert(ordered_pair(entity, other));
                }
            }
        }
        self.candidate_pairs = pairs.into_iter().collect();

        // --- 3. Narrow phase ---
        let bodies = &self.bodies;
        let contacts: Vec<Vec<Contact>> = self
            .candidate_pairs
            .par_iter()
            .map_init(NarrowPhase::new, |narrow, &(entity_a, entity_b)| {
                let (Some(body_a), Some(body_b)) = (bodies.get(&entity_a), bodies.get(&entity_b))
                else {
                    return Vec::new();
                };
                let (Some((transform_a, _)), Some((transform_b, _))) =
                    (placed.get(&entity_a), placed.get(&entity_b))
                else {
                    return Vec::new();
                };
                narrow.query(
                    entity_a,
                    &body_a.tree,
                    transform_a,
                    entity_b,
                    &body_b.tree,
                    transform_b,
                )
            })
            .collect();
        self.contacts = contacts.into_iter().flatten().collect();

        let stats = TickStats {
            tracked: placed.len(),
            reinserted,
            candidate_pairs: self.candidate_pairs.len(),
            contacts: self.contacts.len(),
        };
        log::trace!("Collision tick: {:?}", stats);
        stats
    }

    /// Contacts between two tracked objects at the given transforms, outside the
    /// per-tick pipeline. Empty if either object is untracked or unplaced.
    pub fn query_pair<F>(&self, a: Entity, b: Entity, transforms: F) -> Vec<Contact>
    where
        F: Fn(Entity) -> Option<TransformComponent>,
    {
        let (Some(body_a), Some(body_b)) = (self.bodies.get(&a), self.bodies.get(&b)) else {
            return Vec::new();
        };
        let (Some(transform_a), Some(transform_b)) = (transforms(a), transforms(b)) else {
            return Vec::new();
        };
        NarrowPhase::new().query(a, &body_a.tree, &transform_a, b, &body_b.tree, &transform_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assets::mesh::Mesh, settings::ObbSettings};
    use glam::{Quat, Vec3};
    use std::collections::HashMap;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tree(mesh: &Mesh) -> Arc<ObbTree> {
        Arc::new(ObbTree::build(mesh, &ObbSettings::default()).expect("Failed to build"))
    }

    fn cube() -> Arc<ObbTree> {
        tree(&Mesh::cuboid("cube", Vec3::ONE))
    }

    fn lookup(
        transforms: &HashMap<Entity, TransformComponent>,
    ) -> impl Fn(Entity) -> Option<TransformComponent> + '_ {
        move |entity| transforms.get(&entity).copied()
    }

    #[test]
    fn add_and_remove() {
        let mut collision = CollisionResource::default();
        let entity = Entity::from_bits(1);
        let transform = TransformComponent::default();

        assert!(collision.add(entity, cube(), &transform));
        assert!(!collision.add(entity, cube(), &transform));
        assert!(collision.is_tracked(entity));
        assert_eq!(collision.tracked_count(), 1);

        let loose = collision.loose_bound(entity).expect("tracked");
        assert!(loose.contains(&Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE)));

        assert!(collision.remove(entity));
        assert!(!collision.remove(entity));
        assert!(!collision.is_tracked(entity));
        assert_eq!(collision.tracked_count(), 0);
    }

    #[test]
    fn separated_cubes_yield_no_contacts() {
        init_logger();
        let mut collision = CollisionResource::default();
        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let transforms = HashMap::from([
            (a, TransformComponent::default()),
            (b, TransformComponent::from_position(Vec3::new(3.0, 0.0, 0.0))),
        ]);
        for (entity, transform) in &transforms {
            collision.add(*entity, cube(), transform);
        }

        let stats = collision.per_tick(lookup(&transforms));
        assert_eq!(stats.tracked, 2);
        assert_eq!(stats.contacts, 0);
        assert!(collision.contacts().is_empty());
    }

    #[test]
    fn overlapping_cubes_yield_contacts_in_pair_order() {
        let mut collision = CollisionResource::default();
        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let offset = Vec3::new(1.5, 0.0, 0.0);
        let transforms = HashMap::from([
            (a, TransformComponent::default()),
            (b, TransformComponent::from_position(offset)),
        ]);
        collision.add(b, cube(), &transforms[&b]);
        collision.add(a, cube(), &transforms[&a]);

        let stats = collision.per_tick(lookup(&transforms));
        assert_eq!(stats.candidate_pairs, 1);
        assert_eq!(collision.candidate_pairs(), &[(a, b)]);
        assert!(stats.contacts >= 1);

        let union = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE)
            .union(&Aabb::from_center_half_extents(offset, Vec3::ONE));
        for contact in collision.contacts() {
            assert_eq!((contact.entity_a, contact.entity_b), (a, b));
            assert!(union.contains_point(contact.contact_point, 1e-4));
        }
    }

    #[test]
    fn tilted_plates_touch_with_opposing_normals() {
        let mut collision = CollisionResource::default();
        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let plate = Mesh::plate("plate", 1.0);
        let tilted = |x: f32| TransformComponent {
            position: Vec3::new(x, 0.2, 0.0),
            rotation: Quat::from_rotation_z(20f32.to_radians()),
            scale: 1.0,
        };

        let mut transforms = HashMap::from([(a, TransformComponent::default()), (b, tilted(1.5))]);
        collision.add(a, tree(&plate), &transforms[&a]);
        collision.add(b, tree(&plate.flipped("plate_down")), &transforms[&b]);

        collision.per_tick(lookup(&transforms));
        assert!(
            collision
                .contacts()
                .iter()
                .any(|c| c.normal_a.dot(c.normal_b) < -0.9)
        );

        transforms.insert(b, tilted(3.0));
        let stats = collision.per_tick(lookup(&transforms));
        assert_eq!(stats.contacts, 0);
        assert!(collision.contacts().is_empty());
    }

    #[test]
    fn far_apart_objects_have_no_pairs_and_stay_put() {
        let mut collision = CollisionResource::default();
        let transforms: HashMap<Entity, TransformComponent> = (1..=3)
            .map(|i| {
                (
                    Entity::from_bits(i),
                    TransformComponent::from_position(Vec3::new(i as f32 * 100.0, 0.0, 0.0)),
                )
            })
            .collect();
        for (entity, transform) in &transforms {
            collision.add(*entity, cube(), transform);
        }

        for _ in 0..3 {
            let stats = collision.per_tick(lookup(&transforms));
            assert_eq!(stats.tracked, 3);
            assert_eq!(stats.candidate_pairs, 0);
            assert_eq!(stats.reinserted, 0);
            assert_eq!(stats.contacts, 0);
        }
    }

    #[test]
    fn moving_out_of_the_loose_box_reinserts() {
        let mut collision = CollisionResource::default();
        let entity = Entity::from_bits(1);
        let mut transforms = HashMap::from([(entity, TransformComponent::default())]);
        collision.add(entity, cube(), &transforms[&entity]);

        // still inside the padded box
        transforms.insert(entity, TransformComponent::from_position(Vec3::new(0.1, 0.0, 0.0)));
        assert_eq!(collision.per_tick(lookup(&transforms)).reinserted, 0);

        transforms.insert(entity, TransformComponent::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(collision.per_tick(lookup(&transforms)).reinserted, 1);
        let loose = collision.loose_bound(entity).expect("tracked");
        assert!(loose.contains_point(Vec3::new(5.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn tick_budget_does_not_change_results() {
        init_logger();
        let mut settings = CollisionSettings::default();
        settings.tick.budget_ms = 0;
        let mut unbudgeted = CollisionResource::new(settings.clone());
        settings.tick.budget_ms = 1;
        let mut budgeted = CollisionResource::new(settings);

        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let transforms = HashMap::from([
            (a, TransformComponent::default()),
            (b, TransformComponent::from_position(Vec3::new(1.5, 0.0, 0.0))),
        ]);
        for collision in [&mut unbudgeted, &mut budgeted] {
            collision.add(a, cube(), &transforms[&a]);
            collision.add(b, cube(), &transforms[&b]);
        }

        let stats = budgeted.per_tick(lookup(&transforms));
        assert_eq!(stats, unbudgeted.per_tick(lookup(&transforms)));
        assert_eq!(budgeted.contacts(), unbudgeted.contacts());
    }

    #[test]
    fn missing_transforms_are_skipped() {
        let mut collision = CollisionResource::default();
        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let transforms = HashMap::from([(a, TransformComponent::default())]);
        collision.add(a, cube(), &TransformComponent::default());
        collision.add(b, cube(), &TransformComponent::from_position(Vec3::new(0.5, 0.0, 0.0)));

        let stats = collision.per_tick(lookup(&transforms));
        assert_eq!(stats.tracked, 1);
        assert_eq!(stats.candidate_pairs, 0);
        assert!(collision.is_tracked(b));
    }

    #[test]
    fn query_pair_matches_tick_and_ignores_untracked() {
        let mut collision = CollisionResource::default();
        let (a, b, c) = (Entity::from_bits(1), Entity::from_bits(2), Entity::from_bits(3));
        let transforms = HashMap::from([
            (a, TransformComponent::default()),
            (b, TransformComponent::from_position(Vec3::new(1.5, 0.0, 0.0))),
            (c, TransformComponent::default()),
        ]);
        collision.add(a, cube(), &transforms[&a]);
        collision.add(b, cube(), &transforms[&b]);

        collision.per_tick(lookup(&transforms));
        let pair = collision.query_pair(a, b, lookup(&transforms));
        assert_eq!(pair.len(), collision.contacts().len());
        assert!(collision.query_pair(a, c, lookup(&transforms)).is_empty());
    }

    #[test]
    fn add_mesh_reports_load_failures() {
        let mut collision = CollisionResource::default();
        let result = collision.add_mesh(
            Entity::from_bits(1),
            "/definitely/not/here.stl",
            &TransformComponent::default(),
        );
        assert!(matches!(result, Err(CollisionError::Load(_))));
        assert_eq!(collision.tracked_count(), 0);
    }

    #[test]
    fn add_mesh_shares_trees_by_name() {
        let mut collision = CollisionResource::default();
        let mesh = Arc::new(Mesh::cuboid("shared_box", Vec3::ONE));
        let tree = collision
            .loader_mut()
            .load_from_mesh(mesh)
            .expect("Failed to build");

        let (a, b) = (Entity::from_bits(1), Entity::from_bits(2));
        let transform = TransformComponent::default();
        assert!(collision.add_mesh(a, "shared_box", &transform).expect("live tree"));
        assert!(collision.add_mesh(b, "shared_box", &transform).expect("live tree"));
        assert!(!collision.add_mesh(b, "shared_box", &transform).expect("already tracked"));

        let tree_a = collision.tree(a).expect("tracked");
        let tree_b = collision.tree(b).expect("tracked");
        assert!(Arc::ptr_eq(tree_a, tree_b));
        assert!(Arc::ptr_eq(tree_a, &tree));
    }
}
