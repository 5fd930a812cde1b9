// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
//! Triangle-mesh collision detection: OBB trees per mesh, a dynamic AABB tree
//! over placed objects and exact triangle contacts between them.

pub mod assets;
pub mod geometry;
pub mod handles;
pub mod obb_tree;
pub mod physics;
pub mod settings;
pub mod transform_component;
pub mod utils;

pub use assets::mesh::Mesh;
pub use obb_tree::{ObbNode, ObbTree, ObbTreeError, loader::ObbTreeLoader};
pub use physics::{
    collision_resource::{CollisionError, CollisionResource, TickStats},
    collision_system::{CollisionSystem, MeshCollider},
    dynamic_aabb_tree::DynamicAabbTree,
    narrow_phase::{Contact, NarrowPhase},
};
pub use settings::CollisionSettings;
pub use transform_component::TransformComponent;
