// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
pub mod collision_resource;
pub mod collision_system;
pub mod dynamic_aabb_tree;
pub mod narrow_phase;
