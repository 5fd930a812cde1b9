// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
pub mod aabb;
pub mod contact;
pub mod obb;
pub mod sat;
pub mod triangle;

pub use aabb::Aabb;
pub use contact::{TriangleContact, triangle_contact};
pub use obb::Obb;
pub use sat::{Interval, LineSegment, SeparatingAxes, intersects};
pub use triangle::Triangle;
