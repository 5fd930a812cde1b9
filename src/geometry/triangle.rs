// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use glam::{Mat4, Vec3};

use super::aabb::Aabb;

/// Squared sine of the smallest corner angle still treated as a real triangle.
const DEGENERATE_SIN_SQ: f32 = 1e-12;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Un-normalized face normal (right-hand rule). Its length is twice the area.
    pub fn normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(self.v2 - self.v0)
    }

    /// Unit face normal, or zero for a degenerate triangle.
    pub fn unit_normal(&self) -> Vec3 {
        self.normal().normalize_or_zero()
    }

    pub fn area(&self) -> f32 {
        self.normal().length() * 0.5
    }

    pub fn is_degenerate(&self) -> bool {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(e2).length_squared() <= DEGENERATE_SIN_SQ * e1.length_squared() * e2.length_squared()
    }

    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    pub fn max_projection(&self, axis: Vec3) -> f32 {
        axis.dot(self.v0).max(axis.dot(self.v1)).max(axis.dot(self.v2))
    }

    pub fn bound(&self) -> Aabb {
        Aabb::from_points(self.vertices())
    }

    pub fn transformed(&self, world: &Mat4) -> Triangle {
        Triangle {
            v0: world.transform_point3(self.v0),
            v1: world.transform_point3(self.v1),
            v2: world.transform_point3(self.v2),
        }
    }

    /// Segment where this triangle meets the plane through `origin` with `normal`.
    ///
    /// Vertices lying on the plane are part of the result, so a triangle touching
    /// the plane along an edge yields that edge and one touching it at a corner
    /// yields a zero-length segment at that corner. Returns `None` when the
    /// triangle stays strictly on one side or lies in the plane.
    pub fn plane_intersection(&self, origin: Vec3, normal: Vec3) -> Option<(Vec3, Vec3)> {
        let verts = self.vertices();
        let dist = verts.map(|v| normal.dot(v - origin));
        let on_plane = dist.map(|d| d == 0.0);

        let crossing = |from: usize, to: usize| {
            let t = dist[from] / (dist[from] - dist[to]);
            verts[from] + (verts[to] - verts[from]) * t
        };

        match on_plane.iter().filter(|&&zero| zero).count() {
            0 => {
                let positive = dist.map(|d| d > 0.0);
                let isolated = if positive[0] == positive[1] && positive[1] == positive[2] {
                    return None;
                } else if positive[1] == positive[2] {
                    0
                } else if positive[0] == positive[2] {
                    1
                } else {
                    2
                };
                Some((
                    crossing(isolated, (isolated + 1) % 3),
                    crossing(isolated, (isolated + 2) % 3),
                ))
            }
            1 => {
                let touching = if on_plane[0] { 0 } else if on_plane[1] { 1 } else { 2 };
                let (j, k) = ((touching + 1) % 3, (touching + 2) % 3);
                if (dist[j] > 0.0) == (dist[k] > 0.0) {
                    Some((verts[touching], verts[touching]))
                } else {
                    Some((verts[touching], crossing(j, k)))
                }
            }
            2 => {
                let off = if !on_plane[0] { 0 } else if !on_plane[1] { 1 } else { 2 };
                Some((verts[(off + 1) % 3], verts[(off + 2) % 3]))
            }
            _ => None,
        }
    }
}
