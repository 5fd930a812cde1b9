// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use glam::Vec3;

use crate::geometry::{Aabb, Triangle, intersects};

/// Immutable triangle soup shared between every object using the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, triangles: Vec<Triangle>) -> Self {
        Self {
            name: name.into(),
            triangles,
        }
    }

    /// Closed box of 12 outward-facing triangles centred on the origin.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        let Vec3 { x, y, z } = half_extents;
        let faces = [
            [
                Vec3::new(x, -y, -z),
                Vec3::new(x, y, -z),
                Vec3::new(x, y, z),
                Vec3::new(x, -y, z),
            ],
            [
                Vec3::new(-x, -y, -z),
                Vec3::new(-x, -y, z),
                Vec3::new(-x, y, z),
                Vec3::new(-x, y, -z),
            ],
            [
                Vec3::new(-x, y, -z),
                Vec3::new(-x, y, z),
                Vec3::new(x, y, z),
                Vec3::new(x, y, -z),
            ],
            [
                Vec3::new(-x, -y, -z),
                Vec3::new(x, -y, -z),
                Vec3::new(x, -y, z),
                Vec3::new(-x, -y, z),
            ],
            [
                Vec3::new(-x, -y, z),
                Vec3::new(x, -y, z),
                Vec3::new(x, y, z),
                Vec3::new(-x, y, z),
            ],
            [
                Vec3::new(-x, -y, -z),
                Vec3::new(-x, y, -z),
                Vec3::new(x, y, -z),
                Vec3::new(x, -y, -z),
            ],
        ];

        let triangles = faces
            .iter()
            .flat_map(|[a, b, c, d]| [Triangle::new(*a, *b, *c), Triangle::new(*a, *c, *d)])
            .collect();

        Self::new(name, triangles)
    }

    /// Square of two triangles in the XZ plane facing +Y.
    pub fn plate(name: impl Into<String>, half_size: f32) -> Self {
        let s = half_size;
        let a = Vec3::new(-s, 0.0, -s);
        let b = Vec3::new(-s, 0.0, s);
        let c = Vec3::new(s, 0.0, s);
        let d = Vec3::new(s, 0.0, -s);
        Self::new(name, vec![Triangle::new(a, b, c), Triangle::new(a, c, d)])
    }

    /// Same surface with every triangle wound the other way.
    pub fn flipped(&self, name: impl Into<String>) -> Self {
        Self::new(
            name,
            self.triangles
                .iter()
                .map(|t| Triangle::new(t.v0, t.v2, t.v1))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bound(&self) -> Aabb {
        bound_of(&self.triangles)
    }
}

/// Owned, mutable copy of (part of) a mesh used while building trees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingMesh {
    triangles: Vec<Triangle>,
}

impl WorkingMesh {
    pub fn from_mesh(mesh: &Mesh) -> Self {
        Self {
            triangles: mesh.triangles.clone(),
        }
    }

    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn into_triangles(self) -> Vec<Triangle> {
        self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bound(&self) -> Aabb {
        bound_of(&self.triangles)
    }

    /// Mean of the triangle centroids.
    pub fn centroid(&self) -> Vec3 {
        if self.triangles.is_empty() {
            return Vec3::ZERO;
        }
        self.triangles.iter().map(Triangle::centroid).sum::<Vec3>() / self.triangles.len() as f32
    }

    /// Triangles that may intersect `region`. Never drops an intersecting triangle.
    pub fn chop(&self, region: &Aabb) -> WorkingMesh {
        WorkingMesh {
            triangles: self
                .triangles
                .iter()
                .filter(|t| intersects(*t, region))
                .copied()
                .collect(),
        }
    }

    /// Splits into triangles whose maximum projection on `axis` is below `split`
    /// and the rest. Relative order is kept on both sides.
    pub fn partition_by_max_projection(self, axis: Vec3, split: f32) -> (WorkingMesh, WorkingMesh) {
        let (left, right): (Vec<_>, Vec<_>) = self
            .triangles
            .into_iter()
            .partition(|t| t.max_projection(axis) < split);
        (
            WorkingMesh { triangles: left },
            WorkingMesh { triangles: right },
        )
    }
}

fn bound_of(triangles: &[Triangle]) -> Aabb {
    Aabb::from_points(triangles.iter().flat_map(|t| t.vertices()))
}
