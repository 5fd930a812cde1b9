// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use glam::{Mat3, Mat4, Vec3};
use nalgebra::Matrix3;

use super::{aabb::Aabb, triangle::Triangle};

/// Oriented bounding box.
///
/// `origin` is the centre of the box and each column of `axes` is a half-extent
/// vector, so the box spans `origin ± axes.x_axis ± axes.y_axis ± axes.z_axis`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub origin: Vec3,
    pub axes: Mat3,
}

impl Default for Obb {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            axes: Mat3::ZERO,
        }
    }
}

impl Obb {
    pub fn new(origin: Vec3, axes: Mat3) -> Self {
        Self { origin, axes }
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        let half = aabb.size() * 0.5;
        Self {
            origin: aabb.center(),
            axes: Mat3::from_diagonal(half),
        }
    }

    /// Tightest box over `points` whose faces are aligned with the unit columns of
    /// `frame`. No half extent is smaller than `min_thickness / 2`.
    pub fn from_frame_and_points<I>(frame: Mat3, points: I, min_thickness: f32) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        let inverse = frame.transpose();
        let mut lo = Vec3::splat(f32::MAX);
        let mut hi = Vec3::splat(f32::MIN);
        for p in points {
            let local = inverse * p;
            lo = lo.min(local);
            hi = hi.max(local);
        }
        if !lo.cmple(hi).all() {
            return Self::default();
        }

        let half = ((hi - lo) * 0.5).max(Vec3::splat(min_thickness * 0.5));
        let center = (lo + hi) * 0.5;
        Self {
            origin: frame * center,
            axes: Mat3::from_cols(
                frame.x_axis * half.x,
                frame.y_axis * half.y,
                frame.z_axis * half.z,
            ),
        }
    }

    /// Principal axes of the point covariance, sorted by decreasing variance.
    ///
    /// Falls back to the identity frame when the decomposition is not finite.
    pub fn principal_frame(points: &[Vec3]) -> Mat3 {
        if points.is_empty() {
            return Mat3::IDENTITY;
        }

        let count = points.len() as f32;
        let mean = points.iter().copied().sum::<Vec3>() / count;
        let mut cov = Matrix3::<f32>::zeros();
        for p in points {
            let d = *p - mean;
            let d = nalgebra::Vector3::new(d.x, d.y, d.z);
            cov += d * d.transpose();
        }
        cov /= count;

        let eigen = cov.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let column = |i: usize| {
            let c = eigen.eigenvectors.column(order[i]);
            Vec3::new(c[0], c[1], c[2]).normalize_or_zero()
        };
        let x = column(0);
        let y = column(1);
        let z = x.cross(y);

        let frame = Mat3::from_cols(x, y, z);
        if !frame.is_finite() || z.length_squared() < 0.5 {
            return Mat3::IDENTITY;
        }
        frame
    }

    /// Candidate box for a set of triangles, aligned with their principal axes.
    pub fn fit_triangles(triangles: &[Triangle], min_thickness: f32) -> Self {
        let points: Vec<Vec3> = triangles.iter().flat_map(|t| t.vertices()).collect();
        let frame = Self::principal_frame(&points);
        Self::from_frame_and_points(frame, points, min_thickness)
    }

    /// Tightest box around a single triangle.
    ///
    /// The tip is the vertex closest to the line through the other two; the box is
    /// aligned with the edge opposite the tip, the in-plane perpendicular to it and
    /// the face normal. Degenerate triangles get an axis-aligned box.
    pub fn fit_triangle(triangle: &Triangle, min_thickness: f32) -> Self {
        let verts = triangle.vertices();
        if triangle.is_degenerate() {
            return Self::from_frame_and_points(Mat3::IDENTITY, verts, min_thickness);
        }

        // Same area for every choice, so the nearest tip faces the longest edge.
        let tip = (0..3)
            .max_by(|&a, &b| {
                let opposite = |i: usize| (verts[(i + 2) % 3] - verts[(i + 1) % 3]).length_squared();
                opposite(a).total_cmp(&opposite(b))
            })
            .unwrap_or(0);

        let edge = (verts[(tip + 2) % 3] - verts[(tip + 1) % 3]).normalize();
        let normal = triangle.unit_normal();
        let perpendicular = normal.cross(edge);
        Self::from_frame_and_points(Mat3::from_cols(edge, perpendicular, normal), verts, min_thickness)
    }

    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(
            self.axes.x_axis.length(),
            self.axes.y_axis.length(),
            self.axes.z_axis.length(),
        )
    }

    /// Unit face directions of the box.
    pub fn frame(&self) -> Mat3 {
        Mat3::from_cols(
            self.axes.x_axis.normalize_or_zero(),
            self.axes.y_axis.normalize_or_zero(),
            self.axes.z_axis.normalize_or_zero(),
        )
    }

    /// Index of the longest half-extent column.
    pub fn longest_axis(&self) -> usize {
        let h = self.half_extents();
        if h.x >= h.y && h.x >= h.z {
            0
        } else if h.y >= h.z {
            1
        } else {
            2
        }
    }

    pub fn volume(&self) -> f32 {
        8.0 * self.half_extents().element_product()
    }

    pub fn bound(&self) -> Aabb {
        let reach = self.axes.x_axis.abs() + self.axes.y_axis.abs() + self.axes.z_axis.abs();
        Aabb::new(self.origin - reach, self.origin + reach)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let [a, b, c] = [self.axes.x_axis, self.axes.y_axis, self.axes.z_axis];
        let o = self.origin;
        [
            o - a - b - c,
            o + a - b - c,
            o - a + b - c,
            o + a + b - c,
            o - a - b + c,
            o + a - b + c,
            o - a + b + c,
            o + a + b + c,
        ]
    }

    pub fn transformed(&self, world: &Mat4) -> Obb {
        let linear = Mat3::from_mat4(*world);
        Obb {
            origin: world.transform_point3(self.origin),
            axes: linear * self.axes,
        }
    }

    pub fn contains_point(&self, point: Vec3, tolerance: f32) -> bool {
        let local = point - self.origin;
        [self.axes.x_axis, self.axes.y_axis, self.axes.z_axis]
            .iter()
            .all(|axis| {
                let len = axis.length();
                if len <= f32::EPSILON {
                    return local.dot(*axis).abs() <= tolerance;
                }
                local.dot(*axis).abs() / len <= len + tolerance
            })
    }

    /// Half width of the box projected on a unit `axis`.
    pub fn projected_radius(&self, axis: Vec3) -> f32 {
        self.axes.x_axis.dot(axis).abs()
            + self.axes.y_axis.dot(axis).abs()
            + self.axes.z_axis.dot(axis).abs()
    }

    /// Separating-axis test restricted to the six face normals of both boxes.
    ///
    /// Never rejects overlapping boxes; may accept some disjoint ones.
    pub fn overlaps_conservative(&self, other: &Obb) -> bool {
        let offset = other.origin - self.origin;
        let a = self.frame();
        let b = other.frame();
        [a.x_axis, a.y_axis, a.z_axis, b.x_axis, b.y_axis, b.z_axis]
            .into_iter()
            .filter(|axis| *axis != Vec3::ZERO)
            .all(|axis| {
                offset.dot(axis).abs() <= self.projected_radius(axis) + other.projected_radius(axis)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    const MIN_THICKNESS: f32 = 0.001;

    #[test]
    fn from_aabb_matches_bound() {
        let aabb = Aabb::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 2.0, 3.0));
        let obb = Obb::from_aabb(&aabb);
        assert_eq!(obb.bound(), aabb);
        assert_relative_eq!(obb.volume(), 4.0 * 2.0 * 1.0);
    }

    #[test]
    fn fit_triangle_is_flat_and_tight() {
        let tri = Triangle::new(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 0.0));
        let obb = Obb::fit_triangle(&tri, MIN_THICKNESS);

        let half = obb.half_extents();
        // longest edge is v0-v1, so the box is 4 x 2 x min_thickness
        assert_relative_eq!(half.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(half.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(half.z, MIN_THICKNESS * 0.5, epsilon = 1e-7);
        for v in tri.vertices() {
            assert!(obb.contains_point(v, 1e-4));
        }
    }

    #[test]
    fn fit_degenerate_triangle_gets_minimum_thickness() {
        let tri = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0);
        let obb = Obb::fit_triangle(&tri, MIN_THICKNESS);
        let half = obb.half_extents();
        assert_relative_eq!(half.x, 1.0, epsilon = 1e-6);
        assert!(half.y >= MIN_THICKNESS * 0.5);
        assert!(half.z >= MIN_THICKNESS * 0.5);
        assert!(obb.volume() > 0.0);
    }

    #[test]
    fn principal_frame_follows_elongation() {
        let dir = Vec3::new(1.0, 1.0, 0.0).normalize();
        let points: Vec<Vec3> = (0..20)
            .map(|i| dir * i as f32 + Vec3::new(0.0, 0.0, (i % 2) as f32 * 0.1))
            .collect();
        let frame = Obb::principal_frame(&points);
        assert_relative_eq!(frame.x_axis.dot(dir).abs(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(frame.determinant(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn principal_frame_of_single_point_is_identity_or_orthonormal() {
        let frame = Obb::principal_frame(&[Vec3::ONE, Vec3::ONE]);
        assert_relative_eq!(frame.determinant(), 1.0, epsilon = 1e-4);
        assert_eq!(Obb::principal_frame(&[]), Mat3::IDENTITY);
    }

    #[test]
    fn transformed_box_keeps_volume_under_rotation() {
        let obb = Obb::from_aabb(&Aabb::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0)));
        let world = Mat4::from_rotation_translation(Quat::from_rotation_y(0.7), Vec3::new(5.0, 0.0, 0.0));
        let moved = obb.transformed(&world);
        assert_relative_eq!(moved.volume(), obb.volume(), epsilon = 1e-4);
        assert!(moved.contains_point(world.transform_point3(Vec3::new(2.0, 1.0, 1.0)), 1e-4));

        let scaled = obb.transformed(&Mat4::from_scale(Vec3::splat(2.0)));
        assert_relative_eq!(scaled.volume(), obb.volume() * 8.0, epsilon = 1e-4);
    }

    #[test]
    fn conservative_overlap() {
        let a = Obb::from_aabb(&Aabb::new(Vec3::ZERO, Vec3::ONE));
        let b = Obb::new(
            Vec3::new(1.6, 0.5, 0.5),
            Mat3::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4)) * Mat3::from_diagonal(Vec3::splat(0.5)),
        );
        // rotated cube corner pokes into a
        assert!(a.overlaps_conservative(&b));
        assert!(b.overlaps_conservative(&a));

        let far = Obb::new(Vec3::new(3.0, 0.5, 0.5), b.axes);
        assert!(!a.overlaps_conservative(&far));
    }

    #[test]
    fn fitted_boxes_of_touching_triangles_always_overlap() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(99);
        let random_point = |rng: &mut StdRng| {
            Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
        };

        for _ in 0..500 {
            let a = Triangle::new(random_point(&mut rng), random_point(&mut rng), random_point(&mut rng));
            if a.is_degenerate() {
                continue;
            }
            // a point strictly inside a becomes a vertex of b
            let (u, v) = (rng.random_range(0.2..0.4), rng.random_range(0.2..0.4));
            let shared = a.v0 + (a.v1 - a.v0) * u + (a.v2 - a.v0) * v;
            let b = Triangle::new(shared, random_point(&mut rng), random_point(&mut rng));

            let box_a = Obb::fit_triangle(&a, MIN_THICKNESS);
            let box_b = Obb::fit_triangle(&b, MIN_THICKNESS);
            assert!(box_a.overlaps_conservative(&box_b), "rejected {a:?} / {b:?}");
            assert!(box_b.overlaps_conservative(&box_a), "rejected {b:?} / {a:?}");
        }
    }

    #[test]
    fn corners_lie_on_bound() {
        let obb = Obb::new(
            Vec3::new(1.0, 2.0, 3.0),
            Mat3::from_quat(Quat::from_rotation_x(0.3)) * Mat3::from_diagonal(Vec3::new(1.0, 2.0, 0.5)),
        );
        let bound = obb.bound();
        for c in obb.corners() {
            assert!(bound.contains_point(c, 1e-4));
            assert!(obb.contains_point(c, 1e-4));
        }
    }
}
