// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use glam::Vec3;

use super::triangle::Triangle;

/// Contact between two world-space triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleContact {
    pub point: Vec3,
    /// Unit face normal of the first triangle.
    pub normal_a: Vec3,
    /// Unit face normal of the second triangle.
    pub normal_b: Vec3,
}

/// Single contact point where two triangles cross, if they do.
///
/// Each triangle is cut by the other's plane; the contact point is the midpoint
/// of the overlap of the two cut segments along the plane-plane intersection line.
pub fn triangle_contact(a: &Triangle, b: &Triangle) -> Option<TriangleContact> {
    let normal_a = a.unit_normal();
    let normal_b = b.unit_normal();

    match (a.is_degenerate(), b.is_degenerate()) {
        (true, true) => return None,
        (true, false) => {
            let (p, q) = a.plane_intersection(b.v0, normal_b)?;
            return Some(TriangleContact {
                point: (p + q) * 0.5,
                normal_a: -normal_b,
                normal_b,
            });
        }
        (false, true) => {
            let (p, q) = b.plane_intersection(a.v0, normal_a)?;
            return Some(TriangleContact {
                point: (p + q) * 0.5,
                normal_a,
                normal_b: -normal_a,
            });
        }
        (false, false) => {}
    }

    let (a0, a1) = a.plane_intersection(b.v0, normal_b)?;
    let (b0, b1) = b.plane_intersection(a.v0, normal_a)?;

    let axis = dominant_axis(normal_a.cross(normal_b));
    let key = |p: &Vec3| p[axis];

    let (lo_a, hi_a) = ordered(key(&a0), key(&a1));
    let (lo_b, hi_b) = ordered(key(&b0), key(&b1));
    if hi_a < lo_b || hi_b < lo_a {
        return None;
    }

    let mut ends = [a0, a1, b0, b1];
    ends.sort_by(|p, q| key(p).total_cmp(&key(q)));

    Some(TriangleContact {
        point: (ends[1] + ends[2]) * 0.5,
        normal_a,
        normal_b,
    })
}

fn dominant_axis(v: Vec3) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn floor() -> Triangle {
        Triangle::new(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, -2.0),
        )
    }

    fn wall() -> Triangle {
        Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn crossing_triangles_touch_on_the_shared_line() {
        let contact = triangle_contact(&floor(), &wall()).expect("triangles cross");
        assert_relative_eq!(contact.point.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(contact.point.z, 0.0, epsilon = 1e-6);
        assert!(contact.point.x.abs() <= 1.0);
        assert_relative_eq!(contact.normal_a.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(contact.normal_b.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn separated_triangles_do_not_touch() {
        let lifted = wall().transformed(&glam::Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)));
        assert!(triangle_contact(&floor(), &lifted).is_none());

        // both planes are crossed but the segments do not overlap
        let aside = wall().transformed(&glam::Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert!(triangle_contact(&floor(), &aside).is_none());
    }

    #[test]
    fn coplanar_triangles_report_nothing() {
        let shifted = floor().transformed(&glam::Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0)));
        assert!(triangle_contact(&floor(), &shifted).is_none());
    }

    #[test]
    fn degenerate_triangle_takes_the_other_normal() {
        let needle = Triangle::new(
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
        );
        let contact = triangle_contact(&needle, &floor()).expect("needle pierces the floor");
        assert!(contact.point.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(contact.normal_a, -contact.normal_b);

        let swapped = triangle_contact(&floor(), &needle).expect("needle pierces the floor");
        assert_eq!(swapped.normal_b, -swapped.normal_a);
        assert!(triangle_contact(&needle, &needle).is_none());
    }

    #[test]
    fn contact_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(7);
        let random_point = |rng: &mut StdRng| {
            Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
        };

        for _ in 0..500 {
            let a = Triangle::new(random_point(&mut rng), random_point(&mut rng), random_point(&mut rng));
            let b = Triangle::new(random_point(&mut rng), random_point(&mut rng), random_point(&mut rng));

            let ab = triangle_contact(&a, &b);
            let ba = triangle_contact(&b, &a);
            assert_eq!(ab.is_some(), ba.is_some());
            if let (Some(ab), Some(ba)) = (ab, ba) {
                assert!(ab.normal_a.abs_diff_eq(ba.normal_b, 1e-6));
                assert!(ab.normal_b.abs_diff_eq(ba.normal_a, 1e-6));
            }
        }
    }
}
