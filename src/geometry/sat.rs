// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use glam::Vec3;

use super::{aabb::Aabb, triangle::Triangle};

/// Closed projection interval on an axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        values.into_iter().fold(
            Interval {
                min: f32::MAX,
                max: f32::MIN,
            },
            |acc, v| Interval {
                min: acc.min.min(v),
                max: acc.max.max(v),
            },
        )
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Vec3,
    pub end: Vec3,
}

impl LineSegment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    pub fn midpoint(&self) -> Vec3 {
        (self.start + self.end) * 0.5
    }
}

/// Shapes that can take part in a separating-axis test.
pub trait SeparatingAxes {
    type Axes: IntoIterator<Item = Vec3>;

    /// Candidate separating axes contributed by this shape.
    fn axes(&self) -> Self::Axes;

    fn project(&self, axis: Vec3) -> Interval;
}

impl SeparatingAxes for Vec3 {
    type Axes = [Vec3; 0];

    fn axes(&self) -> Self::Axes {
        []
    }

    fn project(&self, axis: Vec3) -> Interval {
        let d = axis.dot(*self);
        Interval { min: d, max: d }
    }
}

impl SeparatingAxes for LineSegment {
    type Axes = [Vec3; 1];

    fn axes(&self) -> Self::Axes {
        [self.end - self.start]
    }

    fn project(&self, axis: Vec3) -> Interval {
        Interval::from_values([axis.dot(self.start), axis.dot(self.end)])
    }
}

impl SeparatingAxes for Triangle {
    type Axes = [Vec3; 4];

    /// Face normal plus the in-plane normal of each edge.
    fn axes(&self) -> Self::Axes {
        let n = self.normal();
        [
            n,
            n.cross(self.v1 - self.v0),
            n.cross(self.v2 - self.v1),
            n.cross(self.v0 - self.v2),
        ]
    }

    fn project(&self, axis: Vec3) -> Interval {
        Interval::from_values(self.vertices().map(|v| axis.dot(v)))
    }
}

impl SeparatingAxes for Aabb {
    type Axes = [Vec3; 3];

    fn axes(&self) -> Self::Axes {
        [Vec3::X, Vec3::Y, Vec3::Z]
    }

    fn project(&self, axis: Vec3) -> Interval {
        let center = axis.dot(self.center());
        let radius = axis.abs().dot(self.size() * 0.5);
        Interval {
            min: center - radius,
            max: center + radius,
        }
    }
}

/// True when no axis contributed by either shape separates their projections.
pub fn intersects<A, B>(a: &A, b: &B) -> bool
where
    A: SeparatingAxes,
    B: SeparatingAxes,
{
    a.axes()
        .into_iter()
        .chain(b.axes())
        .all(|axis| a.project(axis).overlaps(&b.project(axis)))
}
