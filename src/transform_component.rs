// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use bevy_ecs::component::Component;
use glam::{Mat4, Quat, Vec3};

/// Placement of a rigid object: uniform scale, then rotation, then translation.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct TransformComponent {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl TransformComponent {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        let translation_matrix = Mat4::from_translation(self.position);
        let rotation_matrix = Mat4::from_quat(self.rotation);
        let scale_matrix = Mat4::from_scale(Vec3::splat(self.scale));

        translation_matrix * rotation_matrix * scale_matrix
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (point * self.scale)
    }
}
