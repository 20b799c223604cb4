use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Per piece placement applied to points as they are read.
/// Orientation is in degrees around each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieceTransform {
    pub translation: [f64; 3],
    pub orientation: [f64; 3],
    pub scale: [f64; 3],
    pub origin: [f64; 3],
}

impl Default for PieceTransform {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            orientation: [0.0; 3],
            scale: [1.0; 3],
            origin: [0.0; 3],
        }
    }
}

impl PieceTransform {
    pub fn translated(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn is_transformed(&self) -> bool {
        self.translation != [0.0; 3] || self.orientation != [0.0; 3] || self.scale != [1.0; 3]
    }

    /// The origin only moves points when it pivots a rotation or scale.
    fn origin_matters(&self) -> bool {
        self.orientation != [0.0; 3] || self.scale != [1.0; 3]
    }

    /// True when both transforms place every point identically.
    pub fn same_effect(&self, other: &PieceTransform) -> bool {
        if self.translation != other.translation
            || self.orientation != other.orientation
            || self.scale != other.scale
        {
            return false;
        }
        !self.origin_matters() || self.origin == other.origin
    }

    /// Translate(position + origin) * RotZ * RotX * RotY * Scale * Translate(-origin).
    pub fn matrix(&self) -> DMat4 {
        let origin = DVec3::from_array(self.origin);
        let [rx, ry, rz] = self.orientation;

        DMat4::from_translation(DVec3::from_array(self.translation) + origin)
            * DMat4::from_rotation_z(rz.to_radians())
            * DMat4::from_rotation_x(rx.to_radians())
            * DMat4::from_rotation_y(ry.to_radians())
            * DMat4::from_scale(DVec3::from_array(self.scale))
            * DMat4::from_translation(-origin)
    }

    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        self.matrix()
            .transform_point3(DVec3::from_array(point))
            .to_array()
    }
}
