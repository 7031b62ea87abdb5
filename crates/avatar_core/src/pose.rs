use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bakes a uniform `scale` into the linear part of `matrix`, leaving the
/// translation alone.
pub fn with_scale(matrix: Mat4, scale: f32) -> Mat4 {
    matrix * Mat4::from_scale(Vec3::splat(scale))
}

/// The transform of one object. While `auto_update` is set the matrix is
/// recomposed from the layout on every refresh. An explicit matrix turns that
/// off for good.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    matrix: Mat4,
    auto_update: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix: Mat4::IDENTITY,
            auto_update: true,
        }
    }
}

impl Placement {
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
        self.auto_update = false;
    }

    pub fn refresh(&mut self) {
        if self.auto_update {
            self.matrix =
                Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
        }
    }
}

/// Fits a tracker head pose into the avatar's scene.
///
/// Tracker translations are in centimetres with the face looking down -Z. The
/// closer the head is to the camera the bigger it looks, so the avatar scale is
/// inversely proportional to the head depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoseFit {
    pub base_scale: f32,
    /// Depth at which the avatar is shown at `base_scale`.
    pub reference_depth: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub translation_scale: f32,
    pub anchor: Vec3,
}

impl Default for PoseFit {
    fn default() -> Self {
        Self {
            base_scale: 1.0,
            reference_depth: 50.0,
            min_scale: 0.25,
            max_scale: 4.0,
            translation_scale: 0.02,
            anchor: Vec3::ZERO,
        }
    }
}

impl PoseFit {
    pub fn infer_scale(&self, matrix: &Mat4) -> f32 {
        let depth = -matrix.w_axis.z;
        if !depth.is_finite() || depth <= f32::EPSILON {
            return self.base_scale;
        }
        (self.base_scale * self.reference_depth / depth).clamp(self.min_scale, self.max_scale)
    }

    /// Returns the rigid avatar transform and the scale to bake into it.
    pub fn fit(&self, matrix: Mat4) -> (Mat4, f32) {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        let offset = Vec3::new(translation.x, translation.y, 0.0) * self.translation_scale;
        let placed = Mat4::from_rotation_translation(rotation, self.anchor + offset);
        (placed, self.infer_scale(&matrix))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_scale > 0.0) || !self.base_scale.is_finite() {
            return Err(ConfigError::InvalidPoseFit("baseScale must be positive"));
        }
        if !(self.reference_depth > 0.0) || !self.reference_depth.is_finite() {
            return Err(ConfigError::InvalidPoseFit("referenceDepth must be positive"));
        }
        if !(self.min_scale > 0.0) || !(self.min_scale <= self.max_scale) {
            return Err(ConfigError::InvalidPoseFit("minScale must be positive and at most maxScale"));
        }
        if !self.translation_scale.is_finite() || !self.anchor.is_finite() {
            return Err(ConfigError::InvalidPoseFit("translation must be finite"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn scale_leaves_translation() {
        let m = Mat4::from_rotation_translation(Quat::from_rotation_y(0.3), Vec3::new(1.0, 2.0, 3.0));
        let scaled = with_scale(m, 2.0);
        assert_eq!(scaled.w_axis, m.w_axis);
        assert!((scaled.x_axis.truncate().length() - 2.0).abs() < 1e-5);
        assert!((scaled.z_axis.truncate().length() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn refresh_stops_after_explicit_matrix() {
        let mut placement = Placement::default();
        placement.translation = Vec3::X;
        placement.refresh();
        assert!(approx(placement.matrix(), Mat4::from_translation(Vec3::X)));

        let explicit = Mat4::from_translation(Vec3::Y * 5.0);
        placement.set_matrix(explicit);
        placement.translation = Vec3::Z;
        placement.refresh();
        placement.refresh();
        assert!(!placement.auto_update());
        assert_eq!(placement.matrix(), explicit);
    }

    #[test]
    fn nearer_head_is_larger() {
        let fit = PoseFit::default();
        let at = |z: f32| fit.infer_scale(&Mat4::from_translation(Vec3::new(0.0, 0.0, z)));
        assert!((at(-50.0) - 1.0).abs() < 1e-6);
        assert!((at(-25.0) - 2.0).abs() < 1e-6);
        assert_eq!(at(-1.0), fit.max_scale);
        assert_eq!(at(-1000.0), fit.min_scale);
        assert_eq!(at(10.0), fit.base_scale);
        assert_eq!(at(f32::NAN), fit.base_scale);
    }

    #[test]
    fn fit_keeps_rotation_and_drops_depth() {
        let fit = PoseFit {
            anchor: Vec3::new(0.0, 1.0, 0.0),
            ..PoseFit::default()
        };
        let rotation = Quat::from_rotation_x(0.4);
        let (placed, scale) =
            fit.fit(Mat4::from_rotation_translation(rotation, Vec3::new(10.0, -5.0, -50.0)));
        let (_, r, t) = placed.to_scale_rotation_translation();
        assert!(r.abs_diff_eq(rotation, 1e-5));
        assert!(t.abs_diff_eq(Vec3::new(0.2, 0.9, 0.0), 1e-5));
        assert!((scale - 1.0).abs() < 1e-6);
    }

    #[test]
    fn validate_rejects_inverted_range() {
        assert!(PoseFit::default().validate().is_ok());
        let fit = PoseFit {
            min_scale: 3.0,
            max_scale: 1.0,
            ..PoseFit::default()
        };
        assert!(fit.validate().is_err());
    }
}
