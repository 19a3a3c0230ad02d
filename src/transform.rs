//! Rotation matrices and rigid point transformation.
//!
//! The platform pose is described either by intrinsic yaw/pitch/roll angles or
//! by an arbitrary axis and a rotation angle around it. Both forms reduce to a
//! 3×3 rotation matrix that is rebuilt from scratch on every pose update and
//! applied to the effector anchor points around a caller-supplied origin.

use nalgebra::{Matrix3, Vector3};

/// Pose requested by a client, in the units the wire protocol uses:
/// all angles in degrees, translation in the platform's linear units.
///
/// Exactly one rotation form is active; dispatch is exhaustive wherever a
/// `PoseTransform` is consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseTransform {
    /// Intrinsic yaw (Z), then pitch (Y), then roll (X) rotation.
    Euclidean {
        yaw: f64,
        pitch: f64,
        roll: f64,
        translate: Vector3<f64>,
    },
    /// Rotation by `angle` around `axis`. The axis does not need to be
    /// normalized; a zero-magnitude axis produces the all-zero matrix
    /// (see [`axis_angle_matrix`]).
    AxisAngle {
        axis: Vector3<f64>,
        angle: f64,
        translate: Vector3<f64>,
    },
}

impl Default for PoseTransform {
    /// The home pose: no rotation, no translation.
    fn default() -> Self {
        PoseTransform::Euclidean {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            translate: Vector3::zeros(),
        }
    }
}

impl PoseTransform {
    /// Builds the rotation matrix for this pose, converting the degree
    /// fields to radians.
    pub fn rotation(&self) -> Matrix3<f64> {
        match *self {
            PoseTransform::Euclidean {
                yaw, pitch, roll, ..
            } => rotation_matrix(yaw.to_radians(), pitch.to_radians(), roll.to_radians()),
            PoseTransform::AxisAngle { axis, angle, .. } => {
                axis_angle_matrix(&axis, angle.to_radians())
            }
        }
    }

    /// The translation component of the pose.
    pub fn translation(&self) -> Vector3<f64> {
        match *self {
            PoseTransform::Euclidean { translate, .. }
            | PoseTransform::AxisAngle { translate, .. } => translate,
        }
    }
}

/// Rotation matrix for intrinsic yaw, then pitch, then roll. Angles in
/// radians. `rotation_matrix(0.0, 0.0, 0.0)` is the identity.
pub fn rotation_matrix(yaw: f64, pitch: f64, roll: f64) -> Matrix3<f64> {
    let (sin_y, cos_y) = yaw.sin_cos();
    let (sin_p, cos_p) = pitch.sin_cos();
    let (sin_r, cos_r) = roll.sin_cos();

    Matrix3::new(
        cos_p * cos_y,
        -cos_p * sin_y,
        sin_p,
        cos_r * sin_y + sin_r * cos_y * sin_p,
        cos_r * cos_y - sin_r * sin_y * sin_p,
        -sin_r * cos_p,
        sin_r * sin_y - cos_r * cos_y * sin_p,
        sin_r * cos_y + cos_r * sin_y * sin_p,
        cos_r * cos_p,
    )
}

/// Rotation matrix by `angle` radians around `axis` (Rodrigues' formula).
///
/// A zero-magnitude axis has no defined rotation plane; the original
/// controller returned the all-zero matrix for it and clients depend on
/// that, so the degenerate case is kept rather than defaulting to identity.
pub fn axis_angle_matrix(axis: &Vector3<f64>, angle: f64) -> Matrix3<f64> {
    let mag = axis.norm();
    if mag == 0.0 {
        return Matrix3::zeros();
    }

    let v = axis / mag;
    let (sin_a, cos_a) = angle.sin_cos();
    let t = 1.0 - cos_a;

    Matrix3::new(
        t * v.x * v.x + cos_a,
        t * v.x * v.y - sin_a * v.z,
        t * v.x * v.z + sin_a * v.y,
        t * v.x * v.y + sin_a * v.z,
        t * v.y * v.y + cos_a,
        t * v.y * v.z - sin_a * v.x,
        t * v.x * v.z - sin_a * v.y,
        t * v.y * v.z + sin_a * v.x,
        t * v.z * v.z + cos_a,
    )
}

/// Rotates `point` around `origin` by `matrix`, then translates:
/// `translation + matrix · (point − origin) + origin`.
pub fn transform_point(
    point: &Vector3<f64>,
    origin: &Vector3<f64>,
    translation: &Vector3<f64>,
    matrix: &Matrix3<f64>,
) -> Vector3<f64> {
    translation + matrix * (point - origin) + origin
}
