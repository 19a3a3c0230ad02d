//! Platform configuration: the physical dimensions and servo properties the
//! geometry and solver are derived from.

use std::f64::consts::PI;

/// Direction a servo must rotate to move its arm tip in the +Z direction.
///
/// Servos on a Stewart platform are mounted in mirrored pairs, so the sense
/// alternates around the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoDirection {
    Clockwise,
    CounterClockwise,
}

impl ServoDirection {
    /// Sign factor applied to the solved angle.
    pub fn sign(self) -> f64 {
        match self {
            ServoDirection::Clockwise => -1.0,
            ServoDirection::CounterClockwise => 1.0,
        }
    }
}

/// Physical description of one Stewart platform.
///
/// Linear fields share one unit (the reference build uses inches); angles are
/// in the unit each field documents. Everything here is fixed at platform
/// creation except `servo_trim`, which the control server may update at the
/// request of a client.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Servo physical minimum limit in degrees (0 is horizontal).
    pub servo_min: f64,

    /// Servo physical maximum limit in degrees.
    pub servo_max: f64,

    /// Length of the servo arm, center of rotation to ball-joint pivot.
    pub servo_arm_length: f64,

    /// Rotation in radians of the positive (left-hand rule) axis of each
    /// servo relative to the platform Y axis.
    pub servo_orientation: [f64; 6],

    /// Rotation sense per servo.
    pub servo_direction: [ServoDirection; 6],

    /// Per-servo calibration offset in degrees, correcting mechanical
    /// zero-point error.
    pub servo_trim: [f64; 6],

    /// Length of the control rod connecting arm tip to effector anchor.
    pub control_rod_length: f64,

    /// Vertical distance from the servo axis plane to the effector platform
    /// mounting points with all servos at 0°.
    pub platform_height: f64,

    /// Distance from the effector platform center to each control-rod
    /// anchor.
    pub effector_radius: f64,

    /// Distance from the base center to each servo-arm pivot.
    pub base_radius: f64,

    /// Angle in radians between paired servo pivot points on the base.
    pub theta_base: f64,

    /// Angle in radians between paired anchor points on the effector.
    pub theta_effector: f64,

    /// Emit verbose solver traces.
    pub debug: bool,
}

impl PlatformConfig {
    /// Dimensions of the documented reference build: SG-5010 class servos on
    /// a roughly 8-inch base, ±85° of usable servo travel.
    pub fn reference() -> Self {
        PlatformConfig {
            servo_min: -85.0,
            servo_max: 85.0,
            servo_arm_length: 1.0 + 7.0 / 16.0,
            servo_orientation: [
                6.0 * PI / 6.0,
                -4.0 * PI / 6.0,
                2.0 * PI / 6.0,
                4.0 * PI / 6.0,
                -2.0 * PI / 6.0,
                0.0,
            ],
            servo_direction: [
                ServoDirection::Clockwise,
                ServoDirection::CounterClockwise,
                ServoDirection::Clockwise,
                ServoDirection::CounterClockwise,
                ServoDirection::Clockwise,
                ServoDirection::CounterClockwise,
            ],
            servo_trim: [0.0; 6],
            control_rod_length: 4.0 + 1.0 / 16.0,
            platform_height: 3.0 + 3.0 / 16.0,
            effector_radius: 3.0 + 6.0 / 8.0,
            base_radius: 4.0 + 1.0 / 8.0,
            theta_base: 63.0_f64.to_radians(),
            theta_effector: 32.4_f64.to_radians(),
            debug: false,
        }
    }

    /// A platform whose anchors sit directly above the servo pivots, with
    /// the rod length chosen so all six servos rest at exactly 0° in the
    /// home pose. Useful as a geometric fixture.
    pub fn symmetric(arm: f64, height: f64, radius: f64, theta: f64) -> Self {
        let mut config = Self::reference();
        config.servo_arm_length = arm;
        config.platform_height = height;
        config.control_rod_length = (arm * arm + height * height).sqrt();
        config.base_radius = radius;
        config.effector_radius = radius;
        config.theta_base = theta;
        config.theta_effector = theta;
        config
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::reference()
    }
}
