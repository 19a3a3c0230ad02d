//! The Stewart platform solver: derived geometry, elapsed-time bookkeeping,
//! and the per-actuator inverse-kinematics algorithm.
//!
//! Each actuator is solved independently. The servo arm sweeps a circle
//! around its pivot; the control rod constrains the arm tip to a sphere
//! around the transformed effector anchor. Intersecting the two yields up to
//! two candidate arm angles, of which the one closest to 0° is chosen.

use std::fmt;
use std::time::{Duration, Instant};

use nalgebra::{Matrix3, Vector2, Vector3};
use tracing::{debug, error};

use crate::kinematic_traits::{
    InverseKinematics, Solution, SolutionFlags, Solutions, SolveOutcome,
};
use crate::parameters::PlatformConfig;
use crate::transform::{PoseTransform, transform_point};

/// Positions derived once from [`PlatformConfig`] at platform creation.
/// Never mutated afterwards; a geometry change requires a new platform.
#[derive(Debug, Clone)]
pub struct PlatformGeometry {
    /// Servo arm pivot positions, in the base plane (z = 0).
    pub servo_axis_pos: [Vector3<f64>; 6],
    /// Unit vector each servo arm points along at 0°.
    pub servo_axis_normal: [Vector3<f64>; 6],
    /// Control-rod anchor positions in the effector platform frame, before
    /// any pose transform. The platform height is added as part of the
    /// pose translation, not here.
    pub effector_pos: [Vector3<f64>; 6],
}

impl PlatformGeometry {
    fn derive(config: &PlatformConfig) -> Self {
        use std::f64::consts::PI;

        let half_tb = config.theta_base / 2.0;
        let half_te = config.theta_effector / 2.0;

        // Servos and anchors sit in mirrored pairs around three spokes at
        // 120° from each other.
        let spokes = [
            -PI + half_tb,
            -PI / 3.0 - half_tb,
            -PI / 3.0 + half_tb,
            PI / 3.0 - half_tb,
            PI / 3.0 + half_tb,
            PI - half_tb,
        ];
        let anchor_spokes = [
            -PI + half_te,
            -PI / 3.0 - half_te,
            -PI / 3.0 + half_te,
            PI / 3.0 - half_te,
            PI / 3.0 + half_te,
            PI - half_te,
        ];

        let servo_axis_pos = spokes
            .map(|theta| Vector3::new(config.base_radius * theta.sin(), config.base_radius * theta.cos(), 0.0));
        let effector_pos = anchor_spokes.map(|theta| {
            Vector3::new(
                config.effector_radius * theta.sin(),
                config.effector_radius * theta.cos(),
                0.0,
            )
        });
        let servo_axis_normal = config
            .servo_orientation
            .map(|o| Vector3::new(o.cos(), o.sin(), 0.0));

        PlatformGeometry {
            servo_axis_pos,
            servo_axis_normal,
            effector_pos,
        }
    }
}

/// One Stewart platform: immutable derived geometry, the configuration it
/// was built from (trim excepted), and a creation timestamp for status
/// reporting.
pub struct StewartPlatform {
    config: PlatformConfig,
    geometry: PlatformGeometry,
    started: Instant,
}

impl StewartPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        let geometry = PlatformGeometry::derive(&config);
        StewartPlatform {
            config,
            geometry,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn geometry(&self) -> &PlatformGeometry {
        &self.geometry
    }

    /// Wall-clock time since this platform was created. Only used for
    /// status timestamps, never in solving.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Updates one servo's trim in degrees. Channels outside 0–5 are
    /// ignored. Geometry is unaffected.
    pub fn set_trim(&mut self, channel: usize, degrees: f64) {
        if let Some(trim) = self.config.servo_trim.get_mut(channel) {
            *trim = degrees;
        }
    }

    /// Applies the pose to every effector anchor, returning the world-space
    /// targets together with the rotation matrix that was used.
    fn transform_effectors(
        &self,
        origin: &Vector3<f64>,
        transform: &PoseTransform,
    ) -> ([Vector3<f64>; 6], Matrix3<f64>) {
        let matrix = transform.rotation();
        let mut translation = transform.translation();
        // The anchors are stored at z = 0 in the platform frame; the resting
        // height enters through the translation so the origin math stays
        // simple.
        translation.z += self.config.platform_height;

        let targets = self
            .geometry
            .effector_pos
            .map(|anchor| transform_point(&anchor, origin, &translation, &matrix));
        (targets, matrix)
    }

    /// Solves one actuator and applies rotation sense, trim and clamping.
    fn solve_actuator(&self, index: usize, effector: &Vector3<f64>) -> Solution {
        let c = &self.config;
        let g = &self.geometry;

        let candidates = self.arm_candidates(
            &g.servo_axis_pos[index],
            c.servo_arm_length,
            &g.servo_axis_normal[index],
            effector,
            c.control_rod_length,
        );

        let (raw, mut flags) = match candidates {
            ArmCandidates::One(angle) => (angle, SolutionFlags::empty()),
            ArmCandidates::Two(a, b) => {
                // Minimize actuator travel from zero.
                let best = if a.abs() < b.abs() { a } else { b };
                (best, SolutionFlags::empty())
            }
            ArmCandidates::None { nearest } => (nearest, SolutionFlags::IMPOSSIBLE),
        };

        // The solver works in radians; everything the caller sees is in
        // degrees with the servo's rotation sense applied.
        let angle = c.servo_direction[index].sign() * raw.to_degrees();
        let trimmed = angle + c.servo_trim[index];

        let solution = if trimmed < c.servo_min {
            if angle >= c.servo_min {
                flags |= SolutionFlags::TRIM;
            }
            flags |= SolutionFlags::LIMITED;
            Solution {
                angle: c.servo_min,
                actual: trimmed,
                flags,
            }
        } else if trimmed > c.servo_max {
            if angle <= c.servo_max {
                flags |= SolutionFlags::TRIM;
            }
            flags |= SolutionFlags::LIMITED;
            Solution {
                angle: c.servo_max,
                actual: trimmed,
                flags,
            }
        } else {
            Solution {
                angle: trimmed,
                actual: trimmed,
                flags,
            }
        };

        if c.debug {
            debug!(
                servo = index,
                angle = solution.angle,
                actual = solution.actual,
                flags = ?solution.flags,
                "actuator solved"
            );
        }

        solution
    }

    /// Classifies the arm-circle / rod-sphere relationship and produces the
    /// candidate angles.
    ///
    /// The sphere of rod reach around the effector target, seen along the
    /// servo's swing plane, becomes a circle; the arm's swing line cut
    /// through it gives a chord, and intersecting the chord-derived circle
    /// with the arm circle yields the candidate angles.
    fn arm_candidates(
        &self,
        servo_pos: &Vector3<f64>,
        arm_length: f64,
        servo_arm: &Vector3<f64>,
        effector_pos: &Vector3<f64>,
        rod_length: f64,
    ) -> ArmCandidates {
        let debug_on = self.config.debug;
        let to_effector = effector_pos - servo_pos;
        let d = to_effector.norm();

        // Too far: even arm and rod in a straight line cannot reach.
        if d > rod_length + arm_length {
            if debug_on {
                debug!("effector too far from pivot for rod to reach");
            }
            return ArmCandidates::None {
                nearest: projected_angle(&to_effector),
            };
        }

        // Exactly tangent, fully stretched.
        if d == rod_length + arm_length {
            if debug_on {
                debug!("effector at exact full stretch");
            }
            return ArmCandidates::One(projected_angle(&to_effector));
        }

        // Arm circle entirely inside the rod sphere.
        if rod_length - d > arm_length {
            if debug_on {
                debug!("effector too close to pivot for rod");
            }
            return ArmCandidates::None {
                nearest: -projected_angle(&to_effector),
            };
        }

        // Touching from the inside.
        if rod_length - d == arm_length {
            if debug_on {
                debug!("effector at minimum rod distance");
            }
            return ArmCandidates::One(-projected_angle(&to_effector));
        }

        let chord = match line_circle_intersect(servo_arm, &to_effector, rod_length) {
            LineCircle::NoDirection => {
                error!("servo arm direction vector has zero length");
                return ArmCandidates::None {
                    nearest: projected_angle(&to_effector),
                };
            }
            LineCircle::Miss => {
                if debug_on {
                    debug!("no line-circle intersection");
                }
                return ArmCandidates::None {
                    nearest: projected_angle(&to_effector),
                };
            }
            LineCircle::Chord(chord) => chord,
        };

        let half_chord = (chord.mid - chord.a).norm();
        let mid_offset = chord.mid.norm();

        // Project into the servo's swing plane: radial offset of the chord
        // midpoint horizontally, effector height vertically.
        let projected = Vector2::new(
            if chord.mid.x > 0.0 {
                mid_offset
            } else {
                -mid_offset
            },
            to_effector.z,
        );

        match circle_circle_intersect(arm_length, &projected, half_chord) {
            CircleCircle::Miss => {
                if debug_on {
                    debug!("no circle-circle intersection");
                }
                ArmCandidates::None {
                    nearest: -projected.y.atan2(projected.x),
                }
            }
            CircleCircle::Points(p, q) => {
                let flip = servo_arm.x > 0.0;
                let angle_of =
                    |p: &Vector2<f64>| p.y.atan2(if flip { p.x } else { -p.x });
                ArmCandidates::Two(angle_of(&p), angle_of(&q))
            }
        }
    }
}

impl InverseKinematics for StewartPlatform {
    fn solve(&self, origin: &Vector3<f64>, transform: &PoseTransform) -> SolveOutcome {
        let (effectors, rotation) = self.transform_effectors(origin, transform);

        let mut solutions: Solutions = Default::default();
        for (i, effector) in effectors.iter().enumerate() {
            if self.config.debug {
                debug!(servo = i, x = effector.x, y = effector.y, z = effector.z, "target");
            }
            solutions[i] = self.solve_actuator(i, effector);
        }

        let constrained = solutions
            .iter()
            .filter(|s| s.flags.is_constrained())
            .count();

        SolveOutcome {
            solutions,
            rotation,
            constrained,
        }
    }
}

impl fmt::Display for StewartPlatform {
    /// Configuration and derived-geometry dump in a form useful for
    /// bring-up logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        let g = &self.geometry;
        writeln!(f, "PlatformConfig {{")?;
        writeln!(f, "    servo_min = {:.2}", c.servo_min)?;
        writeln!(f, "    servo_max = {:.2}", c.servo_max)?;
        writeln!(f, "    servo_arm_length = {:.2}", c.servo_arm_length)?;
        writeln!(f, "    control_rod_length = {:.2}", c.control_rod_length)?;
        writeln!(f, "    platform_height = {:.2}", c.platform_height)?;
        writeln!(f, "    effector_radius = {:.2}", c.effector_radius)?;
        writeln!(f, "    base_radius = {:.2}", c.base_radius)?;
        writeln!(f, "    theta_base = {:.2} rad", c.theta_base)?;
        writeln!(f, "    theta_effector = {:.2} rad", c.theta_effector)?;
        for i in 0..6 {
            writeln!(
                f,
                "    servo[{i}]: orientation = {:+.2} rad, {:?}, trim = {:+.2} deg",
                c.servo_orientation[i], c.servo_direction[i], c.servo_trim[i]
            )?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "PlatformGeometry {{")?;
        for i in 0..6 {
            let p = g.servo_axis_pos[i];
            let n = g.servo_axis_normal[i];
            let e = g.effector_pos[i];
            writeln!(
                f,
                "    servo[{i}]: pivot = ({:+.2}, {:+.2}), normal = ({:+.2}, {:+.2}), anchor = ({:+.2}, {:+.2})",
                p.x, p.y, n.x, n.y, e.x, e.y
            )?;
        }
        write!(f, "}}")
    }
}

/// Candidate arm angles for one actuator, in radians.
enum ArmCandidates {
    /// No reachable solution; `nearest` is the best-effort direction so the
    /// actuator still gets a command.
    None { nearest: f64 },
    One(f64),
    Two(f64, f64),
}

/// Chord cut by a line (through the origin, along `vector`) out of a circle.
struct Chord {
    a: Vector2<f64>,
    mid: Vector2<f64>,
}

enum LineCircle {
    /// The direction vector projects to zero length; the quadratic would
    /// divide by zero.
    NoDirection,
    Miss,
    Chord(Chord),
}

/// Intersects the line through the origin along `vector` (projected to the
/// base plane) with the circle of `radius` around `center`.
fn line_circle_intersect(
    vector: &Vector3<f64>,
    center: &Vector3<f64>,
    radius: f64,
) -> LineCircle {
    let a = vector.x * vector.x + vector.y * vector.y;
    let b = 2.0 * (vector.x * -center.x + vector.y * -center.y);
    let c = (center.x * center.x + center.y * center.y) - radius * radius;

    if a == 0.0 {
        return LineCircle::NoDirection;
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return LineCircle::Miss;
    }

    let s = discriminant.sqrt();
    let ua = (-b + s) / (2.0 * a);
    let um = -b / (2.0 * a);

    LineCircle::Chord(Chord {
        a: Vector2::new(vector.x * ua, vector.y * ua),
        mid: Vector2::new(vector.x * um, vector.y * um),
    })
}

enum CircleCircle {
    Miss,
    /// The two intersection points (equal when the circles are tangent).
    Points(Vector2<f64>, Vector2<f64>),
}

/// Intersects the circle of radius `ra` around the origin with the circle of
/// radius `rb` around `b`.
fn circle_circle_intersect(ra: f64, b: &Vector2<f64>, rb: f64) -> CircleCircle {
    let d = b.norm();

    if d > ra + rb {
        return CircleCircle::Miss;
    }
    if d < (ra - rb).abs() {
        return CircleCircle::Miss;
    }

    let a = (ra * ra - rb * rb + d * d) / (2.0 * d);
    let l = (ra * ra - a * a).sqrt();
    let mid = a * b / d;

    CircleCircle::Points(
        Vector2::new(mid.x + l * b.y / d, mid.y - l * b.x / d),
        Vector2::new(mid.x - l * b.y / d, mid.y + l * b.x / d),
    )
}

/// Angle of a 3D vector above the base plane: `atan2(z, |xy|)`.
fn projected_angle(v: &Vector3<f64>) -> f64 {
    v.z.atan2((v.x * v.x + v.y * v.y).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ServoDirection;

    const TOLERANCE: f64 = 1e-9;

    fn home() -> PoseTransform {
        PoseTransform::default()
    }

    fn solve_home(platform: &StewartPlatform) -> SolveOutcome {
        platform.solve(&Vector3::zeros(), &home())
    }

    #[test]
    fn geometry_pivots_lie_on_base_circle() {
        let config = PlatformConfig::reference();
        let platform = StewartPlatform::new(config.clone());
        for (i, pivot) in platform.geometry().servo_axis_pos.iter().enumerate() {
            assert!(
                (pivot.xy().norm() - config.base_radius).abs() < TOLERANCE,
                "pivot {i} off the base circle: {pivot:?}"
            );
            assert_eq!(pivot.z, 0.0);
        }
    }

    #[test]
    fn geometry_normals_are_unit_length() {
        let platform = StewartPlatform::new(PlatformConfig::reference());
        for normal in &platform.geometry().servo_axis_normal {
            assert!((normal.norm() - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn geometry_last_pivot_matches_hand_computation() {
        let config = PlatformConfig::reference();
        let platform = StewartPlatform::new(config.clone());
        let theta = std::f64::consts::PI - config.theta_base / 2.0;
        let expected = Vector3::new(
            config.base_radius * theta.sin(),
            config.base_radius * theta.cos(),
            0.0,
        );
        assert!((platform.geometry().servo_axis_pos[5] - expected).norm() < TOLERANCE);
    }

    #[test]
    fn symmetric_platform_rests_at_zero() {
        let platform = StewartPlatform::new(PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6));
        let outcome = solve_home(&platform);
        assert_eq!(outcome.constrained, 0);
        for (i, s) in outcome.solutions.iter().enumerate() {
            assert!(s.flags.is_solution(), "servo {i}: {:?}", s.flags);
            assert!(s.angle.abs() < 1e-6, "servo {i} at {}", s.angle);
            assert_eq!(s.angle, s.actual);
        }
    }

    #[test]
    fn zero_candidate_wins_over_half_turn() {
        // In the symmetric home pose the two geometric candidates per servo
        // are 0 and ±180°; minimal travel must select 0.
        let platform = StewartPlatform::new(PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6));
        let outcome = solve_home(&platform);
        for s in &outcome.solutions {
            assert!(s.angle.abs() < 90.0);
        }
    }

    #[test]
    fn reference_platform_identity_axis_angle_is_unconstrained() {
        let platform = StewartPlatform::new(PlatformConfig::reference());
        let pose = PoseTransform::AxisAngle {
            axis: Vector3::new(0.0, 0.0, 1.0),
            angle: 0.0,
            translate: Vector3::zeros(),
        };
        let outcome = platform.solve(&Vector3::zeros(), &pose);
        assert_eq!(outcome.constrained, 0);
        for (i, s) in outcome.solutions.iter().enumerate() {
            assert!(s.flags.is_solution(), "servo {i}: {:?}", s.flags);
            assert!(!s.flags.contains(SolutionFlags::LIMITED), "servo {i}");
        }
    }

    #[test]
    fn angles_always_within_servo_range() {
        let platform = StewartPlatform::new(PlatformConfig::reference());
        let config = platform.config().clone();
        // Sweep a grid of poses including unreachable ones.
        for z in [-6.0, -1.0, 0.0, 1.0, 6.0, 20.0] {
            for yaw in [-40.0, 0.0, 40.0] {
                for roll in [-25.0, 0.0, 25.0] {
                    let pose = PoseTransform::Euclidean {
                        yaw,
                        pitch: 0.0,
                        roll,
                        translate: Vector3::new(0.0, 0.0, z),
                    };
                    let outcome = platform.solve(&Vector3::zeros(), &pose);
                    for (i, s) in outcome.solutions.iter().enumerate() {
                        assert!(
                            s.angle >= config.servo_min && s.angle <= config.servo_max,
                            "servo {i} out of range at z={z} yaw={yaw} roll={roll}: {}",
                            s.angle
                        );
                        if s.angle != s.actual {
                            assert!(
                                s.flags.contains(SolutionFlags::LIMITED),
                                "actual differs without LIMITED"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn unreachable_pose_is_impossible_for_all_actuators() {
        let platform = StewartPlatform::new(PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6));
        let pose = PoseTransform::Euclidean {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            translate: Vector3::new(0.0, 0.0, 50.0),
        };
        let outcome = platform.solve(&Vector3::zeros(), &pose);
        assert_eq!(outcome.constrained, 6);
        for s in &outcome.solutions {
            assert!(s.flags.contains(SolutionFlags::IMPOSSIBLE));
        }
    }

    #[test]
    fn limit_without_trim_sets_only_limited() {
        let mut config = PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6);
        config.servo_min = -10.0;
        config.servo_max = 10.0;
        let platform = StewartPlatform::new(config.clone());
        // Raising the platform needs ~17.5° of travel, past the 10° limit.
        let pose = PoseTransform::Euclidean {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            translate: Vector3::new(0.0, 0.0, 0.5),
        };
        let outcome = platform.solve(&Vector3::zeros(), &pose);
        assert_eq!(outcome.constrained, 6);
        for (i, s) in outcome.solutions.iter().enumerate() {
            assert!(s.flags.contains(SolutionFlags::LIMITED), "servo {i}");
            assert!(!s.flags.contains(SolutionFlags::TRIM), "servo {i}");
            assert!(s.flags.is_solution(), "servo {i}");
            let bound = match config.servo_direction[i] {
                ServoDirection::CounterClockwise => config.servo_max,
                ServoDirection::Clockwise => config.servo_min,
            };
            assert_eq!(s.angle, bound, "servo {i}");
            assert!(s.actual.abs() > 10.0, "servo {i} actual {}", s.actual);
        }
    }

    #[test]
    fn trim_induced_limit_sets_trim_flag() {
        let mut config = PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6);
        config.servo_trim[2] = 95.0;
        let platform = StewartPlatform::new(config);
        let outcome = solve_home(&platform);

        let s = &outcome.solutions[2];
        assert!(s.flags.contains(SolutionFlags::LIMITED));
        assert!(s.flags.contains(SolutionFlags::TRIM));
        assert_eq!(s.angle, 85.0);
        assert!((s.actual - 95.0).abs() < 1e-6);

        // The untouched servos stay clean.
        for (i, s) in outcome.solutions.iter().enumerate() {
            if i != 2 {
                assert_eq!(s.flags, SolutionFlags::empty(), "servo {i}");
            }
        }
    }

    #[test]
    fn in_range_trim_shifts_angle_without_flags() {
        let mut config = PlatformConfig::symmetric(1.5, 2.0, 4.0, 0.6);
        config.servo_trim[4] = 3.25;
        let platform = StewartPlatform::new(config);
        let outcome = solve_home(&platform);

        let s = &outcome.solutions[4];
        assert_eq!(s.flags, SolutionFlags::empty());
        assert!((s.angle - 3.25).abs() < 1e-6);
        assert_eq!(s.angle, s.actual);
    }

    #[test]
    fn set_trim_ignores_out_of_range_channel() {
        let mut platform = StewartPlatform::new(PlatformConfig::reference());
        platform.set_trim(2, 5.0);
        platform.set_trim(6, 99.0);
        assert_eq!(platform.config().servo_trim[2], 5.0);
        assert_eq!(platform.config().servo_trim, [0.0, 0.0, 5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn elapsed_is_monotonic() {
        let platform = StewartPlatform::new(PlatformConfig::reference());
        let a = platform.elapsed();
        let b = platform.elapsed();
        assert!(b >= a);
    }

    #[test]
    fn rotation_matrix_is_reported_with_the_outcome() {
        let platform = StewartPlatform::new(PlatformConfig::reference());
        let outcome = solve_home(&platform);
        assert!((outcome.rotation - Matrix3::identity()).norm() < TOLERANCE);

        let pose = PoseTransform::AxisAngle {
            axis: Vector3::zeros(),
            angle: 45.0,
            translate: Vector3::zeros(),
        };
        let outcome = platform.solve(&Vector3::zeros(), &pose);
        assert_eq!(outcome.rotation, Matrix3::zeros());
    }
}
