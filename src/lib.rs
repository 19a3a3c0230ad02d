//! Inverse kinematics and network control for 6-DOF Stewart platforms
//! driven by six rotary servos.
//!
//! A Stewart platform is a parallel mechanism: six independently actuated
//! arm-and-rod linkages connect a fixed base to a movable top plate. Given a
//! desired pose of the top plate — a rotation (yaw/pitch/roll or
//! axis-angle) plus a translation — the solver computes the angle each
//! servo must take, classifying every actuator as solvable, limited by its
//! physical range, or geometrically impossible (in which case a best-effort
//! angle is still produced so the actuator does not stall).
//!
//! On top of the solver sits a small single-threaded control server: a
//! poll(2)-driven loop that serves up to ten concurrent clients speaking a
//! fixed-size binary protocol, funnels their pose requests into one
//! authoritative platform state, and paces hardware actuation to the PWM
//! refresh rate.
//!
//! # Quick start
//!
//! ```
//! use nalgebra::Vector3;
//! use rs_stewart_kinematics::kinematic_traits::InverseKinematics;
//! use rs_stewart_kinematics::kinematics_impl::StewartPlatform;
//! use rs_stewart_kinematics::parameters::PlatformConfig;
//! use rs_stewart_kinematics::transform::PoseTransform;
//!
//! let platform = StewartPlatform::new(PlatformConfig::reference());
//! let pose = PoseTransform::Euclidean {
//!     yaw: 5.0, pitch: 0.0, roll: 2.5,
//!     translate: Vector3::new(0.0, 0.0, 0.25),
//! };
//! let outcome = platform.solve(&Vector3::zeros(), &pose);
//! for (i, solution) in outcome.solutions.iter().enumerate() {
//!     println!("servo {i}: {:.2} deg", solution.angle);
//! }
//! ```
//!
//! The server binary (`stewartd`) wires the solver to a TCP listener and a
//! PWM driver; see the `server` module for the protocol loop and
//! `protocol` for the wire format.

pub mod parameters;

pub mod transform;

pub mod kinematic_traits;
pub mod kinematics_impl;

pub mod utils;

pub mod protocol;
pub mod server;

pub mod servo_driver;
pub mod trim_store;
