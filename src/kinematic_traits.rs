//! Solver-facing types: per-actuator solutions, their status flags, and the
//! trait implemented by the platform solver.

use bitflags::bitflags;
use nalgebra::{Matrix3, Vector3};

use crate::transform::PoseTransform;

bitflags! {
    /// Classification of a solved actuator angle.
    ///
    /// An empty set means a clean solution. `IMPOSSIBLE` is the base class
    /// for geometrically unreachable targets; `LIMITED` and `TRIM` are
    /// independent qualifiers set by the clamping stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SolutionFlags: u32 {
        /// No physically possible solution; the reported angle is the
        /// closest direction, not an exact answer.
        const IMPOSSIBLE = 1;
        /// The angle was clamped to the servo's physical range.
        const LIMITED = 1 << 4;
        /// Trim pushed an otherwise in-range angle over a limit. Only ever
        /// set together with `LIMITED`.
        const TRIM = 1 << 5;
    }
}

impl SolutionFlags {
    /// True when the geometric solve itself succeeded (the angle may still
    /// have been clamped).
    pub fn is_solution(&self) -> bool {
        !self.contains(SolutionFlags::IMPOSSIBLE)
    }

    /// True when this actuator could not follow the request exactly.
    pub fn is_constrained(&self) -> bool {
        self.intersects(SolutionFlags::IMPOSSIBLE | SolutionFlags::LIMITED)
    }
}

/// Result for a single actuator.
///
/// `angle` is always within the configured servo range. `actual` records the
/// pre-clamp value and differs from `angle` only when `LIMITED` is set.
/// Both are in degrees, with rotation sense and trim already applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Solution {
    pub angle: f64,
    pub actual: f64,
    pub flags: SolutionFlags,
}

/// One solution per actuator, indexed by servo channel.
pub type Solutions = [Solution; 6];

/// Everything a solve produces: the six actuator solutions, the rotation
/// matrix that was applied (for status reporting), and how many actuators
/// ended up constrained.
#[derive(Debug, Clone, Copy)]
pub struct SolveOutcome {
    pub solutions: Solutions,
    pub rotation: Matrix3<f64>,
    pub constrained: usize,
}

/// The inverse-kinematics seam: a pose in, six actuator angles out.
pub trait InverseKinematics {
    /// Solves for all six actuator angles needed to put the platform in the
    /// pose described by `transform`, rotating around `origin`.
    ///
    /// Never fails: unreachable targets are reported per-actuator through
    /// [`SolutionFlags`] with a best-effort angle filled in.
    fn solve(&self, origin: &Vector3<f64>, transform: &PoseTransform) -> SolveOutcome;
}
