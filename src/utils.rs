//! Helper functions

use crate::kinematic_traits::{SolutionFlags, Solutions};
use tracing::debug;

/// Human-readable label for a solution's status, matching the wording the
/// server prints while processing pose updates.
pub fn solution_label(flags: SolutionFlags) -> &'static str {
    if !flags.is_solution() {
        "IMPOSSIBLE"
    } else if flags.contains(SolutionFlags::LIMITED | SolutionFlags::TRIM) {
        "LIMITED TRIM"
    } else if flags.contains(SolutionFlags::LIMITED) {
        "LIMITED"
    } else {
        "SOLUTION"
    }
}

/// Log all six solved angles with their status labels.
pub fn dump_solutions(solutions: &Solutions) {
    for (i, s) in solutions.iter().enumerate() {
        debug!("servo {i}: {:6.2} deg [{}]", s.angle, solution_label(s.flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_all_classes() {
        assert_eq!(solution_label(SolutionFlags::empty()), "SOLUTION");
        assert_eq!(solution_label(SolutionFlags::LIMITED), "LIMITED");
        assert_eq!(
            solution_label(SolutionFlags::LIMITED | SolutionFlags::TRIM),
            "LIMITED TRIM"
        );
        assert_eq!(solution_label(SolutionFlags::IMPOSSIBLE), "IMPOSSIBLE");
        assert_eq!(
            solution_label(SolutionFlags::IMPOSSIBLE | SolutionFlags::LIMITED),
            "IMPOSSIBLE"
        );
    }
}
