//! Narrative phase scheduling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of the run spent establishing the story.
const BEGINNING_FRACTION: f64 = 0.25;

/// Fraction of the run after which the story starts resolving.
const END_FRACTION: f64 = 0.9;

/// Coarse narrative stage, derived from how far through the run we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Beginning,
    Middle,
    End,
}

impl Phase {
    /// What each new passage should leave the reader with.
    pub fn ending_hint(self) -> &'static str {
        match self {
            Phase::Beginning => "an intriguing moment",
            Phase::Middle => "an insight into what might unfold",
            Phase::End => "a resolution with a lingering question",
        }
    }

    /// Tone steering for the phase.
    pub fn instructions(self) -> &'static str {
        match self {
            Phase::Beginning => {
                "Establish characters and setting subtly. End with a captivating moment."
            }
            Phase::Middle => {
                "Develop the plot and raise stakes without giving everything away. End with an uneasy anticipation."
            }
            Phase::End => {
                "Subtly wrap up the narrative while leaving thematic elements open to interpretation."
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Beginning => "beginning",
            Phase::Middle => "middle",
            Phase::End => "end",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Phase for iteration `position` of a run with `total` iterations.
pub fn phase_of(position: usize, total: usize) -> Phase {
    let position = position as f64;
    let total = total as f64;

    if position < total * BEGINNING_FRACTION {
        Phase::Beginning
    } else if position < total * END_FRACTION {
        Phase::Middle
    } else {
        Phase::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries_for_hundred() {
        assert_eq!(phase_of(0, 100), Phase::Beginning);
        assert_eq!(phase_of(24, 100), Phase::Beginning);
        assert_eq!(phase_of(25, 100), Phase::Middle);
        assert_eq!(phase_of(89, 100), Phase::Middle);
        assert_eq!(phase_of(90, 100), Phase::End);
        assert_eq!(phase_of(99, 100), Phase::End);
    }

    #[test]
    fn test_default_run_length() {
        // 333 * 0.25 = 83.25, 333 * 0.9 = 299.7
        assert_eq!(phase_of(83, 333), Phase::Beginning);
        assert_eq!(phase_of(84, 333), Phase::Middle);
        assert_eq!(phase_of(299, 333), Phase::Middle);
        assert_eq!(phase_of(300, 333), Phase::End);
    }

    #[test]
    fn test_single_iteration_run_begins() {
        assert_eq!(phase_of(0, 1), Phase::Beginning);
    }

    #[test]
    fn test_zero_total_is_end() {
        assert_eq!(phase_of(0, 0), Phase::End);
    }

    #[test]
    fn test_strings_are_distinct() {
        let phases = [Phase::Beginning, Phase::Middle, Phase::End];
        for (i, a) in phases.iter().enumerate() {
            for b in &phases[i + 1..] {
                assert_ne!(a.ending_hint(), b.ending_hint());
                assert_ne!(a.instructions(), b.instructions());
            }
        }
        assert_eq!(Phase::Middle.to_string(), "middle");
    }

    proptest! {
        #[test]
        fn prop_start_is_beginning(total in 1usize..10_000) {
            prop_assert_eq!(phase_of(0, total), Phase::Beginning);
        }

        #[test]
        fn prop_tail_is_end(total in 1usize..10_000, extra in 0usize..100) {
            let start = (total as f64 * 0.9).ceil() as usize;
            prop_assert_eq!(phase_of(start + extra, total), Phase::End);
        }

        #[test]
        fn prop_monotonic(total in 1usize..2_000, a in 0usize..2_000, b in 0usize..2_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!((phase_of(lo, total) as u8) <= (phase_of(hi, total) as u8));
        }
    }
}
