// src/doublet.rs - Mapping raw contour indices onto the 9-doublet ring

use crate::errors::{DyneinError, Result};

/// Number of doublet positions around the axoneme
pub const RING_SIZE: u8 = 9;

/// Rotational sense in which contours were traced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDirection {
    /// "c"
    Clockwise,
    /// Anything else, including "cc" and "undetermined"
    CounterClockwise,
}

impl ClockDirection {
    pub fn from_code(code: &str) -> Self {
        if code == "c" {
            ClockDirection::Clockwise
        } else {
            ClockDirection::CounterClockwise
        }
    }

    pub fn is_clockwise(self) -> bool {
        self == ClockDirection::Clockwise
    }
}

/// Reflection table for counter-clockwise tracing, indexed by `shifted + 7`
const COUNTER_CLOCKWISE_TABLE: [u8; 17] = [9, 8, 7, 6, 5, 4, 3, 2, 1, 9, 8, 7, 6, 5, 4, 3, 2];
const COUNTER_CLOCKWISE_MIN: i64 = -7;
const COUNTER_CLOCKWISE_MAX: i64 = 9;

/// Map a raw contour index to its canonical doublet number in 1..=9.
///
/// `first_doublet` is the contour that becomes doublet 1. Clockwise rings wrap
/// modulo 9; counter-clockwise rings are reflected through a fixed table whose
/// domain is a shifted value in [-7, 9]. Anything outside that domain is
/// malformed input and is reported as [`DyneinError::Domain`].
pub fn normalize(contour: i64, first_doublet: i64, clockwise: bool) -> Result<u8> {
    let shifted = contour + (1 - first_doublet);

    if clockwise {
        let ring = RING_SIZE as i64;
        return Ok(((shifted - 1).rem_euclid(ring) + 1) as u8);
    }

    if !(COUNTER_CLOCKWISE_MIN..=COUNTER_CLOCKWISE_MAX).contains(&shifted) {
        return Err(DyneinError::Domain(format!(
            "contour {} with first doublet {} shifts to {}, outside [{}, {}]",
            contour, first_doublet, shifted, COUNTER_CLOCKWISE_MIN, COUNTER_CLOCKWISE_MAX
        )));
    }

    Ok(COUNTER_CLOCKWISE_TABLE[(shifted - COUNTER_CLOCKWISE_MIN) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clockwise_with_first_doublet_one_wraps_mod_nine() {
        for c in -20..40 {
            let expected = ((c - 1_i64).rem_euclid(9) + 1) as u8;
            assert_eq!(normalize(c, 1, true).unwrap(), expected);
        }
    }

    #[test]
    fn clockwise_shift_moves_first_doublet_to_one() {
        assert_eq!(normalize(4, 4, true).unwrap(), 1);
        assert_eq!(normalize(3, 4, true).unwrap(), 9);
        assert_eq!(normalize(12, 4, true).unwrap(), 9);
    }

    #[test]
    fn counter_clockwise_matches_table() {
        assert_eq!(normalize(1, 1, false).unwrap(), 1);
        assert_eq!(normalize(2, 1, false).unwrap(), 9);
        assert_eq!(normalize(9, 1, false).unwrap(), 2);
        assert_eq!(normalize(0, 1, false).unwrap(), 2);
        assert_eq!(normalize(-7, 1, false).unwrap(), 9);
    }

    #[test]
    fn counter_clockwise_ring_is_a_bijection() {
        for first in 1..=9 {
            let mut seen: Vec<u8> = (1..=9)
                .map(|c| normalize(c, first, false).unwrap())
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (1..=9).collect::<Vec<u8>>());
        }
    }

    #[test]
    fn counter_clockwise_outside_domain_is_an_error() {
        assert!(matches!(normalize(10, 1, false), Err(DyneinError::Domain(_))));
        assert!(matches!(normalize(1, 10, false), Err(DyneinError::Domain(_))));
    }

    #[test]
    fn clock_direction_codes() {
        assert!(ClockDirection::from_code("c").is_clockwise());
        assert!(!ClockDirection::from_code("cc").is_clockwise());
        assert!(!ClockDirection::from_code("undetermined").is_clockwise());
    }
}
