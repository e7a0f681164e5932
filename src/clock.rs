//! Multiplier growth curve.
//!
//! The displayed multiplier is a pure function of elapsed round time,
//! so scheduler jitter between ticks can never desynchronize the value
//! from the fixed crash point: a late tick simply computes a later
//! point on the same curve.

use crate::round::Multiplier;
use std::time::Duration;

/// Displayed multiplier after `elapsed` of round time:
/// `floor(100 * e^(elapsed / tau)) / 100`, never below 1.00x.
pub fn multiplier_at(elapsed: Duration, tau: Duration) -> Multiplier {
    let x = elapsed.as_secs_f64() / tau.as_secs_f64();
    let hundredths = (100.0 * x.exp()).floor() as u64;
    Multiplier::from_hundredths(hundredths.max(100))
}

/// Elapsed time at which the curve first reaches `target`. Exact on the
/// continuous curve; callers probing the discrete (floored) value should
/// add a small epsilon.
pub fn time_to_reach(target: Multiplier, tau: Duration) -> Duration {
    if target <= Multiplier::ONE {
        return Duration::ZERO;
    }
    let x = (target.hundredths() as f64 / 100.0).ln();
    Duration::from_secs_f64(x * tau.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAU: Duration = Duration::from_millis(5_000);

    #[test]
    fn starts_at_one() {
        assert_eq!(multiplier_at(Duration::ZERO, TAU), Multiplier::ONE);
    }

    #[test]
    fn one_tau_is_e() {
        // floor(100 * e) = 271
        let m = multiplier_at(TAU, TAU);
        assert_eq!(m.hundredths(), 271);
    }

    #[test]
    fn is_monotonic() {
        let mut last = Multiplier::default();
        for ms in (0..20_000).step_by(100) {
            let m = multiplier_at(Duration::from_millis(ms), TAU);
            assert!(m >= last, "curve decreased at {}ms", ms);
            last = m;
        }
    }

    #[test]
    fn time_to_reach_inverts_the_curve() {
        for hundredths in [150u64, 198, 500, 1_000] {
            let target = Multiplier::from_hundredths(hundredths);
            let t = time_to_reach(target, TAU) + Duration::from_millis(1);
            let m = multiplier_at(t, TAU);
            assert!(m >= target);
            // One millisecond past the threshold must not overshoot a
            // whole display step on this curve.
            assert!(m.hundredths() <= hundredths + 1);
        }
    }
}
