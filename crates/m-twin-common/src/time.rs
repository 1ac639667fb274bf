//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Shared primitives and utilities for the core runtime."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

/// Capture an instant suitable for scheduler comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Convert a duration into microseconds, saturating at `u64::MAX`.
pub fn duration_to_micros(duration: Duration) -> u64 {
    duration.as_secs().saturating_mul(1_000_000) + u64::from(duration.subsec_micros())
}

/// Deviation in milliseconds between the wall clock elapsed since `start`
/// and the time the tick counter accounts for at `interval` pacing.
/// Positive values mean the loop is running behind its schedule.
pub fn tick_drift_ms(start: Instant, interval: Duration, ticks: u64) -> i64 {
    let elapsed_ms = start.elapsed().as_secs_f64() * 1_000.0;
    let accounted_ms = interval.as_secs_f64() * 1_000.0 * ticks as f64;
    (elapsed_ms - accounted_ms).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_conversion_is_exact_for_small_durations() {
        assert_eq!(duration_to_micros(Duration::from_millis(2)), 2_000);
        assert_eq!(duration_to_micros(Duration::from_secs(1)), 1_000_000);
    }

    #[test]
    fn drift_is_negative_when_ticks_outrun_the_clock() {
        let start = Instant::now();
        let drift = tick_drift_ms(start, Duration::from_secs(10), 5);
        assert!(drift < 0);
    }
}
