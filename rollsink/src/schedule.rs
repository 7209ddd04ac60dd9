//! Rollover and flush time arithmetic.
//!
//! Rollover windows are aligned to whole multiples of the rollover interval
//! measured from the Unix epoch, so two destinations configured with the same
//! interval always agree on window boundaries regardless of when they started.
//! All arithmetic is done at millisecond resolution.
//!
//! ```text
//!   epoch        k*I          (k+1)*I        (k+2)*I
//!     |  ...  |------------|--------------|----
//!                   ^ now
//!              [ start      ) boundary
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

/// A rollover window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive start; the filename is resolved from this instant.
    pub start: DateTime<Utc>,
    /// Exclusive end; the session rolls over once `now >= end`.
    pub end: DateTime<Utc>,
}

impl Window {
    /// Returns the window of length `interval` that contains `now`.
    pub fn containing(now: DateTime<Utc>, interval: Duration) -> Self {
        let end = next_boundary(interval, now);
        Self {
            start: window_start(end, interval),
            end,
        }
    }
}

/// Returns the smallest instant strictly greater than `reference` that is a
/// whole multiple of `interval` since the epoch.
///
/// A zero interval is treated as one millisecond. Results beyond the
/// representable range saturate at the largest representable instant.
pub fn next_boundary(interval: Duration, reference: DateTime<Utc>) -> DateTime<Utc> {
    let interval_ms = interval_millis(interval);
    let reference_ms = reference.timestamp_millis();

    let boundary_ms = reference_ms
        .div_euclid(interval_ms)
        .checked_add(1)
        .and_then(|k| k.checked_mul(interval_ms));

    boundary_ms
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returns the start of the window that ends at `boundary`.
pub fn window_start(boundary: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    offset(boundary, -interval_millis(interval))
}

/// Returns the next flush deadline: `now + flush_interval`.
pub fn next_flush(now: DateTime<Utc>, flush_interval: Duration) -> DateTime<Utc> {
    offset(now, interval_millis(flush_interval))
}

/// Returns `since + cooldown`, the earliest instant a retry may happen.
pub(crate) fn retry_allowed_at(since: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    // A zero cooldown allows an immediate retry.
    if cooldown.is_zero() {
        return since;
    }
    offset(since, interval_millis(cooldown))
}

fn interval_millis(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn offset(instant: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
    instant
        .timestamp_millis()
        .checked_add(millis)
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(if millis < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_next_boundary_aligns_to_interval() {
        let day = Duration::from_secs(86_400);
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let boundary = next_boundary(day, noon);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_boundary_is_strictly_greater() {
        let minute = Duration::from_secs(60);

        // Exactly on a boundary moves to the next one.
        assert_eq!(next_boundary(minute, at(120)), at(180));
        assert_eq!(next_boundary(minute, at(0)), at(60));
        assert_eq!(next_boundary(minute, at(179)), at(180));
    }

    #[test]
    fn test_next_boundary_property_over_many_references() {
        for interval_secs in [1u64, 7, 60, 3_600, 86_400] {
            let interval = Duration::from_secs(interval_secs);
            let iv = i64::try_from(interval_secs).unwrap();
            for reference in (1_700_000_000i64..1_700_000_000 + 2 * iv).step_by(13) {
                let r = at(reference);
                let b = next_boundary(interval, r);
                let b_secs = b.timestamp();
                assert!(b > r, "boundary must be after reference");
                assert_eq!(b_secs % iv, 0, "boundary must be a multiple of the interval");
                assert!(b_secs - iv <= reference, "no smaller multiple may exceed the reference");
            }
        }
    }

    #[test]
    fn test_next_boundary_sub_second_reference() {
        let minute = Duration::from_secs(60);
        let r = DateTime::from_timestamp_millis(59_999).unwrap();
        assert_eq!(next_boundary(minute, r), at(60));
    }

    #[test]
    fn test_next_boundary_before_epoch() {
        let minute = Duration::from_secs(60);
        assert_eq!(next_boundary(minute, at(-30)), at(0));
    }

    #[test]
    fn test_window_start() {
        let hour = Duration::from_secs(3_600);
        assert_eq!(window_start(at(7_200), hour), at(3_600));
    }

    #[test]
    fn test_window_containing() {
        let hour = Duration::from_secs(3_600);
        let window = Window::containing(at(5_000), hour);
        assert_eq!(window.start, at(3_600));
        assert_eq!(window.end, at(7_200));

        let window = Window::containing(at(3_600), hour);
        assert_eq!(window.start, at(3_600));
    }

    #[test]
    fn test_next_flush() {
        assert_eq!(next_flush(at(100), Duration::from_secs(60)), at(160));
    }

    #[test]
    fn test_retry_allowed_at() {
        assert_eq!(retry_allowed_at(at(0), Duration::from_secs(60)), at(60));
        assert_eq!(retry_allowed_at(at(5), Duration::ZERO), at(5));
    }
}
