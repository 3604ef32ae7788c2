//! Clocks and time conversion.
//!
//! Tick and cycle counters are monotonic and process-relative; calendar
//! conversions use the locale-free civil arithmetic in `keel-core`, with
//! only the local-timezone offset consulting the OS.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use keel_core::calendar::{CalendarTime, FileTime};

use crate::os;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

// ---------------------------------------------------------------------------
// Monotonic counters
// ---------------------------------------------------------------------------

/// Milliseconds since this module was first used in the process.
pub fn tick_count() -> u32 {
    process_epoch().elapsed().as_millis() as u32
}

/// High-resolution monotonic counter in [`cycle_frequency`] units.
pub fn cycle_count() -> u64 {
    process_epoch().elapsed().as_nanos() as u64
}

/// Counts per second of [`cycle_count`].
pub fn cycle_frequency() -> u64 {
    1_000_000_000
}

/// Elapsed milliseconds between two cycle counts.
pub fn elapsed_millis(first: u64, second: u64) -> f32 {
    let delta = second.abs_diff(first);
    (delta as f64 * 1000.0 / cycle_frequency() as f64) as f32
}

// ---------------------------------------------------------------------------
// Wall-clock time
// ---------------------------------------------------------------------------

fn now_epoch_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Seconds since the Unix epoch (UTC).
pub fn system_time() -> i64 {
    now_epoch_millis().div_euclid(1000)
}

/// Current UTC calendar time.
pub fn system_calendar_time() -> CalendarTime {
    CalendarTime::from_epoch_millis(now_epoch_millis())
}

/// UTC calendar time for an epoch-seconds value.
pub fn system_calendar_from_epoch(epoch_seconds: i64) -> CalendarTime {
    CalendarTime::from_epoch_millis(epoch_seconds * 1000)
}

/// Current local calendar time.
pub fn local_calendar_time() -> CalendarTime {
    let millis = now_epoch_millis();
    let offset = os::local_utc_offset_seconds(millis.div_euclid(1000));
    CalendarTime::from_epoch_millis(millis + offset * 1000)
}

/// Local calendar time for an epoch-seconds value.
pub fn local_calendar_from_epoch(epoch_seconds: i64) -> CalendarTime {
    let offset = os::local_utc_offset_seconds(epoch_seconds);
    CalendarTime::from_epoch_millis((epoch_seconds + offset) * 1000)
}

/// Seconds since the epoch for a UTC calendar time.
pub fn make_time(calendar: &CalendarTime) -> i64 {
    calendar.to_epoch_seconds()
}

/// Milliseconds since the epoch for a UTC calendar time.
pub fn make_time_millis(calendar: &CalendarTime) -> i64 {
    calendar.to_epoch_millis()
}

// ---------------------------------------------------------------------------
// FileTime bridging
// ---------------------------------------------------------------------------

/// Current wall-clock time as a [`FileTime`].
pub fn file_time_now() -> FileTime {
    FileTime::from_epoch_millis(now_epoch_millis())
}

pub(crate) fn file_time_from_system(time: SystemTime) -> FileTime {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    FileTime::from_epoch_millis(millis)
}

/// Converts a UTC calendar time to a file time (lossless to the
/// millisecond).
pub fn calendar_to_file_time(calendar: &CalendarTime) -> FileTime {
    FileTime::from_calendar(calendar)
}

/// Converts a file time to UTC calendar form.
pub fn file_time_to_calendar(file_time: FileTime) -> CalendarTime {
    file_time.to_calendar()
}

/// Re-expresses a UTC file time in the local timezone.
pub fn file_time_to_local(file_time: FileTime) -> FileTime {
    let millis = file_time.to_epoch_millis();
    let offset = os::local_utc_offset_seconds(millis.div_euclid(1000));
    FileTime::from_epoch_millis(millis + offset * 1000)
}

/// Inverse of [`file_time_to_local`].
pub fn local_file_time_to_utc(local: FileTime) -> FileTime {
    let millis = local.to_epoch_millis();
    // The offset at the local instant approximates the UTC instant's.
    let offset = os::local_utc_offset_seconds(millis.div_euclid(1000));
    FileTime::from_epoch_millis(millis - offset * 1000)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let t1 = tick_count();
        let c1 = cycle_count();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = tick_count();
        let c2 = cycle_count();
        assert!(t2 >= t1);
        assert!(c2 > c1);
        assert!(elapsed_millis(c1, c2) >= 9.0);
    }

    #[test]
    fn system_time_is_after_2020() {
        assert!(system_time() > 1_577_836_800); // 2020-01-01
        let cal = system_calendar_time();
        assert!(cal.year >= 2020);
        assert!(cal.is_plausible());
    }

    #[test]
    fn make_time_inverts_calendar_conversion() {
        let now = system_time();
        let cal = system_calendar_from_epoch(now);
        assert_eq!(make_time(&cal), now);
    }

    #[test]
    fn local_and_utc_differ_by_whole_minutes() {
        let now = system_time();
        let utc = system_calendar_from_epoch(now).to_epoch_seconds();
        let local = local_calendar_from_epoch(now).to_epoch_seconds();
        let offset = local - utc;
        assert_eq!(offset % 60, 0);
        assert!(offset.abs() <= 14 * 3600);
    }

    #[test]
    fn file_time_local_round_trip() {
        let now = file_time_now();
        let local = file_time_to_local(now);
        let back = local_file_time_to_utc(local);
        // Exact when no DST boundary falls between the two instants.
        let drift = back.to_epoch_millis() - now.to_epoch_millis();
        assert!(drift.abs() <= 3_600_000);
    }

    #[test]
    fn calendar_file_time_bridge_is_lossless() {
        let cal = CalendarTime {
            year: 2022,
            month: 11,
            day: 5,
            day_of_week: 6,
            hour: 23,
            minute: 59,
            second: 59,
            millisecond: 250,
        };
        let ft = calendar_to_file_time(&cal);
        let back = file_time_to_calendar(ft);
        assert_eq!(back.to_epoch_millis(), cal.to_epoch_millis());
    }
}
