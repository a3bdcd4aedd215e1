//! Time encoding and row-key construction.
//!
//! The hourly shard's column name is a 64-bit integer of picoseconds since the start of its hour.
//! `60 * 60 * 10^12 < 2^63`, so it always fits in a signed 64-bit value. Picking a sub-hour
//! integer as the column name lets a range scan within one hour be a backend column slice with
//! exact `col_start`/`col_finish` bounds; an optional sub-microsecond jitter resolves same-
//! microsecond write collisions without widening the timestamp.

use chrono::{DateTime, Timelike, Utc};

/// Picoseconds in a microsecond, and the jitter ceiling (strictly below one microsecond of
/// precision, so reconstruction on read rounds it away).
const JITTER_CEILING: i64 = 1_000_000;
const PICOS_PER_MICRO: i64 = 1_000_000;

/// Zeroes minutes, seconds and microseconds, preserving year/month/day/hour in UTC.
pub fn floor_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(t.hour(), 0, 0)
        .expect("hour is always in 0..24")
        .and_utc()
}

/// `((minute*60 + second) * 10^6 + microsecond) * 10^6` picoseconds since the start of the hour.
pub fn picoseconds_since_hour(t: DateTime<Utc>) -> i64 {
    let minute = t.minute() as i64;
    let second = t.second() as i64;
    let micro = (t.nanosecond() / 1_000) as i64;
    ((minute * 60 + second) * 1_000_000 + micro) * 1_000_000
}

/// The hourly shard's high-resolution column name.
///
/// Pass `None` (used for read bounds) to get exactly [`picoseconds_since_hour`]. Pass
/// `Some(jitter)` (used on write, with `jitter` drawn by [`draw_jitter`]) to perturb it so that
/// two samples landing on the same microsecond don't collide on the same column.
pub fn high_res_column(t: DateTime<Utc>, jitter: Option<i64>) -> i64 {
    picoseconds_since_hour(t) + jitter.unwrap_or(0)
}

/// Draws the jitter used by [`high_res_column`]: `[1, 10^6)`, strictly below one microsecond of
/// precision so [`reconstruct`] always rounds it away.
pub fn draw_jitter(rng: &mut impl rand::Rng) -> i64 {
    rng.random_range(1..JITTER_CEILING)
}

/// Recovers the original timestamp (to microsecond precision) from a shard's hour start and one
/// of its high-resolution column values.
pub fn reconstruct(hour_start: DateTime<Utc>, highres: i64) -> DateTime<Utc> {
    hour_start + chrono::Duration::microseconds(highres / PICOS_PER_MICRO)
}

/// `source_id "-" data_name "-" YYYYMMDDHH` (UTC).
pub fn hourly_row_key(source_id: &str, data_name: &str, t_utc: DateTime<Utc>) -> String {
    format!("{source_id}-{data_name}-{}", t_utc.format("%Y%m%d%H"))
}

/// Parses the trailing `YYYYMMDDHH` UTC hour out of an hourly row key, for stitching range reads
/// back into absolute timestamps without re-deriving it from the query's own clock.
pub fn parse_hourly_suffix(row_key: &str) -> Option<DateTime<Utc>> {
    let suffix = row_key.rsplit('-').next()?;
    if suffix.len() != 10 {
        return None;
    }
    let (date_part, hour_part) = suffix.split_at(8);
    let date = chrono::NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?;
    let hour: u32 = hour_part.parse().ok()?;
    Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
}

/// `source_id "-" data_name "-" unix_millis_utc`.
pub fn blob_row_key(source_id: &str, data_name: &str, t_utc: DateTime<Utc>) -> String {
    format!("{source_id}-{data_name}-{}", unix_millis(t_utc))
}

/// `source_id "-" data_name "-" normalized_substring`.
pub fn index_row_key(source_id: &str, data_name: &str, normalized_substring: &str) -> String {
    format!("{source_id}-{data_name}-{normalized_substring}")
}

/// Integer milliseconds since the Unix epoch.
pub fn unix_millis(t_utc: DateTime<Utc>) -> i64 {
    t_utc.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::SmallRng, SeedableRng};

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, micro: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_nanosecond(micro * 1_000)
            .unwrap()
    }

    #[test]
    fn floor_preserves_hour() {
        let t = dt(2012, 1, 1, 10, 42, 17, 123);
        assert_eq!(floor_to_hour(t), dt(2012, 1, 1, 10, 0, 0, 0));
    }

    #[test]
    fn reconstruct_round_trips_exact_columns() {
        for (h, m, s, micro) in [(0, 0, 0, 0), (23, 59, 59, 999_999), (10, 30, 15, 500_000)] {
            let t = dt(2012, 1, 1, h, m, s, micro);
            let hour_start = floor_to_hour(t);
            let col = high_res_column(t, None);
            assert_eq!(reconstruct(hour_start, col), t);
        }
    }

    #[test]
    fn jitter_rounds_away_on_read() {
        let t = dt(2012, 1, 1, 10, 30, 15, 500_000);
        let base = picoseconds_since_hour(t);
        for r in [1_i64, 500_000, 999_999] {
            let jittered = base + r;
            assert!((1..JITTER_CEILING).contains(&(jittered - base)));
            assert_eq!((jittered / 1_000_000) * 1_000_000, base);
        }
    }

    #[test]
    fn draw_jitter_stays_below_one_microsecond() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let r = draw_jitter(&mut rng);
            assert!((1..JITTER_CEILING).contains(&r));
        }
    }

    #[test]
    fn row_keys_are_canonical() {
        let t = dt(1980, 1, 1, 3, 0, 0, 0);
        assert_eq!(
            hourly_row_key("unittest1", "ramp_height", t),
            "unittest1-ramp_height-1980010103"
        );
        assert_eq!(parse_hourly_suffix("unittest1-ramp_height-1980010103"), Some(t));
        assert_eq!(
            index_row_key("src", "dn", "sea"),
            "src-dn-sea"
        );
    }

    #[test]
    fn unix_millis_matches_epoch() {
        assert_eq!(unix_millis(Utc.timestamp_opt(0, 0).unwrap()), 0);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        prop_compose! {
            fn any_instant_in_an_hour()(
                minute in 0u32..60,
                second in 0u32..60,
                micro in 0u32..1_000_000,
            ) -> DateTime<Utc> {
                dt(2012, 1, 1, 10, minute, second, micro)
            }
        }

        proptest! {
            #[test]
            fn exact_columns_always_round_trip(t in any_instant_in_an_hour()) {
                let hour_start = floor_to_hour(t);
                let col = high_res_column(t, None);
                prop_assert_eq!(reconstruct(hour_start, col), t);
            }

            #[test]
            fn jittered_columns_always_round_trip(t in any_instant_in_an_hour(), seed in any::<u64>()) {
                use rand::{rngs::SmallRng, SeedableRng};
                let mut rng = SmallRng::seed_from_u64(seed);
                let hour_start = floor_to_hour(t);
                let jitter = draw_jitter(&mut rng);
                let col = high_res_column(t, Some(jitter));
                prop_assert_eq!(reconstruct(hour_start, col), t);
            }
        }
    }
}
