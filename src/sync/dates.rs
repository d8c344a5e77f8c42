// SPDX-License-Identifier: MIT
//! Date transformation for CRM time fields.
//!
//! Scheduling dates are shifted by one day and localized to a fixed
//! time zone before being written. This is a historical quirk the org's
//! reports depend on; it is preserved deliberately, not an off-by-one.

use chrono::{Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;

/// The fixed zone all written timestamps are localized to.
pub const SYNC_TZ: Tz = chrono_tz::America::New_York;

/// Shift a scheduling date by one day, pin it to midnight in [`SYNC_TZ`],
/// and render it as a Salesforce datetime literal.
///
/// Pure and deterministic: the same input date always yields the same
/// output string.
pub fn crm_timestamp(date: NaiveDate) -> String {
    let shifted = date + Duration::days(1);
    // Midnight always exists in America/New_York (DST shifts at 02:00),
    // so the local result is unambiguous.
    let local = SYNC_TZ
        .from_local_datetime(&shifted.and_hms_opt(0, 0, 0).expect("midnight"))
        .earliest()
        .expect("midnight exists in SYNC_TZ");
    local.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn shifts_one_day_and_localizes() {
        // Winter: EST, UTC-5.
        assert_eq!(crm_timestamp(d(2026, 3, 2)), "2026-03-03T00:00:00.000-0500");
        // Summer: EDT, UTC-4.
        assert_eq!(crm_timestamp(d(2026, 7, 1)), "2026-07-02T00:00:00.000-0400");
    }

    #[test]
    fn transformation_is_deterministic() {
        let input = d(2026, 3, 2);
        assert_eq!(crm_timestamp(input), crm_timestamp(input));
    }

    #[test]
    fn month_rollover() {
        assert_eq!(crm_timestamp(d(2026, 1, 31)), "2026-02-01T00:00:00.000-0500");
    }
}
