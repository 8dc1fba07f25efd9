use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Instant at which a contract expiring on `expiry` stops trading.
pub(crate) fn expiry_instant(expiry: NaiveDate, expiry_hour_utc: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(expiry_hour_utc.min(23), 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&expiry.and_time(time))
}

/// Year fraction between `now` and the expiry instant; negative once expired.
pub(crate) fn year_fraction(
    expiry: NaiveDate,
    expiry_hour_utc: u32,
    day_count: f64,
    now: DateTime<Utc>,
) -> f64 {
    let remaining = expiry_instant(expiry, expiry_hour_utc) - now;
    remaining.num_milliseconds() as f64 / MILLIS_PER_DAY / day_count
}
