// libs/scheduling-cell/src/services/calendar.rs

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Map a calendar date to the stored weekday convention
/// (0 = Sunday, 1 = Monday, ..., 6 = Saturday).
pub fn weekday_index(date: NaiveDate) -> i16 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Calendar date of an instant as seen from the clinic timezone.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Anchor a wall-clock time on a date in the clinic timezone.
///
/// Returns `None` when the local time does not exist on that date (DST gap);
/// an ambiguous local time resolves to its earlier occurrence.
pub fn clinic_datetime(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// First slot boundary at or after `instant`.
///
/// Boundaries are aligned to `slot_duration` from the top of the hour in the
/// clinic timezone (30-minute slots sit on :00 and :30); an off-boundary
/// instant rounds forward.
pub fn next_slot_boundary(instant: DateTime<Utc>, tz: Tz, slot_duration: Duration) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz);
    let slot_minutes = slot_duration.num_minutes().max(1);
    let floored_minute = (i64::from(local.minute()) / slot_minutes) * slot_minutes;

    let floored = local
        .with_minute(floored_minute as u32)
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0));

    // Flooring can only fail around a DST transition; keep the raw instant
    // as the boundary in that case.
    let Some(floored) = floored else {
        return instant;
    };

    let floored = floored.with_timezone(&Utc);
    if floored < instant {
        floored + slot_duration
    } else {
        floored
    }
}
