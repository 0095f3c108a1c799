// libs/scheduling-cell/src/services/availability.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    OccupiedPeriod, RecurringSchedule, ScheduleException, SchedulingError, TimeInterval,
};
use crate::services::calendar::{clinic_datetime, local_date, next_slot_boundary, weekday_index};

/// Free bookable slot starts per calendar date; dates without any free slot
/// are absent from the map.
pub type AvailableSlots = BTreeMap<NaiveDate, Vec<DateTime<Utc>>>;

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    timezone: Tz,
    slot_duration: Duration,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            timezone: config.clinic_timezone,
            slot_duration: config.slot_duration(),
        }
    }

    /// Compute every free slot for a practitioner over the next
    /// `horizon_days` days, starting from the clinic-local date of `now`.
    ///
    /// An unknown practitioner yields an empty map rather than an error, so
    /// stale references from a calendar UI degrade to "no availability".
    pub async fn compute_available_slots(
        &self,
        practitioner_id: Uuid,
        horizon_days: i64,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AvailableSlots, SchedulingError> {
        debug!(
            "Computing available slots for practitioner {} over {} days",
            practitioner_id, horizon_days
        );

        if !self.practitioner_exists(practitioner_id, auth_token).await? {
            debug!("Practitioner {} not found, returning no availability", practitioner_id);
            return Ok(AvailableSlots::new());
        }

        let today = local_date(now, self.timezone);

        // Fetch bounds for the whole horizon. Midnight can be skipped by a
        // DST jump; the raw instant is a good enough bound then.
        let period_start =
            clinic_datetime(self.timezone, today, NaiveTime::MIN).unwrap_or(now);
        let period_end =
            clinic_datetime(self.timezone, today + Duration::days(horizon_days), NaiveTime::MIN)
                .unwrap_or(now + Duration::days(horizon_days));

        let schedules = self.get_recurring_schedules(practitioner_id, auth_token).await?;
        let exceptions = self
            .get_exceptions(practitioner_id, period_start, period_end, auth_token)
            .await?;
        let occupied = self
            .get_occupied_periods(practitioner_id, period_start, period_end, auth_token)
            .await?;

        // Busy set for the whole horizon: blocking exceptions plus occupying
        // appointments. Candidates are tested pairwise against every entry.
        let mut busy: Vec<TimeInterval> = exceptions
            .iter()
            .filter(|exception| exception.is_blocking)
            .map(|exception| TimeInterval::new(exception.starts_at, exception.ends_at))
            .collect();
        busy.extend(occupied.iter().map(|period| period.interval(self.slot_duration)));

        let mut slots_by_day = AvailableSlots::new();

        for offset in 0..horizon_days {
            let date = today + Duration::days(offset);
            let windows = self.working_windows_for_day(date, &schedules, &exceptions);
            if windows.is_empty() {
                continue;
            }

            // Ordered set: overlapping windows may reach the same instant,
            // which must appear once in the day's list.
            let mut day_slots: BTreeSet<DateTime<Utc>> = BTreeSet::new();

            for window in windows {
                let mut slot_start = window.start;
                if date == today && slot_start < now {
                    slot_start =
                        slot_start.max(next_slot_boundary(now, self.timezone, self.slot_duration));
                }

                while slot_start + self.slot_duration <= window.end {
                    let candidate =
                        TimeInterval::new(slot_start, slot_start + self.slot_duration);
                    if !busy.iter().any(|interval| candidate.overlaps(interval)) {
                        day_slots.insert(slot_start);
                    }
                    slot_start += self.slot_duration;
                }
            }

            if !day_slots.is_empty() {
                slots_by_day.insert(date, day_slots.into_iter().collect());
            }
        }

        debug!(
            "Found free slots on {} of {} days for practitioner {}",
            slots_by_day.len(),
            horizon_days,
            practitioner_id
        );
        Ok(slots_by_day)
    }

    /// Working windows applicable on one day: recurring entries for that
    /// weekday anchored on the date, plus extra-availability exceptions whose
    /// local date range touches it. Exceptions pass through with their raw
    /// interval, unclipped. Windows are sorted ascending and not merged.
    fn working_windows_for_day(
        &self,
        date: NaiveDate,
        schedules: &[RecurringSchedule],
        exceptions: &[ScheduleException],
    ) -> Vec<TimeInterval> {
        let weekday = weekday_index(date);
        let mut windows = Vec::new();

        for schedule in schedules.iter().filter(|schedule| schedule.weekday == weekday) {
            // Inverted rows are dead data; a DST gap makes the window
            // unanchorable for this date. Both are skipped silently.
            if !schedule.is_well_formed() {
                continue;
            }
            let start = clinic_datetime(self.timezone, date, schedule.start_time);
            let end = clinic_datetime(self.timezone, date, schedule.end_time);
            if let (Some(start), Some(end)) = (start, end) {
                if start < end {
                    windows.push(TimeInterval::new(start, end));
                }
            }
        }

        for exception in exceptions.iter().filter(|exception| !exception.is_blocking) {
            if exception.ends_at <= exception.starts_at {
                continue;
            }
            let first_day = local_date(exception.starts_at, self.timezone);
            let last_day = local_date(exception.ends_at, self.timezone);
            if first_day <= date && date <= last_day {
                windows.push(TimeInterval::new(exception.starts_at, exception.ends_at));
            }
        }

        windows.sort_by_key(|window| window.start);
        windows
    }

    // Private data access

    async fn practitioner_exists(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, SchedulingError> {
        let path = format!("/rest/v1/practitioners?id=eq.{}&select=id", practitioner_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        Ok(!rows.is_empty())
    }

    async fn get_recurring_schedules(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<RecurringSchedule>, SchedulingError> {
        let path = format!(
            "/rest/v1/recurring_schedules?practitioner_id=eq.{}&order=weekday.asc,start_time.asc",
            practitioner_id
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }

    async fn get_exceptions(
        &self,
        practitioner_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleException>, SchedulingError> {
        let path = format!(
            "/rest/v1/schedule_exceptions?practitioner_id=eq.{}&starts_at=lt.{}&ends_at=gt.{}&order=starts_at.asc",
            practitioner_id,
            range_end.to_rfc3339(),
            range_start.to_rfc3339()
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }

    async fn get_occupied_periods(
        &self,
        practitioner_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<OccupiedPeriod>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&status=in.(scheduled,confirmed)&starts_at=lt.{}&or=(ends_at.gt.{},ends_at.is.null)&select=starts_at,ends_at&order=starts_at.asc",
            practitioner_id,
            range_end.to_rfc3339(),
            range_start.to_rfc3339()
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }
}
