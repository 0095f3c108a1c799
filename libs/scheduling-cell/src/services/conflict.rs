// libs/scheduling-cell/src/services/conflict.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    ConflictCheck, ConflictReason, OccupiedPeriod, ScheduleException, SchedulingError,
    TimeInterval,
};

/// Validates a candidate appointment interval against everything that could
/// occupy the practitioner's time. The same rules filter slot generation, so
/// a slot reported free always passes this check at the instant it was
/// computed; a concurrent booking in between is resolved at insert time.
pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
    slot_duration: Duration,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>, slot_duration: Duration) -> Self {
        Self { supabase, slot_duration }
    }

    /// Ordered checks; the first hit decides the outcome:
    /// another occupying appointment, then a blocking exception, then a
    /// start in the past. `exclude_appointment_id` keeps an appointment
    /// being edited from conflicting with its own row.
    pub async fn check_conflicts(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<ConflictCheck, SchedulingError> {
        debug!(
            "Checking conflicts for practitioner {} from {} to {}",
            practitioner_id, start, end
        );

        let candidate = TimeInterval::new(start, end);

        let occupied = self
            .get_occupying_periods(practitioner_id, start, end, exclude_appointment_id, auth_token)
            .await?;
        if occupied
            .iter()
            .any(|period| candidate.overlaps(&period.interval(self.slot_duration)))
        {
            warn!(
                "Conflict for practitioner {}: overlapping appointment at {}",
                practitioner_id, start
            );
            return Ok(ConflictCheck::because(ConflictReason::AppointmentOverlap));
        }

        let blocks = self.get_blocking_exceptions(practitioner_id, start, end, auth_token).await?;
        if blocks
            .iter()
            .any(|block| candidate.overlaps(&TimeInterval::new(block.starts_at, block.ends_at)))
        {
            warn!(
                "Conflict for practitioner {}: interval falls in a blocked period",
                practitioner_id
            );
            return Ok(ConflictCheck::because(ConflictReason::BlockedByException));
        }

        if start < now {
            return Ok(ConflictCheck::because(ConflictReason::StartInPast));
        }

        Ok(ConflictCheck::clear())
    }

    /// Boolean facade over [`check_conflicts`](Self::check_conflicts).
    pub async fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<bool, SchedulingError> {
        let check = self
            .check_conflicts(practitioner_id, start, end, exclude_appointment_id, now, auth_token)
            .await?;
        Ok(check.has_conflict)
    }

    // Private data access

    async fn get_occupying_periods(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<OccupiedPeriod>, SchedulingError> {
        let mut query_parts = vec![
            format!("practitioner_id=eq.{}", practitioner_id),
            "status=in.(scheduled,confirmed)".to_string(),
            format!("starts_at=lt.{}", end.to_rfc3339()),
            format!("or=(ends_at.gt.{},ends_at.is.null)", start.to_rfc3339()),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&select=starts_at,ends_at&order=starts_at.asc",
            query_parts.join("&")
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }

    async fn get_blocking_exceptions(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleException>, SchedulingError> {
        let path = format!(
            "/rest/v1/schedule_exceptions?practitioner_id=eq.{}&is_blocking=eq.true&starts_at=lt.{}&ends_at=gt.{}",
            practitioner_id,
            end.to_rfc3339(),
            start.to_rfc3339()
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }
}
