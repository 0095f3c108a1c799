// libs/scheduling-cell/src/services/booking.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, ConflictReason, SchedulingError,
};
use crate::services::conflict::ConflictDetectionService;

/// Books, reschedules and transitions appointments. The conflict check runs
/// again inside every write path; the persistence layer's uniqueness
/// constraint on (practitioner, start) is the final arbiter when two callers
/// race for the same slot.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    slot_duration: Duration,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflict_service =
            ConflictDetectionService::new(Arc::clone(&supabase), config.slot_duration());

        Self {
            supabase,
            conflict_service,
            slot_duration: config.slot_duration(),
        }
    }

    /// Book a new appointment.
    ///
    /// Losing the insert race surfaces as `Conflict(SlotTaken)`, the same
    /// user-actionable outcome as a failed conflict check, never a crash.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!(
            "Booking appointment for patient {} with practitioner {}",
            request.patient_id, request.practitioner_id
        );

        let starts_at = request.starts_at;
        let ends_at = request.ends_at.unwrap_or(starts_at + self.slot_duration);
        if ends_at <= starts_at {
            return Err(SchedulingError::InvalidTimeRange(
                "start time must be before end time".to_string(),
            ));
        }

        if !self.practitioner_exists(request.practitioner_id, auth_token).await? {
            return Err(SchedulingError::PractitionerNotFound);
        }

        let check = self
            .conflict_service
            .check_conflicts(request.practitioner_id, starts_at, ends_at, None, now, auth_token)
            .await?;
        if let Some(reason) = check.reason {
            return Err(SchedulingError::Conflict(reason));
        }

        let appointment_data = json!({
            "practitioner_id": request.practitioner_id,
            "patient_id": request.patient_id,
            "starts_at": starts_at.to_rfc3339(),
            "ends_at": ends_at.to_rfc3339(),
            "status": AppointmentStatus::Scheduled,
            "is_follow_up": request.is_follow_up,
            "symptoms": request.symptoms,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let appointment = self
            .insert_appointment(request.practitioner_id, starts_at, appointment_data, auth_token)
            .await?;

        debug!("Appointment booked with ID {}", appointment.id);
        Ok(appointment)
    }

    /// Move an existing appointment to a new time. The appointment's own row
    /// is excluded from the conflict comparison set.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Rescheduling appointment {} to {}", appointment_id, new_start);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        let new_end = new_end.unwrap_or(new_start + self.slot_duration);
        if new_end <= new_start {
            return Err(SchedulingError::InvalidTimeRange(
                "start time must be before end time".to_string(),
            ));
        }

        let check = self
            .conflict_service
            .check_conflicts(
                current.practitioner_id,
                new_start,
                new_end,
                Some(appointment_id),
                now,
                auth_token,
            )
            .await?;
        if let Some(reason) = check.reason {
            return Err(SchedulingError::Conflict(reason));
        }

        let update_data = json!({
            "starts_at": new_start.to_rfc3339(),
            "ends_at": new_end.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        self.patch_appointment(appointment_id, current.practitioner_id, new_start, update_data, auth_token)
            .await
    }

    /// Apply a status transition, rejecting moves the lifecycle does not
    /// allow. Cancellation is a transition, never a delete.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Updating appointment {} status to {}", appointment_id, new_status);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        if !current.status.can_transition_to(new_status) {
            return Err(SchedulingError::InvalidStatusTransition {
                from: current.status,
                to: new_status,
            });
        }

        let update_data = json!({
            "status": new_status,
            "updated_at": now.to_rfc3339()
        });

        self.patch_appointment(appointment_id, current.practitioner_id, current.starts_at, update_data, auth_token)
            .await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        self.update_status(appointment_id, AppointmentStatus::Cancelled, now, auth_token).await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        self.update_status(appointment_id, AppointmentStatus::Completed, now, auth_token).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> =
            self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter().next().ok_or(SchedulingError::AppointmentNotFound)
    }

    // Private helpers

    async fn insert_appointment(
        &self,
        practitioner_id: Uuid,
        starts_at: DateTime<Utc>,
        appointment_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<Appointment> = match self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
        {
            Ok(rows) => rows,
            Err(DbError::Conflict(_)) => {
                warn!(
                    "Slot at {} for practitioner {} was taken by a concurrent booking",
                    starts_at, practitioner_id
                );
                return Err(SchedulingError::Conflict(ConflictReason::SlotTaken));
            }
            Err(e) => return Err(e.into()),
        };

        rows.into_iter().next().ok_or_else(|| {
            SchedulingError::Database(DbError::Decode(
                "insert returned no representation".to_string(),
            ))
        })
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        practitioner_id: Uuid,
        starts_at: DateTime<Utc>,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<Appointment> = match self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update_data), Some(headers))
            .await
        {
            Ok(rows) => rows,
            Err(DbError::Conflict(_)) => {
                // The uniqueness constraint can also fire on a reschedule
                warn!(
                    "Slot at {} for practitioner {} was taken by a concurrent booking",
                    starts_at, practitioner_id
                );
                return Err(SchedulingError::Conflict(ConflictReason::SlotTaken));
            }
            Err(e) => return Err(e.into()),
        };

        rows.into_iter().next().ok_or(SchedulingError::AppointmentNotFound)
    }

    async fn practitioner_exists(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, SchedulingError> {
        let path = format!("/rest/v1/practitioners?id=eq.{}&select=id", practitioner_id);
        let rows: Vec<Value> =
            self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        Ok(!rows.is_empty())
    }
}
