// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_database::DbError;

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// One weekly-repeating block of working hours for a practitioner.
///
/// `weekday` follows the stored convention 0 = Sunday .. 6 = Saturday;
/// `start_time`/`end_time` are wall-clock times in the clinic timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl RecurringSchedule {
    /// Rows with an inverted range are dead data and never become windows.
    pub fn is_well_formed(&self) -> bool {
        self.start_time < self.end_time
    }
}

/// A one-off override of the recurring schedule: either a block (vacation,
/// sick leave) or a grant of extra availability outside the usual hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleException {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_blocking: bool,
    pub reason: String,
}

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status reserves the practitioner's time.
    pub fn is_occupying(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        match self {
            AppointmentStatus::Scheduled => matches!(
                next,
                AppointmentStatus::Confirmed | AppointmentStatus::Cancelled
            ),
            AppointmentStatus::Confirmed => matches!(
                next,
                AppointmentStatus::Completed | AppointmentStatus::Cancelled
            ),
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    /// Absent on legacy rows; the effective end defaults to one slot.
    pub ends_at: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_follow_up: bool,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn effective_end(&self, slot_duration: Duration) -> DateTime<Utc> {
        self.ends_at.unwrap_or(self.starts_at + slot_duration)
    }
}

/// Projection of an appointment down to the interval it occupies
/// (`select=starts_at,ends_at`), used for slot filtering and overlap tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupiedPeriod {
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl OccupiedPeriod {
    pub fn interval(&self, slot_duration: Duration) -> TimeInterval {
        TimeInterval::new(
            self.starts_at,
            self.ends_at.unwrap_or(self.starts_at + slot_duration),
        )
    }
}

// ==============================================================================
// INTERVAL MODEL
// ==============================================================================

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Strict overlap: touching or zero-length intervals do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// Union of a collection of intervals, collapsing overlapping and
    /// touching spans. Callers that prefer a merged busy-map over pairwise
    /// testing build it with this.
    pub fn merge(mut intervals: Vec<TimeInterval>) -> Vec<TimeInterval> {
        intervals.retain(|interval| !interval.is_empty());
        intervals.sort_by_key(|interval| interval.start);

        let mut merged: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        merged
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    /// Defaults to `starts_at` plus one slot when absent.
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_follow_up: bool,
    #[serde(default)]
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Overlaps another scheduled or confirmed appointment.
    AppointmentOverlap,
    /// Overlaps a blocking schedule exception.
    BlockedByException,
    /// The requested start is already in the past.
    StartInPast,
    /// A concurrent booking won the insert race for this start time.
    SlotTaken,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::AppointmentOverlap => {
                write!(f, "time slot conflicts with an existing appointment")
            }
            ConflictReason::BlockedByException => {
                write!(f, "time slot falls in a blocked period")
            }
            ConflictReason::StartInPast => write!(f, "start time is in the past"),
            ConflictReason::SlotTaken => write!(f, "slot was just taken"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub reason: Option<ConflictReason>,
}

impl ConflictCheck {
    pub fn clear() -> Self {
        Self { has_conflict: false, reason: None }
    }

    pub fn because(reason: ConflictReason) -> Self {
        Self { has_conflict: true, reason: Some(reason) }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Practitioner not found")]
    PractitionerNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Appointment cannot move from '{from}' to '{to}'")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Scheduling conflict: {0}")]
    Conflict(ConflictReason),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}
