pub mod availability;
pub mod booking;
pub mod calendar;
pub mod conflict;

pub use availability::{AvailabilityService, AvailableSlots};
pub use booking::BookingService;
pub use conflict::ConflictDetectionService;
