// libs/scheduling-cell/tests/availability_test.rs

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::services::{AvailabilityService, ConflictDetectionService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

const AUTH_TOKEN: &str = "test_token";

struct TestSetup {
    service: AvailabilityService,
    config: AppConfig,
    mock_server: MockServer,
    practitioner_id: Uuid,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = AppConfig {
            supabase_url: mock_server.uri(),
            supabase_anon_key: "test-anon-key".to_string(),
            clinic_timezone: Tz::UTC,
            slot_duration_minutes: 30,
        };
        let service = AvailabilityService::new(&config);

        Self {
            service,
            config,
            mock_server,
            practitioner_id: Uuid::new_v4(),
        }
    }

    async fn mock_practitioner_exists(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/practitioners"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![json!({"id": self.practitioner_id})]),
            )
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_rows(&self, table: &str, rows: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/rest/v1/{}", table)))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    fn recurring_row(&self, weekday: i16, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "practitioner_id": self.practitioner_id,
            "weekday": weekday,
            "start_time": start,
            "end_time": end
        })
    }

    fn exception_row(&self, starts_at: &str, ends_at: &str, is_blocking: bool) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "practitioner_id": self.practitioner_id,
            "starts_at": starts_at,
            "ends_at": ends_at,
            "is_blocking": is_blocking,
            "reason": "test exception"
        })
    }
}

// 2025-06-16 is a Monday
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
}

fn monday_at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 16, hour, min, 0).unwrap()
}

fn tuesday_at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 17, hour, min, 0).unwrap()
}

// ==============================================================================
// SLOT GENERATION SCENARIOS
// ==============================================================================

#[tokio::test]
async fn open_monday_morning_yields_every_half_hour_slot() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(
        slots[&monday()],
        vec![monday_at(9, 0), monday_at(9, 30), monday_at(10, 0), monday_at(10, 30)]
    );
}

#[tokio::test]
async fn booked_appointment_removes_its_slot() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup
        .mock_rows(
            "appointments",
            json!([{"starts_at": "2025-06-16T10:00:00Z", "ends_at": "2025-06-16T10:30:00Z"}]),
        )
        .await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(
        slots[&monday()],
        vec![monday_at(9, 0), monday_at(9, 30), monday_at(10, 30)]
    );
}

#[tokio::test]
async fn blocking_exception_removes_every_overlapping_slot() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup
        .mock_rows(
            "schedule_exceptions",
            json!([setup.exception_row("2025-06-16T09:00:00Z", "2025-06-16T09:45:00Z", true)]),
        )
        .await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    // 09:00 and 09:30 both overlap the 09:00-09:45 block
    assert_eq!(slots[&monday()], vec![monday_at(10, 0), monday_at(10, 30)]);
}

#[tokio::test]
async fn day_without_windows_is_omitted_entirely() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 2, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    // Horizon covers Monday and Tuesday; no Tuesday schedule exists
    assert!(slots.contains_key(&monday()));
    assert!(!slots.contains_key(&NaiveDate::from_ymd_opt(2025, 6, 17).unwrap()));
}

#[tokio::test]
async fn generation_starts_at_the_next_boundary_after_now() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(9, 10), AUTH_TOKEN)
        .await
        .unwrap();

    // 09:00 is already past its boundary at 09:10; generation resumes at 09:30
    assert_eq!(
        slots[&monday()],
        vec![monday_at(9, 30), monday_at(10, 0), monday_at(10, 30)]
    );
}

// ==============================================================================
// WINDOW EDGE CASES
// ==============================================================================

#[tokio::test]
async fn exact_fit_window_yields_one_slot_and_short_window_none() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows(
            "recurring_schedules",
            json!([
                setup.recurring_row(1, "09:00:00", "09:30:00"),
                setup.recurring_row(2, "09:00:00", "09:29:00"),
            ]),
        )
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 2, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    // Monday 09:00-09:30 fits exactly one slot; Tuesday 09:00-09:29 fits none
    assert_eq!(slots[&monday()], vec![monday_at(9, 0)]);
    assert!(!slots.contains_key(&NaiveDate::from_ymd_opt(2025, 6, 17).unwrap()));
}

#[tokio::test]
async fn overlapping_recurring_windows_deduplicate_slots() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows(
            "recurring_schedules",
            json!([
                setup.recurring_row(1, "09:00:00", "11:00:00"),
                setup.recurring_row(1, "10:00:00", "12:00:00"),
            ]),
        )
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(
        slots[&monday()],
        vec![
            monday_at(9, 0),
            monday_at(9, 30),
            monday_at(10, 0),
            monday_at(10, 30),
            monday_at(11, 0),
            monday_at(11, 30),
        ]
    );
}

#[tokio::test]
async fn inverted_recurring_row_is_skipped_silently() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows(
            "recurring_schedules",
            json!([
                setup.recurring_row(1, "11:00:00", "09:00:00"),
                setup.recurring_row(1, "14:00:00", "15:00:00"),
            ]),
        )
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(slots[&monday()], vec![monday_at(14, 0), monday_at(14, 30)]);
}

#[tokio::test]
async fn extra_availability_exception_opens_windows_without_recurring_schedule() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup.mock_rows("recurring_schedules", json!([])).await;
    setup
        .mock_rows(
            "schedule_exceptions",
            json!([setup.exception_row("2025-06-16T14:00:00Z", "2025-06-16T15:00:00Z", false)]),
        )
        .await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(slots[&monday()], vec![monday_at(14, 0), monday_at(14, 30)]);
}

#[tokio::test]
async fn multi_day_extra_exception_passes_through_unclipped() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup.mock_rows("recurring_schedules", json!([])).await;
    setup
        .mock_rows(
            "schedule_exceptions",
            json!([setup.exception_row("2025-06-16T14:00:00Z", "2025-06-17T15:00:00Z", false)]),
        )
        .await;
    setup.mock_rows("appointments", json!([])).await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 2, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    // The raw interval is attached to both days it touches: each day lists
    // the full 25-hour sweep, including instants outside that calendar day
    let tuesday = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
    assert_eq!(slots[&monday()].len(), 50);
    assert_eq!(slots[&monday()], slots[&tuesday]);
    assert_eq!(slots[&monday()].first(), Some(&monday_at(14, 0)));
    assert_eq!(slots[&monday()].last(), Some(&tuesday_at(14, 30)));
}

// ==============================================================================
// RESILIENCE AND CONSISTENCY
// ==============================================================================

#[tokio::test]
async fn unknown_practitioner_yields_empty_result() {
    let setup = TestSetup::new().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practitioners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 7, monday_at(8, 0), AUTH_TOKEN)
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn identical_inputs_yield_identical_output() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup
        .mock_rows(
            "appointments",
            json!([{"starts_at": "2025-06-16T09:30:00Z", "ends_at": "2025-06-16T10:00:00Z"}]),
        )
        .await;

    let now = monday_at(8, 0);
    let first = setup
        .service
        .compute_available_slots(setup.practitioner_id, 3, now, AUTH_TOKEN)
        .await
        .unwrap();
    let second = setup
        .service
        .compute_available_slots(setup.practitioner_id, 3, now, AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn generated_slot_passes_the_conflict_check() {
    let setup = TestSetup::new().await;
    setup.mock_practitioner_exists().await;
    setup
        .mock_rows("recurring_schedules", json!([setup.recurring_row(1, "09:00:00", "11:00:00")]))
        .await;
    setup.mock_rows("schedule_exceptions", json!([])).await;
    setup
        .mock_rows(
            "appointments",
            json!([{"starts_at": "2025-06-16T10:00:00Z", "ends_at": "2025-06-16T10:30:00Z"}]),
        )
        .await;

    let now = monday_at(8, 0);
    let slots = setup
        .service
        .compute_available_slots(setup.practitioner_id, 1, now, AUTH_TOKEN)
        .await
        .unwrap();

    let conflict_service = ConflictDetectionService::new(
        std::sync::Arc::new(SupabaseClient::new(&setup.config)),
        setup.config.slot_duration(),
    );

    for slot in &slots[&monday()] {
        let conflicted = conflict_service
            .has_conflict(
                setup.practitioner_id,
                *slot,
                *slot + setup.config.slot_duration(),
                None,
                now,
                AUTH_TOKEN,
            )
            .await
            .unwrap();
        assert!(!conflicted, "slot {} should be bookable", slot);
    }
}
