// libs/schedule-cell/tests/handlers_test.rs

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::router::schedule_routes;
use shared_utils::test_utils::{MockRealtimeResponses, TestConfig, TEST_TOKEN};

// ==============================================================================
// TEST HELPERS
// ==============================================================================

fn app_for(server: &MockServer) -> Router {
    schedule_routes(TestConfig::with_url(server.uri()).to_arc())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn mount_user(server: &MockServer, user_id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{}.json", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": name })))
        .mount(server)
        .await;
}

async fn mount_professional_schedule(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/scheduleRules.json"))
        .and(query_param("orderBy", "\"professionalId\""))
        .and(query_param("equalTo", "\"prof-1\""))
        .and(query_param("auth", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rule-1": MockRealtimeResponses::schedule_rule(
                "pat-1",
                "prof-1",
                "2024-03-01",
                "2024-03-31",
                json!({ "1": ["09:00"] }),
            )
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appointments.json"))
        .and(query_param("orderBy", "\"professionalId\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "-Nextra": MockRealtimeResponses::appointment(
                "pat-1",
                "prof-1",
                "2024-03-11T17:00:00.000Z",
                "scheduled",
            )
        })))
        .mount(server)
        .await;
    mount_user(server, "pat-1", "Ana Souza").await;
    mount_user(server, "prof-1", "Dra. Carla Lima").await;
}

// ==============================================================================
// AUTH
// ==============================================================================

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let server = MockServer::start().await;
    let request = Request::builder()
        .uri("/calendar/professionals/prof-1?year=2024&month=3")
        .body(Body::empty())
        .unwrap();

    let response = app_for(&server).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ==============================================================================
// CALENDAR
// ==============================================================================

#[tokio::test]
async fn test_professional_calendar_lists_month() {
    let server = MockServer::start().await;
    mount_professional_schedule(&server).await;

    let response = app_for(&server)
        .oneshot(get("/calendar/professionals/prof-1?year=2024&month=3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;

    assert_eq!(body["total"], 5);
    let calendar = &body["calendar"];
    assert_eq!(
        calendar["marked_dates"],
        json!(["2024-03-04", "2024-03-11", "2024-03-18", "2024-03-25"])
    );

    let monday = calendar["occurrences"]["2024-03-11"].as_array().unwrap();
    assert_eq!(monday.len(), 2);
    assert_eq!(monday[0]["start"], "2024-03-11T12:00:00Z");
    assert_eq!(monday[0]["reference"]["kind"], "virtual");
    assert_eq!(monday[0]["patient_name"], "Ana Souza");
    assert_eq!(monday[1]["reference"]["kind"], "real");
    assert_eq!(monday[1]["reference"]["appointment_id"], "-Nextra");
}

#[tokio::test]
async fn test_invalid_month_is_unprocessable() {
    let server = MockServer::start().await;

    let response = app_for(&server)
        .oneshot(get("/calendar/patients/pat-1?year=2024&month=13"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_agenda_returns_single_day_in_order() {
    let server = MockServer::start().await;
    mount_professional_schedule(&server).await;

    let response = app_for(&server)
        .oneshot(get("/agenda/professionals/prof-1?date=2024-03-11"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;

    assert_eq!(body["date"], "2024-03-11");
    assert_eq!(body["total"], 2);
    assert_eq!(body["occurrences"][0]["start"], "2024-03-11T12:00:00Z");
    assert_eq!(body["occurrences"][1]["start"], "2024-03-11T17:00:00Z");
}

#[tokio::test]
async fn test_store_outage_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let response = app_for(&server)
        .oneshot(get("/calendar/patients/pat-1?year=2024&month=3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

// ==============================================================================
// OCCURRENCES
// ==============================================================================

fn virtual_occurrence_json(start: &str) -> Value {
    json!({
        "id": "rule-1",
        "reference": { "kind": "virtual", "rule_id": "rule-1", "instant": start },
        "patient_id": "pat-1",
        "professional_id": "prof-1",
        "start": start,
        "date_key": &start[..10],
        "status": "scheduled"
    })
}

#[tokio::test]
async fn test_cancel_endpoint_writes_exception() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scheduleRules/rule-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockRealtimeResponses::schedule_rule(
            "pat-1",
            "prof-1",
            "2099-03-01",
            "2099-03-31",
            json!({ "1": ["09:00"] }),
        )))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/scheduleRules/rule-1/exceptions/cancelled/2099-03-09T12:00:00,000Z.json"))
        .and(body_json(json!(true)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let response = app_for(&server)
        .oneshot(post_json(
            "/occurrences/cancel",
            json!({ "occurrence": virtual_occurrence_json("2099-03-09T12:00:00Z") }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["occurrence_id"], "rule-1_4076740800000");
}

#[tokio::test]
async fn test_cancel_endpoint_rejects_past_occurrence() {
    let server = MockServer::start().await;

    let response = app_for(&server)
        .oneshot(post_json(
            "/occurrences/cancel",
            json!({ "occurrence": virtual_occurrence_json("2020-03-09T12:00:00Z") }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_create_rule_returns_generated_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scheduleRules.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "-Nrule" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app_for(&server)
        .oneshot(post_json(
            "/rules",
            json!({
                "patientId": "pat-1",
                "professionalId": "prof-1",
                "startDate": "2024-03-01",
                "endDate": "2024-06-30",
                "weeklyTimetable": { "1": ["09:00"], "3": ["14:30"] }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await["rule_id"], "-Nrule");
}

#[tokio::test]
async fn test_create_rule_rejects_bad_times() {
    let server = MockServer::start().await;

    let response = app_for(&server)
        .oneshot(post_json(
            "/rules",
            json!({
                "patientId": "pat-1",
                "professionalId": "prof-1",
                "startDate": "2024-03-01",
                "endDate": "2024-06-30",
                "weeklyTimetable": { "1": ["9h"] }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(server.received_requests().await.unwrap().is_empty());
}

async fn mount_professional_bookings(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/scheduleRules.json"))
        .and(query_param("orderBy", "\"professionalId\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rule-1": MockRealtimeResponses::schedule_rule(
                "pat-1",
                "prof-1",
                "2099-03-01",
                "2099-03-31",
                json!({ "1": ["09:00"] }),
            )
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appointments.json"))
        .and(query_param("orderBy", "\"professionalId\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_booking_over_recurring_session_conflicts() {
    let server = MockServer::start().await;
    mount_professional_bookings(&server).await;

    // Monday 09:00 in the clinic zone is a rule-generated session.
    let response = app_for(&server)
        .oneshot(post_json(
            "/appointments",
            json!({
                "patientId": "pat-2",
                "professionalId": "prof-1",
                "dateTimeStart": "2099-03-09T12:00:00Z"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_booking_free_slot_returns_generated_id() {
    let server = MockServer::start().await;
    mount_professional_bookings(&server).await;
    Mock::given(method("POST"))
        .and(path("/appointments.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "-Nbooked" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app_for(&server)
        .oneshot(post_json(
            "/appointments",
            json!({
                "patientId": "pat-2",
                "professionalId": "prof-1",
                "dateTimeStart": "2099-03-10T12:00:00Z"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await["appointment_id"], "-Nbooked");
}
