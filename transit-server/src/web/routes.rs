//! HTTP route handlers.

use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::domain::{DomainError, IncidentId, PendingId, UserId};
use crate::error::ErrorKind;
use crate::geo::GeoPoint;
use crate::incidents::{IncidentError, StaffIncident};
use crate::planner::SearchError;
use crate::quorum::{QuorumError, ReportSubmission};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stops/nearest", get(nearest_stop))
        .route("/api/journeys/search", post(search_journeys))
        .route("/api/reports", post(submit_report))
        .route("/api/reports/queue", get(moderation_queue))
        .route("/api/reports/:id/approve", post(approve_report))
        .route("/api/reports/:id/reject", post(reject_report))
        .route("/api/incidents", post(create_incident))
        .route("/api/incidents/:id/resolve", post(resolve_incident))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Parse a JSON body ourselves so malformed input gets the usual error shape.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, body = %String::from_utf8_lossy(body), "rejected JSON body");
        AppError::BadRequest {
            message: format!("Invalid JSON: {e}"),
        }
    })
}

fn parse_path_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.parse().map_err(|_| AppError::BadRequest {
        message: format!("Invalid {what} id: {raw}"),
    })
}

/// Closest stop to a coordinate.
async fn nearest_stop(
    State(state): State<AppState>,
    Query(query): Query<NearestStopQuery>,
) -> Result<Json<NearestStopResponse>, AppError> {
    let point = GeoPoint::new(query.lat, query.lon).map_err(DomainError::from)?;
    let (stop, distance_m) = state
        .journeys
        .nearest_stop(&point)
        .await
        .ok_or_else(|| AppError::NotFound {
            message: "No stops loaded".into(),
        })?;

    Ok(Json(NearestStopResponse {
        stop_id: stop.id,
        name: stop.name,
        transport: stop.transport,
        distance_m,
    }))
}

/// Plan up to three journeys between two stops.
async fn search_journeys(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JourneySearchResponse>, AppError> {
    let req: JourneySearchRequest = parse_body(&body)?;
    let query = JourneyQuery::try_from(req)?;

    let result = state
        .journeys
        .find_optimal_path(&query.from, &query.to, query.departure, query.options)
        .await?;

    Ok(Json(JourneySearchResponse::from(&result)))
}

/// Submit a crowd report.
async fn submit_report(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: SubmitReportRequest = parse_body(&body)?;
    let submission = ReportSubmission::try_from(req)?;

    let outcome = state.quorum.submit_report(submission).await?;
    Ok(Json(outcome).into_response())
}

/// Open moderator queue items.
async fn moderation_queue(State(state): State<AppState>) -> Result<Json<QueueResponse>, AppError> {
    let items = state.quorum.moderation_queue().await?;
    Ok(Json(QueueResponse { items }))
}

async fn approve_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let pending: PendingId = parse_path_id(&id, "report")?;
    let req: ApproveRequest = parse_body(&body)?;
    let moderator = UserId::parse(req.moderator_id).map_err(DomainError::from)?;

    let approval = state.quorum.approve_report(pending, moderator, req.notes).await?;
    Ok(Json(approval).into_response())
}

async fn reject_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let pending: PendingId = parse_path_id(&id, "report")?;
    let req: RejectRequest = parse_body(&body)?;
    let moderator = UserId::parse(req.moderator_id).map_err(DomainError::from)?;

    state
        .quorum
        .reject_report(pending, moderator, req.reason, req.mark_fake)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish a staff incident.
async fn create_incident(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: CreateIncidentRequest = parse_body(&body)?;
    let request = StaffIncident::try_from(req)?;

    let (incident, dispatch) = state.incidents.create_staff_incident(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateIncidentResponse { incident, dispatch }),
    )
        .into_response())
}

async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id: IncidentId = parse_path_id(&id, "incident")?;
    let incident = state.incidents.resolve_incident(id).await?;
    Ok(Json(incident).into_response())
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    Conflict { message: String },
    /// The target outlived its lifetime.
    Gone { message: String },
    Unavailable { message: String },
    Internal { message: String },
}

impl AppError {
    fn classify(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::InvalidInput => AppError::BadRequest { message },
            ErrorKind::NotFound => AppError::NotFound { message },
            ErrorKind::Conflict => AppError::Conflict { message },
            ErrorKind::Exhausted => AppError::Gone { message },
            ErrorKind::Transient => AppError::Unavailable { message },
            ErrorKind::Internal => AppError::Internal { message },
        }
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        AppError::classify(e.kind(), e.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        AppError::classify(e.kind(), e.to_string())
    }
}

impl From<QuorumError> for AppError {
    fn from(e: QuorumError) -> Self {
        AppError::classify(e.kind(), e.to_string())
    }
}

impl From<IncidentError> for AppError {
    fn from(e: IncidentError) -> Self {
        AppError::classify(e.kind(), e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Conflict { message } => (StatusCode::CONFLICT, message),
            AppError::Gone { message } => (StatusCode::GONE, message),
            AppError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, %message, "request failed");
        } else {
            warn!(%status, %message, "request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AppConfig;
    use crate::domain::{
        Line, LineId, RouteId, Stop, StopId, StopTime, TransportType, Trip, TripId, User, UserId,
    };
    use crate::graph::ReferenceData;
    use crate::notify::{BroadcastPublisher, LogNotifier};
    use crate::store::{DocumentStore, MemoryStore};

    const KM: f64 = 0.008_993;

    fn reference() -> ReferenceData {
        let stop = |name: &str, x: f64| Stop {
            id: StopId::parse(name).unwrap(),
            name: format!("{name} Street"),
            location: GeoPoint::new(0.0, x * KM).unwrap(),
            transport: TransportType::Bus,
        };
        ReferenceData {
            stops: vec![stop("A", 0.0), stop("B", 1.0), stop("C", 2.0)],
            lines: vec![Line {
                id: LineId::parse("L1").unwrap(),
                name: "Line 1".into(),
                transport: TransportType::Bus,
            }],
            trips: vec![Trip {
                id: TripId::parse("T1").unwrap(),
                route_id: RouteId::parse("R1").unwrap(),
                line_id: LineId::parse("L1").unwrap(),
                stop_times: ["A", "B", "C"]
                    .iter()
                    .enumerate()
                    .map(|(i, s)| StopTime {
                        stop_id: StopId::parse(*s).unwrap(),
                        arrival: None,
                        departure: None,
                        sequence: i as u32,
                    })
                    .collect(),
            }],
        }
    }

    fn app() -> (Router, MemoryStore) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
        ));
        let (state, _) = AppState::wire(
            &AppConfig::default(),
            reference(),
            Arc::new(store.clone()),
            Arc::new(BroadcastPublisher::new(16)),
            Arc::new(LogNotifier),
            clock,
        );
        (create_router(state), store)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn report(user: &str, reputation: u32) -> Value {
        json!({
            "kind": "accident",
            "lat": 0.0,
            "lon": 0.0,
            "line_ids": ["L1"],
            "reporter_id": user,
            "reporter_reputation": reputation,
        })
    }

    #[tokio::test]
    async fn health_check() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn journey_search_returns_ranked_journeys() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/journeys/search",
            Some(json!({"from": "A", "to": "C", "departure": "2024-03-15T10:00:00Z"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["journeys"][0]["duration_mins"], 6);
        assert_eq!(body["journeys"][0]["transfers"], 0);
        assert_eq!(body["alternative_available"], false);
    }

    #[tokio::test]
    async fn journey_search_errors_map_to_status() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/journeys/search",
            Some(json!({"from": "A", "to": "Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Z"));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/journeys/search",
            Some(json!({"from": "A", "to": "C", "preferred_transport_types": ["zeppelin"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, Method::POST, "/api/journeys/search", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn nearest_stop_lookup() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/api/stops/nearest?lat=0.0&lon=0.0171", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stop_id"], "C");

        let (status, _) = send(&app, Method::GET, "/api/stops/nearest?lat=120&lon=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn report_flow_and_duplicate_conflict() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::POST, "/api/reports", Some(report("u1", 50))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "created");
        assert_eq!(body["total_reports"], 1);

        let (status, body) = send(&app, Method::POST, "/api/reports", Some(report("u1", 50))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already reported"));

        let (status, body) = send(&app, Method::POST, "/api/reports", Some(report("u2", 50))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "joined");

        let (status, body) = send(&app, Method::GET, "/api/reports/queue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["items"][0]["priority"], "MEDIUM");
    }

    #[tokio::test]
    async fn known_reporter_cannot_claim_reputation() {
        let (app, store) = app();
        store.insert_user(User::new(UserId::parse("newbie").unwrap(), 0)).await.unwrap();

        let (status, body) = send(&app, Method::POST, "/api/reports", Some(report("newbie", 500))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "created");
        assert_eq!(body["incident_id"], Value::Null);
        assert!(store.active_incidents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_publishes_incident() {
        let (app, store) = app();
        let (_, body) = send(&app, Method::POST, "/api/reports", Some(report("u1", 50))).await;
        let pending = body["pending_id"].as_str().unwrap().to_string();

        let uri = format!("/api/reports/{pending}/approve");
        let (status, body) = send(&app, Method::POST, &uri, Some(json!({"moderator_id": "mod"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rewarded_users"], json!(["u1"]));
        assert_eq!(body["incident"]["status"], "published");
        assert_eq!(store.active_incidents().await.unwrap().len(), 1);

        let (status, _) = send(&app, Method::POST, &uri, Some(json!({"moderator_id": "mod"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn rejection_and_bad_ids() {
        let (app, _) = app();
        let (_, body) = send(&app, Method::POST, "/api/reports", Some(report("u1", 50))).await;
        let pending = body["pending_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{pending}/reject"),
            Some(json!({"moderator_id": "mod", "reason": "duplicate", "mark_fake": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/reports/not-a-uuid/reject",
            Some(json!({"moderator_id": "mod", "reason": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/approve", PendingId::new()),
            Some(json!({"moderator_id": "mod"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn staff_incident_slows_journeys_until_resolved() {
        let (app, _) = app();
        let search = json!({"from": "A", "to": "C"});

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/incidents",
            Some(json!({
                "kind": "network-failure",
                "line_ids": ["L1"],
                "segments": [["A", "B"]],
                "created_by": "admin",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let incident = body["incident"]["id"].as_str().unwrap().to_string();

        let (_, body) = send(&app, Method::POST, "/api/journeys/search", Some(search.clone())).await;
        assert_eq!(body["journeys"][0]["duration_mins"], 36);
        assert_eq!(body["journeys"][0]["worst_severity"], "CRITICAL");

        let (status, body) = send(&app, Method::POST, &format!("/api/incidents/{incident}/resolve"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "resolved");
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let status = |kind| AppError::classify(kind, String::new()).into_response().status();
        assert_eq!(status(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status(ErrorKind::Exhausted), StatusCode::GONE);
        assert_eq!(status(ErrorKind::Transient), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
