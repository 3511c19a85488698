//! REST API endpoints for the wayfind service.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **`state.store`** (Mutex): Acquired for read-only queries by the data
//!   endpoints. Held for a single query; never across an engine call.
//! - Engine handlers (`/api/location`, `/api/triggers/...`) go through the
//!   engine, which takes the store lock itself through its storage adapters.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Storage
//! failures return HTTP 500, unknown ids 404, and invalid input 400.
//!
//! # Example
//!
//! ```ignore
//! use wayfind_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use wayfind_core::{LocationOutcome, TriggerOutcome};
use wayfind_store::{DiscoveryQuery, DiscoveryStats};
use wayfind_types::{ArmedPlace, DiscoveryRecord, LocationSample};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Discoveries
        .route("/api/discoveries", get(list_discoveries))
        .route("/api/discoveries/{id}", get(get_discovery))
        .route("/api/stats", get(get_stats))
        // Triggers
        .route("/api/triggers", get(list_triggers))
        .route("/api/triggers/{id}", delete(clear_trigger))
        .route("/api/triggers/fired", post(triggers_fired))
        // Location input
        .route("/api/location", post(post_location))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub uptime_secs: i64,
    /// Number of discovered places.
    pub discoveries: u64,
    /// Number of armed triggers.
    pub triggers: u64,
    /// Where the last successful place query was made, as `[lat, lon]`.
    pub fetch_anchor: Option<[f64; 2]>,
    /// Whether geofences are simulated in-process.
    pub simulated_geofences: bool,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let anchor = state.engine.fetch_anchor().await;
    let (discoveries, triggers) = {
        let store = state.store.lock().await;
        (store.count_discoveries()?, store.count_triggers()?)
    };

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        uptime_secs: (OffsetDateTime::now_utc() - state.started_at).whole_seconds(),
        discoveries,
        triggers,
        fetch_anchor: anchor.map(|c| [c.latitude, c.longitude]),
        simulated_geofences: state.simulator.is_some(),
    }))
}

/// Query parameters for discoveries.
#[derive(Debug, Deserialize, Default)]
pub struct DiscoveriesQuery {
    pub category: Option<String>,
    /// Unix timestamp, inclusive.
    pub since: Option<i64>,
    /// Unix timestamp, inclusive.
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl DiscoveriesQuery {
    /// Validate the query parameters.
    /// Returns an error if `since > until` or a timestamp is out of range.
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }
        for ts in [self.since, self.until].into_iter().flatten() {
            if OffsetDateTime::from_unix_timestamp(ts).is_err() {
                return Err(AppError::BadRequest(format!(
                    "Timestamp out of range: {}",
                    ts
                )));
            }
        }
        Ok(())
    }

    fn to_store_query(&self) -> DiscoveryQuery {
        let mut query = DiscoveryQuery::new();
        if let Some(category) = &self.category {
            query = query.category(category);
        }
        if let Some(since) = self.since
            && let Ok(dt) = OffsetDateTime::from_unix_timestamp(since)
        {
            query = query.since(dt);
        }
        if let Some(until) = self.until
            && let Ok(dt) = OffsetDateTime::from_unix_timestamp(until)
        {
            query = query.until(dt);
        }
        // One extra row tells whether there are more.
        if let Some(limit) = self.limit {
            query = query.limit(limit.saturating_add(1));
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        query
    }
}

/// Paginated response wrapper with metadata.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Number of items returned.
    pub count: usize,
    pub offset: u32,
    pub limit: Option<u32>,
    /// Whether there are more items available.
    pub has_more: bool,
}

/// List discoveries, newest first.
///
/// # Query Parameters
///
/// - `category`: exact category match (e.g. `town`)
/// - `since` / `until`: Unix timestamps, inclusive
/// - `limit` / `offset`: pagination
async fn list_discoveries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiscoveriesQuery>,
) -> Result<Json<PaginatedResponse<DiscoveryRecord>>, AppError> {
    params.validate()?;
    let query = params.to_store_query();

    let mut records = state.store.lock().await.query_discoveries(&query)?;

    let has_more = params.limit.is_some_and(|l| records.len() > l as usize);
    if has_more {
        records.pop();
    }

    Ok(Json(PaginatedResponse {
        pagination: PaginationMeta {
            count: records.len(),
            offset: params.offset.unwrap_or(0),
            limit: params.limit,
            has_more,
        },
        data: records,
    }))
}

async fn get_discovery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DiscoveryRecord>, AppError> {
    let record = state
        .store
        .lock()
        .await
        .get_discovery(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Place not discovered: {}", id)))?;
    Ok(Json(record))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<DiscoveryStats>, AppError> {
    Ok(Json(state.store.lock().await.discovery_stats()?))
}

/// List armed triggers, most recently armed first.
async fn list_triggers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ArmedPlace>>, AppError> {
    Ok(Json(state.engine.registry().registrations().await?))
}

/// Remove an armed trigger and disarm it.
async fn clear_trigger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.engine.registry().clear(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No trigger armed for {}", id)))
    }
}

/// Result of posting a location sample.
#[derive(Debug, Serialize)]
pub struct LocationResponse {
    /// `throttled`, `fetch_failed`, or `armed`.
    pub outcome: &'static str,
    /// Place ids armed by this update.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub armed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<LocationOutcome> for LocationResponse {
    fn from(outcome: LocationOutcome) -> Self {
        match outcome {
            LocationOutcome::Throttled => Self {
                outcome: "throttled",
                armed: Vec::new(),
                error: None,
            },
            LocationOutcome::FetchFailed(e) => Self {
                outcome: "fetch_failed",
                armed: Vec::new(),
                error: Some(e.to_string()),
            },
            LocationOutcome::Armed(registrations) => Self {
                outcome: "armed",
                armed: registrations.into_iter().map(|r| r.place_id).collect(),
                error: None,
            },
        }
    }
}

async fn post_location(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<LocationSample>,
) -> Result<Json<LocationResponse>, AppError> {
    let outcome = state.handle_location(&sample).await?;
    Ok(Json(outcome.into()))
}

/// Body of `POST /api/triggers/fired`.
#[derive(Debug, Deserialize)]
pub struct FiredRequest {
    pub trigger_ids: Vec<String>,
}

/// Per-trigger result of a fired batch.
#[derive(Debug, Serialize)]
pub struct FiredResult {
    pub trigger_id: String,
    /// `unresolved`, `already_discovered`, `discovered`, or `error`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<DiscoveryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Deliver fired triggers.
///
/// Every id is processed independently; a storage failure for one id is
/// reported in its entry and does not fail the request.
async fn triggers_fired(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FiredRequest>,
) -> Result<Json<Vec<FiredResult>>, AppError> {
    if request.trigger_ids.is_empty() {
        return Err(AppError::BadRequest("trigger_ids must not be empty".into()));
    }

    let results = state.engine.on_triggers_fired(&request.trigger_ids).await;
    let body = request
        .trigger_ids
        .into_iter()
        .zip(results)
        .map(|(trigger_id, result)| {
            let (outcome, record, error) = match result {
                Ok(TriggerOutcome::Unresolved) => ("unresolved", None, None),
                Ok(TriggerOutcome::AlreadyDiscovered) => ("already_discovered", None, None),
                Ok(TriggerOutcome::Discovered(record)) => ("discovered", Some(record), None),
                Err(e) => ("error", None, Some(e.to_string())),
            };
            FiredResult {
                trigger_id,
                outcome,
                record,
                error,
            }
        })
        .collect();

    Ok(Json(body))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Store(wayfind_store::Error),
    Engine(wayfind_core::Error),
}

impl From<wayfind_store::Error> for AppError {
    fn from(e: wayfind_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<wayfind_core::Error> for AppError {
    fn from(e: wayfind_core::Error) -> Self {
        if matches!(e, wayfind_core::Error::InvalidLocation(_)) {
            AppError::BadRequest(e.to_string())
        } else {
            AppError::Engine(e)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wayfind_core::mock::{MockPlaceQueryClient, RecordingMonitor};
    use wayfind_store::Store;
    use wayfind_types::PlaceCandidate;

    use crate::config::Config;

    fn create_test_state() -> (Arc<AppState>, Arc<MockPlaceQueryClient>) {
        let client = Arc::new(MockPlaceQueryClient::new());
        client.set_places(vec![
            PlaceCandidate::new("101", "Springfield", 40.01, -74.01, "town"),
            PlaceCandidate::new("202", "Shelbyville", 40.05, -74.05, "city"),
        ]);
        let mut config = Config::default();
        config.effects.notifications = false;
        let state = AppState::new(
            Store::open_in_memory().unwrap(),
            config,
            client.clone(),
            Arc::new(RecordingMonitor::new()),
        )
        .unwrap();
        (state, client)
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn arm_and_discover(state: &Arc<AppState>) {
        state
            .engine
            .on_location_update(&LocationSample::now(40.0, -74.0))
            .await
            .unwrap();
        state.engine.on_trigger_fired("101").await.unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (state, _) = create_test_state();
        arm_and_discover(&state).await;
        let app = router().with_state(state);

        let response = app.oneshot(get("/api/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["discoveries"], 1);
        assert_eq!(json["triggers"], 2);
        assert_eq!(json["fetch_anchor"][0], 40.0);
        assert_eq!(json["simulated_geofences"], false);
    }

    #[tokio::test]
    async fn test_list_discoveries_empty() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let response = app.oneshot(get("/api/discoveries")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert!(json["data"].as_array().unwrap().is_empty());
        assert_eq!(json["pagination"]["has_more"], false);
    }

    #[tokio::test]
    async fn test_list_discoveries_paginates() {
        let (state, _) = create_test_state();
        arm_and_discover(&state).await;
        state.engine.on_trigger_fired("202").await.unwrap();
        let app = router().with_state(state);

        let response = app
            .oneshot(get("/api/discoveries?limit=1"))
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["pagination"]["count"], 1);
        assert_eq!(json["pagination"]["has_more"], true);
    }

    #[tokio::test]
    async fn test_list_discoveries_by_category() {
        let (state, _) = create_test_state();
        arm_and_discover(&state).await;
        state.engine.on_trigger_fired("202").await.unwrap();
        let app = router().with_state(state);

        let response = app
            .oneshot(get("/api/discoveries?category=city"))
            .await
            .unwrap();
        let json = response_json(response).await;
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["name"], "Shelbyville");
    }

    #[tokio::test]
    async fn test_list_discoveries_invalid_range() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let response = app
            .oneshot(get("/api/discoveries?since=200&until=100"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("Invalid time range"));
    }

    #[tokio::test]
    async fn test_get_discovery() {
        let (state, _) = create_test_state();
        arm_and_discover(&state).await;
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(get("/api/discoveries/101"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["name"], "Springfield");
        assert_eq!(json["category"], "town");

        let response = app.oneshot(get("/api/discoveries/999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("999"));
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (state, _) = create_test_state();
        arm_and_discover(&state).await;
        let app = router().with_state(state);

        let response = app.oneshot(get("/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_category"][0]["category"], "town");
    }

    #[tokio::test]
    async fn test_post_location_arms_then_throttles() {
        let (state, client) = create_test_state();
        let app = router().with_state(state);

        let body = r#"{"latitude":40.0,"longitude":-74.0}"#;
        let response = app
            .clone()
            .oneshot(post_json("/api/location", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["outcome"], "armed");
        assert_eq!(json["armed"].as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(post_json("/api/location", body))
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["outcome"], "throttled");
        assert_eq!(client.fetch_count(), 1);

        let response = app.oneshot(get("/api/triggers")).await.unwrap();
        let json = response_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_post_location_fetch_failure() {
        let (state, client) = create_test_state();
        client.fail_next(1);
        let app = router().with_state(state);

        let response = app
            .oneshot(post_json(
                "/api/location",
                r#"{"latitude":40.0,"longitude":-74.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["outcome"], "fetch_failed");
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_post_location_out_of_range() {
        let (state, client) = create_test_state();
        let app = router().with_state(state);

        let response = app
            .oneshot(post_json(
                "/api/location",
                r#"{"latitude":123.0,"longitude":-74.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(client.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_triggers_fired_reports_each_id() {
        let (state, _) = create_test_state();
        state
            .engine
            .on_location_update(&LocationSample::now(40.0, -74.0))
            .await
            .unwrap();
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/triggers/fired",
                r#"{"trigger_ids":["101","nope"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json[0]["trigger_id"], "101");
        assert_eq!(json[0]["outcome"], "discovered");
        assert_eq!(json[0]["record"]["name"], "Springfield");
        assert_eq!(json[1]["outcome"], "unresolved");

        let response = app
            .oneshot(post_json(
                "/api/triggers/fired",
                r#"{"trigger_ids":["101"]}"#,
            ))
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json[0]["outcome"], "already_discovered");
    }

    #[tokio::test]
    async fn test_triggers_fired_empty_batch() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let response = app
            .oneshot(post_json("/api/triggers/fired", r#"{"trigger_ids":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear_trigger() {
        let (state, _) = create_test_state();
        state
            .engine
            .on_location_update(&LocationSample::now(40.0, -74.0))
            .await
            .unwrap();
        let app = router().with_state(state.clone());

        let delete_request = |uri: &str| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(delete_request("/api/triggers/101"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(delete_request("/api/triggers/101")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.store.lock().await.count_triggers().unwrap(), 1);
    }
}
