//! HTTP API handlers for the controller.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crossway_proto::LaneId;

use crate::error::Result;
use crate::manual::OverrideSequencer;
use crate::state::{Intersection, Light, TimerState, TrafficState};

/// Shared application state.
pub struct AppState {
    pub traffic: Arc<TrafficState>,
    pub overrides: Arc<OverrideSequencer>,
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/manual", post(manual))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Creates the API router with the dashboard served from `dashboard_dir`.
///
/// Unknown paths fall back to the dashboard's `index.html`.
pub fn router_with_dashboard(state: Arc<AppState>, dashboard_dir: &Path) -> Router {
    let index = ServeFile::new(dashboard_dir.join("index.html"));
    router(state).fallback_service(ServeDir::new(dashboard_dir).fallback(index))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// Current densities, lights and countdowns for every lane.
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse::from(&state.traffic.snapshot()))
}

/// Starts a manual override, or resumes automatic mode when `lane` is null.
async fn manual(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ManualRequest>,
) -> Result<Json<ManualResponse>> {
    let lane = request.lane.map(LaneId::try_from).transpose()?;
    let action = state.overrides.request(lane);
    info!(%action, "manual command accepted");

    Ok(Json(ManualResponse {
        ok: true,
        action: action.to_string(),
    }))
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct ManualRequest {
    #[serde(default)]
    pub lane: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManualResponse {
    pub ok: bool,
    pub action: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Per-lane maps keyed `lane0`..`lane3`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub densities: BTreeMap<String, u32>,
    pub light: BTreeMap<String, Light>,
    /// Seconds left on each countdown.
    pub timer: BTreeMap<String, f64>,
    pub timer_state: BTreeMap<String, TimerState>,
    /// Green time in seconds each lane would get now.
    pub green_time: BTreeMap<String, u64>,
}

impl From<&Intersection> for StatusResponse {
    fn from(ix: &Intersection) -> Self {
        let green_times = ix.green_times();
        let mut response = Self {
            densities: BTreeMap::new(),
            light: BTreeMap::new(),
            timer: BTreeMap::new(),
            timer_state: BTreeMap::new(),
            green_time: BTreeMap::new(),
        };

        for lane in LaneId::ALL {
            let state = ix.lane(lane);
            let key = lane.key();
            response.densities.insert(key.clone(), state.density);
            response.light.insert(key.clone(), state.light);
            response.timer.insert(key.clone(), state.timer.as_secs_f64());
            response.timer_state.insert(key.clone(), state.timer_state);
            response
                .green_time
                .insert(key, green_times[lane.index()].as_secs());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryActuator, ReconnectPolicy};
    use crate::link::{Actuator, ActuatorLink};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_app_state() -> Arc<AppState> {
        let traffic = Arc::new(TrafficState::new());
        let actuator = Actuator::new(ActuatorLink::new(
            Arc::new(MemoryActuator::new()),
            ReconnectPolicy::default(),
        ));
        let overrides = Arc::new(OverrideSequencer::new(
            traffic.clone(),
            actuator,
            Duration::from_millis(100),
        ));

        Arc::new(AppState { traffic, overrides })
    }

    fn manual_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/manual")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = router(make_app_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_starts_all_red() {
        let app = router(make_app_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["densities"]["lane3"], 0);
        assert_eq!(json["light"]["lane0"], "Red");
        assert_eq!(json["timer"]["lane1"], 0.0);
        assert_eq!(json["timer_state"]["lane2"], "");
        assert_eq!(json["green_time"]["lane0"], 15);
    }

    #[tokio::test]
    async fn rejects_unknown_lane() {
        let state = make_app_state();
        let app = router(state.clone());

        let response = app.oneshot(manual_request(r#"{"lane": 7}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        assert!(!state.traffic.snapshot().manual_mode());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_lane_starts_override() {
        let state = make_app_state();
        let app = router(state.clone());

        let response = app.oneshot(manual_request(r#"{"lane": 1}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["action"], "forcing_green_for_lane_1");
        assert!(state.traffic.snapshot().manual_mode());

        state.overrides.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn null_lane_resumes() {
        let state = make_app_state();
        let app = router(state.clone());

        let response = app.oneshot(manual_request(r#"{"lane": null}"#)).await.unwrap();

        let json = body_json(response).await;
        assert_eq!(json["action"], "resuming_smart_mode");

        state.overrides.wait_idle().await;
        assert!(!state.traffic.snapshot().manual_mode());
    }
}
