//! HTTP request handlers.

use super::AppState;
use crate::api::{MonitorId, MonitorInput, TimeWindow};
use crate::dashboard::WriteError;
use crate::settings::DisplaySettings;
use crate::sync::SyncError;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;

// ============================================================================
// Templates (simple string replacement)
// ============================================================================

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");

/// Serialize for embedding inside a `<script>` block.
fn script_json<T: serde::Serialize>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| fallback.to_string())
        .replace("</", "<\\/")
}

// ============================================================================
// Pages
// ============================================================================

pub async fn handle_index(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.dashboard.view();

    let content = DASHBOARD_TEMPLATE
        .replace("{{view_json}}", &script_json(&view, "{}"))
        .replace(
            "{{settings_json}}",
            &script_json(&state.dashboard.settings().get(), "{}"),
        );

    let page = LAYOUT_TEMPLATE
        .replace("{{title}}", "StatusBoard")
        .replace("{{content}}", &content);

    Html(page)
}

pub async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ============================================================================
// API: Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.view())
}

pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.dashboard.refresh();
    StatusCode::ACCEPTED
}

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.status_report())
}

// ============================================================================
// API: Writes
// ============================================================================

fn sync_error_response(err: SyncError) -> Response {
    match err {
        SyncError::EditInProgress(_) => (StatusCode::CONFLICT, err.to_string()).into_response(),
        SyncError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    }
}

fn write_error_response(err: WriteError) -> Response {
    match err {
        WriteError::Sync(e) => sync_error_response(e),
        WriteError::Invalid(_) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        WriteError::Api(_) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    }
}

pub async fn handle_create_monitor(
    State(state): State<AppState>,
    Json(req): Json<MonitorInput>,
) -> impl IntoResponse {
    match state.dashboard.create_monitor(req).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => write_error_response(e),
    }
}

pub async fn handle_update_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MonitorInput>,
) -> impl IntoResponse {
    match state.dashboard.update_monitor(&MonitorId::new(id), req).await {
        Ok(updated) => Json(updated).into_response(),
        Err(e) => write_error_response(e),
    }
}

pub async fn handle_delete_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dashboard.delete_monitor(&MonitorId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => write_error_response(e),
    }
}

pub async fn handle_toggle_pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dashboard.toggle_pause(&MonitorId::new(id)).await {
        Ok(paused) => Json(paused).into_response(),
        Err(e) => write_error_response(e),
    }
}

// ============================================================================
// API: Edit session
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpenFormRequest {
    Create,
    Edit { monitor_id: MonitorId },
}

pub async fn handle_get_edit_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.edit_session())
}

pub async fn handle_open_edit_session(
    State(state): State<AppState>,
    Json(req): Json<OpenFormRequest>,
) -> impl IntoResponse {
    let opened = match req {
        OpenFormRequest::Create => state.dashboard.open_create_form().map(|_| None),
        OpenFormRequest::Edit { monitor_id } => {
            state.dashboard.open_edit_form(&monitor_id).map(Some)
        }
    };

    match opened {
        // The edit form is prefilled with the monitor's current fields.
        Ok(Some(monitor)) => Json(monitor).into_response(),
        Ok(None) => Json(state.dashboard.edit_session()).into_response(),
        Err(e) => sync_error_response(e),
    }
}

pub async fn handle_cancel_edit_session(State(state): State<AppState>) -> impl IntoResponse {
    if state.dashboard.cancel_form() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::CONFLICT, "write in flight").into_response()
    }
}

// ============================================================================
// API: Widgets
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub range: Option<String>,
}

pub async fn handle_chart(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> impl IntoResponse {
    let range = match query.range.as_deref() {
        None | Some("") => TimeWindow::default(),
        Some(raw) => match raw.parse::<TimeWindow>() {
            Ok(range) => range,
            Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
        },
    };

    Json(state.dashboard.chart(&MonitorId::new(id), range).await).into_response()
}

pub async fn handle_heartbeats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.dashboard.heartbeats(&MonitorId::new(id)).await)
}

// ============================================================================
// API: Settings
// ============================================================================

pub async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.settings().get())
}

pub async fn handle_update_settings(
    State(state): State<AppState>,
    Json(req): Json<DisplaySettings>,
) -> impl IntoResponse {
    let settings = state.dashboard.settings();
    if !settings.update(req) {
        return (StatusCode::BAD_REQUEST, "utc offset out of range").into_response();
    }
    Json(settings.get()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::router;
    use crate::api::MonitorStatus;
    use crate::config::ServerConfig;
    use crate::dashboard::testing::{monitor, FakeApi};
    use crate::dashboard::Dashboard;
    use crate::settings::SettingsHandle;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;
    use tower::ServiceExt;

    async fn setup() -> (Arc<FakeApi>, Router) {
        let api = FakeApi::with_monitors(vec![
            monitor("1", MonitorStatus::Up),
            monitor("2", MonitorStatus::Down),
        ]);
        let dashboard = Arc::new(Dashboard::new(
            api.clone(),
            ServerConfig::default(),
            SettingsHandle::new(DisplaySettings::default()),
        ));
        sleep(Duration::from_millis(10)).await;
        (api, router(AppState { dashboard }))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn send_json(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_returns_ok() {
        let (_, app) = setup().await;
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_returns_view() {
        let (_, app) = setup().await;
        let response = app.oneshot(get("/api/dashboard")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["monitors"].as_array().unwrap().len(), 2);
        assert_eq!(json["rollup"]["down"], 1);
        assert_eq!(json["status"]["is_connected"], true);
        assert_eq!(json["edit_session"]["kind"], "idle");
        assert_eq!(json["suspended"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_embeds_view() {
        let (_, app) = setup().await;
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let page = body_text(response).await;
        assert!(page.contains("<title>StatusBoard</title>"));
        assert!(page.contains("monitor-1"));
        assert!(!page.contains("{{"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_monitor() {
        let (api, app) = setup().await;
        let response = app
            .clone()
            .oneshot(send_json(
                "POST",
                "/api/monitors",
                r#"{"name": "web", "url": "https://www.example.com"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(api.write_calls(), 1);

        sleep(Duration::from_millis(10)).await;
        let json = body_json(app.oneshot(get("/api/dashboard")).await.unwrap()).await;
        assert_eq!(json["monitors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_returns_bad_gateway() {
        let (api, app) = setup().await;
        api.reject_writes("url already monitored");

        let response = app
            .oneshot(send_json(
                "POST",
                "/api/monitors",
                r#"{"name": "web", "url": "https://www.example.com"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "url already monitored");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_monitor_returns_bad_request() {
        let (_, app) = setup().await;
        let response = app
            .oneshot(send_json(
                "POST",
                "/api/monitors",
                r#"{"name": "web", "url": "not a url"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_session_conflict() {
        let (_, app) = setup().await;

        let response = app
            .clone()
            .oneshot(send_json(
                "POST",
                "/api/edit-session",
                r#"{"kind": "edit", "monitor_id": 1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "monitor-1");

        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/edit-session", r#"{"kind": "create"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/edit-session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let json = body_json(app.oneshot(get("/api/edit-session")).await.unwrap()).await;
        assert_eq!(json["kind"], "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_unknown_monitor_is_not_found() {
        let (_, app) = setup().await;
        let response = app
            .oneshot(send_json(
                "POST",
                "/api/edit-session",
                r#"{"kind": "edit", "monitor_id": "99"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chart_range_validation() {
        let (_, app) = setup().await;
        let response = app
            .clone()
            .oneshot(get("/api/monitors/1/chart?range=2d"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get("/api/monitors/1/chart?range=6h"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["view"]["range"], "6h");
        assert_eq!(json["view"]["points"].as_array().unwrap().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_and_status() {
        let (_, app) = setup().await;
        let response = app
            .clone()
            .oneshot(get("/api/monitors/2/heartbeats"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["view"]["up_ratio"], 75.0);

        let json = body_json(app.oneshot(get("/api/status")).await.unwrap()).await;
        assert_eq!(json["heartbeats"][0]["monitor_id"], "2");
        assert!(json["charts"].as_array().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_round_trip() {
        let (_, app) = setup().await;
        let response = app
            .clone()
            .oneshot(send_json(
                "PUT",
                "/api/settings",
                r#"{"utc_offset_minutes": 90}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(app.clone().oneshot(get("/api/settings")).await.unwrap()).await;
        assert_eq!(json["utc_offset_minutes"], 90);

        let response = app
            .oneshot(send_json(
                "PUT",
                "/api/settings",
                r#"{"utc_offset_minutes": 100000}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_delete() {
        let (_, app) = setup().await;
        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/monitors/1/pause", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["paused"], true);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/monitors/2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/monitors/2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
