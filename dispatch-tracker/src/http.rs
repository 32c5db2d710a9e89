/**
 * API REST DISPATCH - Exposition de la vue live
 *
 * RÔLE :
 * Surface d'interaction opérateur : liste des urgences, sélection explicite,
 * état de la carte et santé du polling.
 *
 * ROUTES :
 * - GET  /health                  (sans clé)
 * - GET  /status                  statut vue + compteurs polling
 * - GET  /incidents               liste, ordre serveur, flag `selected`
 * - GET  /incidents/selected      record sélectionné + overlays planifiés
 * - POST /incidents/{id}/select   sélection explicite
 * - GET  /map                     scène rendue (marqueurs, route, viewport)
 *
 * SÉCURITÉ : header x-api-key (DISPATCH_API_KEY) sur toutes les routes sauf /health
 */

use crate::health::{PollHealth, PollHealthReport};
use crate::map::{SceneReader, SceneState};
use crate::models::IncidentRecord;
use crate::overlay::OverlaySpec;
use crate::selection::SnapshotDiff;
use crate::state::SharedView;
use crate::view::{ListEntry, ViewStatus};
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check toujours accessible
    if path.starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("DISPATCH_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("[http] DISPATCH_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AppState {
    pub view: SharedView,
    pub health: PollHealth,
    pub scene: Option<SceneReader>,
    pub facility_id: String,
}

#[derive(Serialize)]
struct StatusView {
    facility_id: String,
    status: ViewStatus,
    selection: Option<String>,
    active_incidents: usize,
    last_diff: SnapshotDiff,
    last_fetch_error: Option<String>,
    poll: PollHealthReport,
}

#[derive(Serialize)]
struct SelectedView {
    record: IncidentRecord,
    overlays: OverlaySpec,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .route("/incidents", get(list_incidents))
        .route("/incidents/selected", get(get_selected))
        .route("/incidents/{id}/select", post(select_incident))
        .route("/map", get(get_map))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    let view = app.view.lock();
    Json(StatusView {
        facility_id: app.facility_id.clone(),
        status: view.status(),
        selection: view.selection().map(str::to_string),
        active_incidents: view.snapshot().len(),
        last_diff: view.last_diff().clone(),
        last_fetch_error: view.last_fetch_error().map(str::to_string),
        poll: app.health.report(),
    })
}

// GET /incidents (liste)
async fn list_incidents(State(app): State<AppState>) -> Json<Vec<ListEntry>> {
    let now = OffsetDateTime::now_utc();
    Json(app.view.lock().list_entries(now))
}

// GET /incidents/selected (détail)
async fn get_selected(State(app): State<AppState>) -> Result<Json<SelectedView>, StatusCode> {
    let view = app.view.lock();
    let Some(record) = view.selected_record() else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(SelectedView {
        record: record.clone(),
        overlays: view.overlay_spec(),
    }))
}

// POST /incidents/{id}/select (clic sur une ligne de la liste)
async fn select_incident(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut view = app.view.lock();
    if view.is_closed() {
        return Err(StatusCode::CONFLICT);
    }
    if !view.snapshot().contains(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    view.select_explicit(&id);
    Ok(Json(serde_json::json!({ "ok": true, "selection": id })))
}

// GET /map (scène rendue)
async fn get_map(State(app): State<AppState>) -> Result<Json<SceneState>, (StatusCode, Json<ViewStatus>)> {
    match &app.scene {
        Some(reader) => Ok(Json(reader.state())),
        None => Err((StatusCode::SERVICE_UNAVAILABLE, Json(app.view.lock().status()))),
    }
}
