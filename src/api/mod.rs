// HTTP API routes: a thin caller over the combat engine.

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::db::{Database, Fight, NewShot};
use crate::engine::boost::{self, BoostParams};
use crate::engine::chase::{self, ChaseUpdate};
use crate::engine::combat::{self, CombatUpdate};
use crate::engine::fight;
use crate::engine::up_check::{self, UpCheckParams};
use crate::error::CombatError;
use crate::metrics;
use crate::notify::{BroadcastNotifier, FightNotification, NotificationSink};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateFightRequest {
    pub name: String,
    pub campaign_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CombatActionRequest {
    pub updates: Vec<CombatUpdate>,
}

#[derive(Deserialize)]
pub struct ChaseActionRequest {
    pub updates: Vec<ChaseUpdate>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub notifier: BroadcastNotifier,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, kind: &str, msg: &str) -> Response {
    (status, Json(json!({ "error": kind, "message": msg }))).into_response()
}

fn combat_error(e: CombatError) -> Response {
    let status = match &e {
        CombatError::NotFound { .. } => StatusCode::NOT_FOUND,
        CombatError::TenancyViolation { .. } => StatusCode::FORBIDDEN,
        CombatError::InsufficientResource(_) => StatusCode::CONFLICT,
        CombatError::ValidationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CombatError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Database error: {e}");
        return json_error(status, e.kind(), "Internal server error");
    }
    json_error(status, e.kind(), &e.to_string())
}

/// Tell subscribers the fight changed. Runs after commit; failures are logged only.
fn notify(sink: &dyn NotificationSink, action: &'static str, fight: &Fight) {
    if let Err(e) = sink.fight_updated(FightNotification::new(action, fight)) {
        tracing::warn!(fight_id = fight.id, action, "notification failed: {e}");
    }
}

fn action_response(
    state: &AppState,
    action: &'static str,
    result: crate::error::Result<Fight>,
) -> Response {
    match result {
        Ok(fight) => {
            notify(&state.notifier, action, &fight);
            (StatusCode::OK, Json(json!(fight))).into_response()
        }
        Err(e) => combat_error(e),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(db: Arc<Database>, notifier: BroadcastNotifier) -> Router {
    let state = AppState { db, notifier };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Fights
        .route("/api/fights", get(list_fights).post(create_fight))
        .route("/api/fights/{id}", get(get_fight).delete(archive_fight))
        .route("/api/fights/{id}/shots", post(add_shot))
        .route("/api/fights/{id}/sequence", post(advance_sequence))
        .route("/api/fights/{id}/events", get(list_events))
        // Actions
        .route("/api/fights/{id}/combat_actions", post(combat_action))
        .route("/api/fights/{id}/chase_actions", post(chase_action))
        .route(
            "/api/fights/{id}/chase_relationships",
            get(list_chase_relationships),
        )
        .route("/api/fights/{id}/boosts", post(apply_boost))
        .route("/api/fights/{id}/up_checks", post(apply_up_check))
        // WebSocket
        .route("/ws/fights/{id}", get(ws::ws_fight))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "shot-counter-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Fight handlers ────────────────────────────────────────────────────

async fn list_fights(State(state): State<AppState>) -> impl IntoResponse {
    match fight::list_fights(&state.db).await {
        Ok(fights) => (StatusCode::OK, Json(json!(fights))).into_response(),
        Err(e) => combat_error(e),
    }
}

async fn create_fight(
    State(state): State<AppState>,
    Json(req): Json<CreateFightRequest>,
) -> impl IntoResponse {
    match fight::create_fight(&state.db, &req.name, req.campaign_id).await {
        Ok(created) => (StatusCode::CREATED, Json(json!(created))).into_response(),
        Err(e) => combat_error(e),
    }
}

async fn get_fight(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match fight::fight_view(&state.db, id).await {
        Ok(view) => (StatusCode::OK, Json(json!(view))).into_response(),
        Err(e) => combat_error(e),
    }
}

async fn archive_fight(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let result = fight::archive_fight(&state.db, id).await;
    action_response(&state, "archive", result)
}

async fn add_shot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NewShot>,
) -> impl IntoResponse {
    match fight::add_shot(&state.db, id, &req).await {
        Ok(shot) => {
            if let Ok(current) = fight::get_fight(&state.db, id).await {
                notify(&state.notifier, "join", &current);
            }
            (StatusCode::CREATED, Json(json!(shot))).into_response()
        }
        Err(e) => combat_error(e),
    }
}

async fn advance_sequence(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let result = fight::advance_sequence(&state.db, id).await;
    action_response(&state, "sequence", result)
}

async fn list_events(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match fight::list_events(&state.db, id).await {
        Ok(events) => (StatusCode::OK, Json(json!(events))).into_response(),
        Err(e) => combat_error(e),
    }
}

// ── Action handlers ───────────────────────────────────────────────────

async fn combat_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CombatActionRequest>,
) -> impl IntoResponse {
    let result = combat::apply_combat_action(&state.db, id, &req.updates).await;
    action_response(&state, "combat_action", result)
}

async fn chase_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ChaseActionRequest>,
) -> impl IntoResponse {
    let result = chase::apply_chase_action(&state.db, id, &req.updates).await;
    action_response(&state, "chase_action", result)
}

async fn list_chase_relationships(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match chase::list_relationships(&state.db, id).await {
        Ok(relationships) => (StatusCode::OK, Json(json!(relationships))).into_response(),
        Err(e) => combat_error(e),
    }
}

async fn apply_boost(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(params): Json<BoostParams>,
) -> impl IntoResponse {
    let result = boost::apply_boost(&state.db, id, &params).await;
    action_response(&state, "boost", result)
}

async fn apply_up_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(params): Json<UpCheckParams>,
) -> impl IntoResponse {
    let result = up_check::apply_up_check(&state.db, id, &params).await;
    action_response(&state, "up_check", result)
}
