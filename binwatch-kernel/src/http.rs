/**
 * API REST BINWATCH - Déclencheur externe des passes + CRUD du registre
 *
 * RÔLE :
 * Le kernel ne poll jamais tout seul : ce sont les appels à
 * `/passes/levels` et `/passes/alerts` qui lancent une passe. Le reste de
 * l'API sert l'enregistrement des poubelles et l'affichage (cartes, carte,
 * historique) côté dashboard.
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Pas de clé configurée → accès refusé (401)
 * - La clé de lecture ThingSpeak n'est jamais renvoyée par l'API
 */

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::KernelConfig;
use crate::evaluator::{PassKind, PassReport};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Bin, HistoryRecord};
use crate::registry::RegistryError;
use crate::source::LevelSource;
use crate::state::{Shared, SharedEvaluator};

pub struct AppState<S> {
    pub evaluator: SharedEvaluator<S>,
    pub cfg: Shared<KernelConfig>,
    pub health: HealthTracker,
    pub api_key: ApiKey,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
            cfg: self.cfg.clone(),
            health: self.health.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

/// Clé attendue dans `x-api-key` (`None` = tout refuser)
#[derive(Clone)]
pub struct ApiKey(Arc<Option<String>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(Arc::new(key.filter(|k| !k.is_empty())))
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("BINWATCH_API_KEY").ok())
    }
}

async fn require_api_key(State(expected): State<ApiKey>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = expected.0.as_deref() else {
        warn!("SECURITY: BINWATCH_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

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

#[derive(Debug, Serialize, Deserialize)]
pub struct BinView {
    pub id: String,
    pub channel_id: String,
    pub lat: f64,
    pub lon: f64,
    pub alerted: bool,
}

/// Coordonnée reçue du formulaire : nombre JSON ou texte
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CoordIn {
    Number(f64),
    Text(String),
}

impl CoordIn {
    fn value(&self) -> f64 {
        match self {
            CoordIn::Number(v) => *v,
            CoordIn::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewBin {
    pub id: String,
    pub channel_id: String,
    pub read_key: String,
    pub lat: CoordIn,
    pub lon: CoordIn,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn registry_error(e: RegistryError) -> ApiError {
    let code = match &e {
        RegistryError::DuplicateId(_) => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::InvalidBin(_) => StatusCode::BAD_REQUEST,
        RegistryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(serde_json::json!({ "error": e.to_string() })))
}

pub fn build_router<S: LevelSource + 'static>(app_state: AppState<S>) -> Router {
    let api_key = app_state.api_key.clone();
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health::<S>))
        .route("/bins", get(list_bins::<S>).post(add_bin::<S>))
        .route("/bins/{id}", delete(delete_bin::<S>))
        .route("/passes/levels", post(run_levels::<S>))
        .route("/passes/alerts", post(run_alerts::<S>))
        .route("/history", get(get_history::<S>))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(api_key, require_api_key))
}

// GET /system/health (ne prend pas le verrou de l'évaluateur)
async fn get_system_health<S: LevelSource>(State(app): State<AppState<S>>) -> Json<KernelHealth> {
    let cfg = app.cfg.lock().clone();
    Json(app.health.get_health(&cfg))
}

// GET /bins
async fn list_bins<S: LevelSource>(State(app): State<AppState<S>>) -> Json<Vec<BinView>> {
    let eval = app.evaluator.lock().await;
    let list = eval
        .registry()
        .list()
        .iter()
        .map(|b| BinView {
            id: b.id.clone(),
            channel_id: b.source.channel_id.clone(),
            lat: b.lat,
            lon: b.lon,
            alerted: eval.states().is_alerted(&b.id),
        })
        .collect();
    Json(list)
}

// POST /bins
async fn add_bin<S: LevelSource>(
    State(app): State<AppState<S>>,
    Json(input): Json<NewBin>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let bin = Bin::new(input.id, input.channel_id, input.read_key, input.lat.value(), input.lon.value());
    let mut eval = app.evaluator.lock().await;
    eval.add_bin(bin).map_err(registry_error)?;
    let id = eval.registry().list().last().map(|b| b.id.clone()).unwrap_or_default();
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id, "status": "created" }))))
}

// DELETE /bins/{id}
async fn delete_bin<S: LevelSource>(
    State(app): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = app.evaluator.lock().await.remove_bin(&id).map_err(registry_error)?;
    Ok(Json(serde_json::json!({ "id": removed.id, "status": "deleted" })))
}

// POST /passes/levels
async fn run_levels<S: LevelSource>(State(app): State<AppState<S>>) -> Json<PassReport> {
    let report = app.evaluator.lock().await.run_pass(PassKind::Levels, OffsetDateTime::now_utc()).await;
    Json(report)
}

// POST /passes/alerts
async fn run_alerts<S: LevelSource>(State(app): State<AppState<S>>) -> Json<PassReport> {
    let report = app.evaluator.lock().await.run_pass(PassKind::Alerts, OffsetDateTime::now_utc()).await;
    Json(report)
}

// GET /history (purge avant lecture)
async fn get_history<S: LevelSource>(State(app): State<AppState<S>>) -> Json<Vec<HistoryRecord>> {
    let mut eval = app.evaluator.lock().await;
    Json(eval.history_at(OffsetDateTime::now_utc()).to_vec())
}
