use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::{HeaderValue, Method},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::agent::{Agent, RuntimeProfile};
use crate::agent_registry::FleetSummary;
use crate::api_errors::AppError;
use crate::app_state::AppState;
use crate::chain_analyzer::AnalysisResult;
use crate::input_validator::{CausalChainRequest, TrustEvaluationRequest};
use crate::trust_evaluator::TrustEvaluation;

/// Onboarding payload. Status and history are derived by the registry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardRequest {
    pub id: String,
    pub name: String,
    pub did: String,
    #[serde(default = "default_initial_score")]
    pub trust_score: f64,
    pub runtime: RuntimeProfile,
    #[serde(default)]
    pub credentials: BTreeSet<String>,
}

fn default_initial_score() -> f64 {
    0.5
}

impl From<OnboardRequest> for Agent {
    fn from(req: OnboardRequest) -> Self {
        Agent::new(req.id, req.name, req.did, req.trust_score, req.runtime)
            .with_credentials(req.credentials)
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub include_archived: bool,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);
    if origins.is_empty() {
        return base.allow_origin(AllowOrigin::any());
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Build the router exposing both engines, the registry, versioned aliases,
/// and health checks
pub fn build_trust_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let mut router = Router::new();
    for prefix in ["/api", "/v1"] {
        router = router
            .route(&format!("{prefix}/causal-chain/analyze"), post(analyze_chain))
            .route(&format!("{prefix}/trust/evaluate"), post(evaluate_trust))
            .route(&format!("{prefix}/agents"), get(list_agents).post(onboard_agent))
            .route(&format!("{prefix}/agents/{{id}}"), get(get_agent))
            .route(&format!("{prefix}/agents/{{id}}/revoke"), post(revoke_agent))
            .route(&format!("{prefix}/agents/{{id}}/reinstate"), post(reinstate_agent))
            .route(&format!("{prefix}/agents/{{id}}/archive"), post(archive_agent))
            .route(&format!("{prefix}/agents/{{id}}/heartbeat"), post(heartbeat))
            .route(&format!("{prefix}/agents/{{id}}/disconnect"), post(disconnect))
            .route(&format!("{prefix}/dashboard/summary"), get(summary));
    }
    router
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(cors)
        .layer(Extension(state))
}

#[axum::debug_handler]
async fn analyze_chain(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CausalChainRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AppError> {
    let req = json_body(body)?;
    Ok(Json(state.service.analyze_causal_chain(req).await?))
}

#[axum::debug_handler]
async fn evaluate_trust(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<TrustEvaluationRequest>, JsonRejection>,
) -> Result<Json<TrustEvaluation>, AppError> {
    let req = json_body(body)?;
    Ok(Json(state.service.evaluate_trust(req).await?))
}

#[axum::debug_handler]
async fn list_agents(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Agent>>, AppError> {
    Ok(Json(state.registry().list(params.include_archived)?))
}

#[axum::debug_handler]
async fn onboard_agent(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<OnboardRequest>, JsonRejection>,
) -> Result<Json<Agent>, AppError> {
    let req = json_body(body)?;
    Ok(Json(state.service.onboard_agent(req.into())?))
}

#[axum::debug_handler]
async fn get_agent(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(state.registry().require(&id)?))
}

#[axum::debug_handler]
async fn revoke_agent(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<Agent>, AppError> {
    let req = json_body(body)?;
    if req.reason.trim().is_empty() {
        return Err(AppError::bad_request("Validation error for reason: reason cannot be empty"));
    }
    Ok(Json(state.service.revoke_agent(&id, req.reason.trim()).await?))
}

#[axum::debug_handler]
async fn reinstate_agent(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(state.service.reinstate_agent(&id).await?))
}

#[axum::debug_handler]
async fn archive_agent(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(state.service.archive_agent(&id).await?))
}

#[axum::debug_handler]
async fn heartbeat(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(state.service.set_connectivity(&id, true).await?))
}

#[axum::debug_handler]
async fn disconnect(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(state.service.set_connectivity(&id, false).await?))
}

#[axum::debug_handler]
async fn summary(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<FleetSummary>, AppError> {
    Ok(Json(state.service.summary()?))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let ready = state.registry().list(true).is_ok();
    Json(serde_json::json!({ "ready": ready }))
}
