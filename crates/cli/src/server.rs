use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use check_core::llm::ModelClient;
use check_core::probe::{smoke_check, ProbeSettings, Prober};
use serde::Deserialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::report::ProbeReport;

pub const KEY_NOT_CONFIGURED: &str = "OpenAI API key is not configured";
pub const KEY_MISSING: &str = "OpenAI API key is missing";

pub struct AppState<C> {
    /// `None` when no credential is configured; every route then fails fast.
    pub client: Option<C>,
    pub probe: ProbeSettings,
}

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    prompt: Option<String>,
}

pub fn router<C: ModelClient + 'static>(state: Arc<AppState<C>>, budget: Duration) -> Router {
    Router::new()
        .route("/api/test-models", get(test_models::<C>))
        .route("/api/test-openai", get(test_openai::<C>))
        .layer(TimeoutLayer::new(budget))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn json_error(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

async fn test_models<C: ModelClient>(
    State(state): State<Arc<AppState<C>>>,
    Query(q): Query<ProbeQuery>,
) -> Response {
    let Some(client) = state.client.as_ref() else {
        error!(target: "keycheck", "test-models: {}", KEY_NOT_CONFIGURED);
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": KEY_NOT_CONFIGURED }),
        );
    };
    let prompt = state.probe.prompt_or_default(q.prompt.as_deref());
    let results = Prober::from_settings(client, &state.probe)
        .probe_all(prompt, &state.probe.models)
        .await;
    let report = ProbeReport::new(results);
    info!(
        target: "keycheck",
        "test-models done total={} working={} api_key_valid={}",
        report.summary.total, report.summary.working_count, report.api_key_valid
    );
    Json(report).into_response()
}

async fn test_openai<C: ModelClient>(State(state): State<Arc<AppState<C>>>) -> Response {
    let Some(client) = state.client.as_ref() else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": KEY_MISSING }),
        );
    };
    match smoke_check(client).await {
        Ok(res) => Json(serde_json::json!({ "success": true, "text": res.text })).into_response(),
        Err(e) => {
            error!(target: "keycheck", "test-openai failed: {}", e);
            let status = match e.status() {
                Some(code) => serde_json::Value::from(code),
                None => serde_json::Value::from("unknown"),
            };
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": "OpenAI API test failed",
                    "message": e.to_string(),
                    "status": status,
                }),
            )
        }
    }
}
