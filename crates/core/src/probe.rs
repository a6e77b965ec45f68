//! Sequential multi-model probing.
//!
//! Every model in the catalog receives one small single-turn completion. Runs
//! are strictly sequential with a pause between requests: probing in parallel
//! trips per-credential rate limits and turns healthy models into failures.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::llm::{ChatError, ChatOpts, ChatResult, Message, ModelClient};

pub const DEFAULT_PROMPT: &str = "Say hello in exactly 5 words.";

pub const DEFAULT_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
];

pub const DEFAULT_MAX_TOKENS: u32 = 50;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

pub const UNKNOWN_ERROR: &str = "Unknown error";

pub const SMOKE_MODEL: &str = "gpt-4o";
pub const SMOKE_PROMPT: &str = "Hello, world!";

/// Outcome of probing one model. Either `response` and `latency_ms` or
/// `error` is set, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProbeResult {
    model: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

impl ModelProbeResult {
    pub fn succeeded<M: Into<String>, R: Into<String>>(model: M, response: R, latency_ms: u64) -> Self {
        Self {
            model: model.into(),
            success: true,
            response: Some(response.into()),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failed<M: Into<String>, E: Into<String>>(model: M, error: E) -> Self {
        Self {
            model: model.into(),
            success: false,
            response: None,
            error: Some(error.into()),
            latency_ms: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSettings {
    pub models: Vec<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub pause: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            pause: DEFAULT_PAUSE,
        }
    }
}

impl ProbeSettings {
    /// Worst-case wall time of a full run when each request may take up to
    /// `per_request` before the transport gives up.
    pub fn run_budget(&self, per_request: Duration) -> Duration {
        let per_model = per_request.saturating_add(self.pause);
        per_model.saturating_mul(self.models.len() as u32)
    }

    /// Prompt to use for a run: the caller's when non-empty, else the configured one.
    pub fn prompt_or_default<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(p) if !p.is_empty() => p,
            _ => &self.prompt,
        }
    }
}

/// Progress hooks for a run. Both default to no-ops.
pub trait ProbeObserver {
    fn on_start(&mut self, _model: &str) {}
    fn on_result(&mut self, _result: &ModelProbeResult) {}
}

impl ProbeObserver for () {}

pub struct Prober<'a, C> {
    client: &'a C,
    max_tokens: u32,
    pause: Duration,
}

impl<'a, C: ModelClient> Prober<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            max_tokens: DEFAULT_MAX_TOKENS,
            pause: DEFAULT_PAUSE,
        }
    }

    pub fn from_settings(client: &'a C, settings: &ProbeSettings) -> Self {
        Self {
            client,
            max_tokens: settings.max_tokens,
            pause: settings.pause,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// One-shot probe of a single model. Upstream failures become a failed
    /// result rather than an error.
    pub async fn probe(&self, model: &str, prompt: &str) -> ModelProbeResult {
        info!(target: "probe", "probing model={} max_tokens={}", model, self.max_tokens);
        let start = Instant::now();
        let opts = ChatOpts::new(model).with_max_tokens(self.max_tokens);
        match self.client.send_chat(&[Message::user(prompt)], &opts).await {
            Ok(res) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                info!(
                    target: "probe",
                    "model={} ok latency_ms={} finish={:?} completion_tokens={:?}",
                    model, latency_ms, res.finish_reason, res.completion_tokens
                );
                ModelProbeResult::succeeded(model, res.text.trim(), latency_ms)
            }
            Err(e) => {
                warn!(target: "probe", "model={} failed status={:?} err={}", model, e.status(), e);
                ModelProbeResult::failed(model, describe(&e))
            }
        }
    }

    pub async fn probe_all<S: AsRef<str>>(&self, prompt: &str, models: &[S]) -> Vec<ModelProbeResult> {
        self.probe_all_with(prompt, models, &mut ()).await
    }

    /// Probes `models` in order, reporting each request to `observer` before
    /// it is sent and again once its result is recorded.
    pub async fn probe_all_with<S, O>(
        &self,
        prompt: &str,
        models: &[S],
        observer: &mut O,
    ) -> Vec<ModelProbeResult>
    where
        S: AsRef<str>,
        O: ProbeObserver,
    {
        let mut results = Vec::with_capacity(models.len());
        for model in models {
            observer.on_start(model.as_ref());
            let result = self.probe(model.as_ref(), prompt).await;
            observer.on_result(&result);
            results.push(result);
            sleep(self.pause).await;
        }
        results
    }
}

/// Single uncapped completion against [`SMOKE_MODEL`]; errors are returned
/// as-is so callers can report the upstream status.
pub async fn smoke_check<C: ModelClient>(client: &C) -> Result<ChatResult, ChatError> {
    info!(target: "probe", "smoke check model={}", SMOKE_MODEL);
    client
        .send_chat(&[Message::user(SMOKE_PROMPT)], &ChatOpts::new(SMOKE_MODEL))
        .await
}

fn describe(e: &ChatError) -> String {
    if e.message().trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        e.to_string()
    }
}
