//! In-memory [`ModelClient`] that replays scripted replies per model.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::sleep;

use crate::llm::{ChatError, ChatOpts, ChatResult, Message, ModelClient};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
}

#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ChatError>>>>,
    fallback: Option<Result<String, ChatError>>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used once the per-model script for a model is exhausted.
    pub fn with_fallback(mut self, reply: Result<String, ChatError>) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Every call waits this long before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn reply(self, model: &str, reply: Result<String, ChatError>) -> Self {
        lock(&self.replies)
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }
}

impl ModelClient for ScriptedClient {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError> {
        let prompt = msgs.last().map(|m| m.content.clone()).unwrap_or_default();
        lock(&self.calls).push(RecordedCall {
            model: opts.model.clone(),
            prompt,
            max_tokens: opts.max_tokens,
        });
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let scripted = lock(&self.replies)
            .get_mut(&opts.model)
            .and_then(|q| q.pop_front());
        match scripted.or_else(|| self.fallback.clone()) {
            Some(reply) => reply.map(ChatResult::text),
            None => Err(ChatError::Other(format!("no scripted reply for {}", opts.model))),
        }
    }
}
