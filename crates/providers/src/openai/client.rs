use crate::openai::config::OpenAiConfig;
use anyhow::Context;
use check_core::llm::{ChatError, ChatOpts, ChatResult, Message, ModelClient, Role};
use reqwest::{header, Client, StatusCode};
use tokio::time::Duration;
use tracing::{debug, error};

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = cfg.require_api_key()?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("api key is not a valid header value")?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .timeout(cfg.timeout);
        if let Some(p) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(p).with_context(|| format!("proxy {}", p))?);
        }
        let http = builder.build()?;
        Ok(Self { http, cfg })
    }

    fn map_messages(&self, msgs: &[Message]) -> Vec<serde_json::Value> {
        msgs.iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                serde_json::json!({"role": role, "content": m.content})
            })
            .collect()
    }

    fn request_body(&self, msgs: &[Message], opts: &ChatOpts) -> serde_json::Value {
        serde_json::json!({
            "model": opts.model,
            "messages": self.map_messages(msgs),
            "stream": false,
            "max_tokens": opts.max_tokens,
        })
    }
}

impl ModelClient for OpenAiClient {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        debug!(target:"providers::openai","chat model={} max_tokens={:?} url={}", opts.model, opts.max_tokens, url);
        let body = self.request_body(msgs, opts);
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.ok();
            error!(target:"providers::openai","chat non-200 model={} status={} body={:?}", opts.model, status, body);
            return Err(map_status_err(status, body));
        }
        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        parse_chat_completion(&v)
    }
}

fn parse_chat_completion(v: &serde_json::Value) -> Result<ChatResult, ChatError> {
    let choice = v["choices"]
        .get(0)
        .ok_or_else(|| ChatError::Decode("response has no choices".into()))?;
    // content is null for refusals and tool calls
    let text = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    Ok(ChatResult {
        text,
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        prompt_tokens: v["usage"]["prompt_tokens"].as_u64().map(|n| n as u32),
        completion_tokens: v["usage"]["completion_tokens"].as_u64().map(|n| n as u32),
    })
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ChatError::Network(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

/// Prefers the `error.message` of an OpenAI error body over the raw body.
fn upstream_message(body: Option<String>) -> String {
    let body = body.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body)
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ChatError {
    let code = status.as_u16();
    let message = format!("{} {}", code, upstream_message(body).trim())
        .trim_end()
        .to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth {
            status: code,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimit(message),
        _ => ChatError::Status {
            status: code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::config::OpenAiFileConfig;

    #[test]
    fn unauthorized_body_becomes_auth_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided: sk-abc. You can find your API key at https://platform.openai.com/account/api-keys.","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = map_status_err(StatusCode::UNAUTHORIZED, Some(body.to_string()));
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, ChatError::Auth { .. }));
        assert!(err.to_string().starts_with("401 Incorrect API key provided"));
    }

    #[test]
    fn too_many_requests_is_rate_limit() {
        let err = map_status_err(StatusCode::TOO_MANY_REQUESTS, Some("slow down".into()));
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "429 slow down");
    }

    #[test]
    fn unknown_model_keeps_status() {
        let body = r#"{"error":{"message":"The model `gpt-9` does not exist or you do not have access to it."}}"#;
        let err = map_status_err(StatusCode::NOT_FOUND, Some(body.into()));
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "404 The model `gpt-9` does not exist or you do not have access to it."
        );
    }

    #[test]
    fn empty_body_is_just_the_status() {
        let err = map_status_err(StatusCode::BAD_GATEWAY, None);
        assert_eq!(err.to_string(), "502");
    }

    #[test]
    fn parses_completion_and_usage() {
        let v = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello there, nice to meet!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 14, "completion_tokens": 7}
        });
        let r = parse_chat_completion(&v).unwrap();
        assert_eq!(r.text, "Hello there, nice to meet!");
        assert_eq!(r.finish_reason.as_deref(), Some("stop"));
        assert_eq!((r.prompt_tokens, r.completion_tokens), (Some(14), Some(7)));
    }

    #[test]
    fn missing_choices_is_decode_error() {
        let err = parse_chat_completion(&serde_json::json!({"object": "chat.completion"})).unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
    }

    #[test]
    fn client_requires_key() {
        let cfg = OpenAiConfig::from_parts(|_| None, OpenAiFileConfig::default()).unwrap();
        let err = OpenAiClient::new(cfg).err().unwrap();
        assert_eq!(err.to_string(), "OpenAI API key is not configured");
    }

    #[test]
    fn messages_use_wire_roles() {
        let cfg = OpenAiConfig::from_parts(
            |k| (k == "OPENAI_API_KEY").then(|| "sk-test".to_string()),
            OpenAiFileConfig::default(),
        )
        .unwrap();
        let client = OpenAiClient::new(cfg).unwrap();
        let v = client.map_messages(&[Message::user("hi")]);
        assert_eq!(v[0], serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn body_sends_only_model_messages_and_cap() {
        let cfg = OpenAiConfig::from_parts(
            |k| (k == "OPENAI_API_KEY").then(|| "sk-test".to_string()),
            OpenAiFileConfig::default(),
        )
        .unwrap();
        let client = OpenAiClient::new(cfg).unwrap();
        let body = client.request_body(
            &[Message::user("hi")],
            &ChatOpts::new("gpt-4o").with_max_tokens(50),
        );
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
                "max_tokens": 50,
            })
        );
    }
}
