use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::llm::{ChatError, ChatOpts, ChatResult, Message, ModelClient};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_GENERATE_MODEL: &str = "gpt-4o-mini";

/// Retry only on rate limiting (status 429), backing off `base * 2^n`
/// before retry `n` (counting from zero).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

pub async fn with_rate_limit_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ChatError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_rate_limited() && retries + 1 < max_attempts => {
                let delay = policy.backoff(retries);
                warn!(target: "retry", "rate limited (attempt {}), backing off {:?}", retries + 1, delay);
                sleep(delay).await;
                retries += 1;
            }
            Err(e) => {
                debug!(target: "retry", "giving up after {} attempt(s): {}", retries + 1, e);
                return Err(e);
            }
        }
    }
}

/// Single-turn completion with no token cap, retried on rate limiting.
pub async fn generate_with_retry<C: ModelClient>(
    client: &C,
    model: &str,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<ChatResult, ChatError> {
    let msgs = [Message::user(prompt)];
    let opts = ChatOpts::new(model);
    with_rate_limit_retry(policy, || client.send_chat(&msgs, &opts)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;
    use tokio::time::Instant;

    fn limited() -> ChatError {
        ChatError::RateLimit("429 Rate limit reached".into())
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_rate_limits() {
        let client = ScriptedClient::new()
            .reply("m", Err(limited()))
            .reply("m", Err(limited()))
            .reply("m", Ok("done".into()));
        let start = Instant::now();
        let res = generate_with_retry(&client, "m", "p", &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(res.text, "done");
        assert_eq!(client.calls().len(), 3);
        // 1s then 2s
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_propagate_immediately() {
        let client = ScriptedClient::new()
            .reply("m", Err(ChatError::Timeout("slow".into())))
            .reply("m", Ok("never".into()));
        let start = Instant::now();
        let err = generate_with_retry(&client, "m", "p", &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Timeout("slow".into()));
        assert_eq!(client.calls().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_last_error() {
        let client = ScriptedClient::new().with_fallback(Err(limited()));
        let err = generate_with_retry(&client, "m", "p", &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(client.calls().len(), DEFAULT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_status_is_not_retried() {
        let mut attempts = 0;
        let res: Result<(), _> = with_rate_limit_retry(&RetryPolicy::default(), || {
            attempts += 1;
            async {
                Err(ChatError::Auth {
                    status: 401,
                    message: "401 Incorrect API key provided".into(),
                })
            }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
    }
}
