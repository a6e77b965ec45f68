pub mod llm {
    use serde::{Deserialize, Serialize};
    use std::future::Future;
    use thiserror::Error;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum Role {
        User,
        Assistant,
        System,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::User,
                content: s.into(),
            }
        }
    }

    #[derive(Clone, Debug)]
    pub struct ChatOpts {
        pub model: String,
        pub max_tokens: Option<u32>,
    }

    impl ChatOpts {
        pub fn new<S: Into<String>>(model: S) -> Self {
            Self {
                model: model.into(),
                max_tokens: None,
            }
        }

        pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
            self.max_tokens = Some(max_tokens);
            self
        }
    }

    #[derive(Clone, Debug)]
    pub struct ChatResult {
        pub text: String,
        pub finish_reason: Option<String>,
        pub prompt_tokens: Option<u32>,
        pub completion_tokens: Option<u32>,
    }

    impl ChatResult {
        pub fn text<S: Into<String>>(text: S) -> Self {
            Self {
                text: text.into(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            }
        }
    }

    /// Failure of a single upstream call.
    ///
    /// Status-bearing variants carry the upstream message prefixed with the
    /// numeric status, e.g. `401 Incorrect API key provided`.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ChatError {
        #[error("{message}")]
        Auth { status: u16, message: String },
        #[error("{0}")]
        RateLimit(String),
        #[error("{message}")]
        Status { status: u16, message: String },
        #[error("timeout: {0}")]
        Timeout(String),
        #[error("network: {0}")]
        Network(String),
        #[error("decode: {0}")]
        Decode(String),
        #[error("other: {0}")]
        Other(String),
    }

    impl ChatError {
        /// HTTP-equivalent status, when the upstream answered at all.
        pub fn status(&self) -> Option<u16> {
            match self {
                ChatError::Auth { status, .. } | ChatError::Status { status, .. } => Some(*status),
                ChatError::RateLimit(_) => Some(429),
                _ => None,
            }
        }

        pub fn is_rate_limited(&self) -> bool {
            self.status() == Some(429)
        }

        /// Raw message without the variant prefix.
        pub fn message(&self) -> &str {
            match self {
                ChatError::Auth { message, .. } | ChatError::Status { message, .. } => message,
                ChatError::RateLimit(m)
                | ChatError::Timeout(m)
                | ChatError::Network(m)
                | ChatError::Decode(m)
                | ChatError::Other(m) => m,
            }
        }
    }

    pub trait ModelClient: Send + Sync {
        fn send_chat(
            &self,
            msgs: &[Message],
            opts: &ChatOpts,
        ) -> impl Future<Output = Result<ChatResult, ChatError>> + Send;
    }
}

pub mod diagnosis;
pub mod probe;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
