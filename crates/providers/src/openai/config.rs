use check_core::probe::ProbeSettings;
use check_core::retry::{RetryPolicy, DEFAULT_GENERATE_MODEL};
use directories::BaseDirs;
use serde::Deserialize;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BUDGET_SLACK: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub request_budget_ms: Option<u64>,
    pub probe: Option<ProbeFileConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProbeFileConfig {
    pub models: Option<Vec<String>>,
    pub prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub pause_ms: Option<u64>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,
    #[error("invalid base url {url}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// `None` when `OPENAI_API_KEY` is unset or empty.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used for one-shot generation.
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub probe: ProbeSettings,
    /// Upper bound for one inbound probe request.
    pub request_budget: Duration,
    pub proxy: Option<String>,
}

impl OpenAiConfig {
    /// Environment first, then the TOML file at `path` (or the default
    /// location when `None`). A missing key is not an error here; see
    /// [`OpenAiConfig::require_api_key`].
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file_cfg = match path.map(Path::to_path_buf).or_else(Self::config_path) {
            Some(p) if p.exists() => Self::read_file(&p)?,
            Some(p) if path.is_some() => {
                return Err(ConfigError::Read {
                    path: p,
                    source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
                })
            }
            _ => OpenAiFileConfig::default(),
        };
        Self::from_parts(|k| env::var(k).ok(), file_cfg)
    }

    pub fn from_parts<E>(env: E, file_cfg: OpenAiFileConfig) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let api_key = env("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let base_url = env("OPENAI_BASE_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url).map_err(|source| ConfigError::BaseUrl {
            url: base_url.clone(),
            source,
        })?;

        let mut model = DEFAULT_GENERATE_MODEL.to_string();
        let mut timeout_ms = 30_000u64;
        let mut retry = RetryPolicy::default();
        let mut probe = ProbeSettings::default();

        if let Some(m) = file_cfg.model {
            model = m;
        }
        if let Some(t) = file_cfg.timeout_ms {
            timeout_ms = t;
        }
        if let Some(r) = file_cfg.retry_max_attempts {
            retry = retry.with_max_attempts(r);
        }
        if let Some(p) = file_cfg.probe {
            if let Some(models) = p.models {
                probe.models = models;
            }
            if let Some(prompt) = p.prompt {
                probe.prompt = prompt;
            }
            if let Some(max) = p.max_tokens {
                probe.max_tokens = max;
            }
            if let Some(pause) = p.pause_ms {
                probe.pause = Duration::from_millis(pause);
            }
        }

        let timeout = Duration::from_millis(timeout_ms);
        // Unless pinned, cover every model hitting the transport timeout plus the pauses.
        let request_budget = match file_cfg.request_budget_ms {
            Some(ms) => Duration::from_millis(ms),
            None => probe.run_budget(timeout) + BUDGET_SLACK,
        };

        let proxy = env("HTTPS_PROXY").or_else(|| env("HTTP_PROXY"));

        Ok(OpenAiConfig {
            api_key,
            base_url,
            model,
            timeout,
            retry,
            probe,
            request_budget,
            proxy,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// `sk-...abcd`: first three and last four characters.
    pub fn masked_api_key(&self) -> Option<String> {
        let key: Vec<char> = self.api_key.as_deref()?.chars().collect();
        if key.len() < 8 {
            return Some("***".to_string());
        }
        let head: String = key[..3].iter().collect();
        let tail: String = key[key.len() - 4..].iter().collect();
        Some(format!("{}...{}", head, tail))
    }

    fn read_file(path: &Path) -> Result<OpenAiFileConfig, ConfigError> {
        debug!(target: "providers::openai", "loading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".keycheck").join("config.toml")
        } else {
            base.config_dir().join("keycheck").join("config.toml")
        };
        Some(p)
    }
}
