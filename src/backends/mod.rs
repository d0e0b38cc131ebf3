use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cli::BackendKind;

mod gemini;
mod http;
mod mistral;
mod openai;
mod tesseract;

pub use gemini::GeminiBackend;
pub use mistral::MistralOcrBackend;
pub use openai::OpenAiBackend;
pub use tesseract::TesseractBackend;

pub type SharedBackend = Arc<dyn Backend>;

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Credential variables reported in the run environment section.
pub const CREDENTIAL_KEYS: [&str; 3] = ["GEMINI_API_KEY", "MISTRAL_API_KEY", "OPENAI_API_KEY"];

/// Deadline and retry budget for one governed backend invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            backoff_base,
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            0,
            Duration::from_secs(1),
        )
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    MissingCredential(String),
    #[error("image not readable: {path}: {reason}")]
    ImageUnreadable { path: String, reason: String },
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Engine(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

/// One extraction attempt against a backend. Retries, deadlines and the
/// translation into a `BackendResult` belong to the governor.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> CallPolicy;

    async fn attempt(&self, image_path: &Path) -> Result<String, BackendError>;
}

/// Environment snapshot used to configure backends once per run.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    values: HashMap<String, String>,
}

impl BackendSettings {
    pub fn from_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim().trim_matches('"').trim_matches('\''))
            .filter(|value| !value.is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn policy(&self, prefix: &str, defaults: CallPolicy) -> Result<CallPolicy> {
        let timeout_key = format!("{prefix}_TIMEOUT_SEC");
        let retries_key = format!("{prefix}_MAX_RETRIES");
        let backoff_key = format!("{prefix}_BACKOFF_BASE_SEC");

        let timeout = match self.get(&timeout_key) {
            Some(raw) => parse_seconds(&timeout_key, raw)?,
            None => defaults.timeout,
        };
        if timeout.is_zero() {
            bail!("{timeout_key} must be greater than zero");
        }

        let max_retries = match self.get(&retries_key) {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("invalid {retries_key}: {raw}"))?,
            None => defaults.max_retries,
        };

        let backoff_base = match self.get(&backoff_key) {
            Some(raw) => parse_seconds(&backoff_key, raw)?,
            None => defaults.backoff_base,
        };

        Ok(CallPolicy::new(timeout, max_retries, backoff_base))
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    let seconds = raw
        .parse::<f64>()
        .with_context(|| format!("invalid {key}: {raw}"))?;
    Duration::try_from_secs_f64(seconds).with_context(|| format!("invalid {key}: {raw}"))
}

/// Builds adapters in priority order, dropping repeated kinds.
pub fn build_backends(kinds: &[BackendKind], settings: &BackendSettings) -> Result<Vec<SharedBackend>> {
    let mut seen = Vec::<BackendKind>::new();
    let mut backends = Vec::<SharedBackend>::new();

    for kind in kinds {
        if seen.contains(kind) {
            continue;
        }
        seen.push(*kind);

        let backend: SharedBackend = match kind {
            BackendKind::Gemini => Arc::new(GeminiBackend::from_settings(settings)?),
            BackendKind::MistralOcr2 => Arc::new(MistralOcrBackend::from_settings(settings)?),
            BackendKind::OpenAi => Arc::new(OpenAiBackend::from_settings(settings)?),
            BackendKind::Tesseract => Arc::new(TesseractBackend::from_settings(settings)?),
        };
        debug!(
            backend = kind.as_str(),
            timeout_sec = backend.policy().timeout.as_secs_f64(),
            max_retries = backend.policy().max_retries,
            "backend configured"
        );
        backends.push(backend);
    }

    if backends.is_empty() {
        bail!("no backends selected");
    }

    Ok(backends)
}
