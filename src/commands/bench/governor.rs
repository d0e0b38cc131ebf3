use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backends::{BackendError, CallPolicy, SharedBackend};
use crate::model::{BackendResult, BackendStatus};
use crate::util::{round_to, truncate_chars};

pub const MAX_ERROR_CHARS: usize = 500;

/// Runs one backend on one image under its call policy.
///
/// The deadline covers every attempt and backoff sleep. On expiry the attempt
/// task is aborted and a `TIMEOUT` result is returned; nothing it produces
/// afterwards is observed. Always yields exactly one result.
pub async fn invoke(backend: SharedBackend, image_path: &Path) -> BackendResult {
    let policy = backend.policy();
    let name = backend.name().to_string();
    let started = Instant::now();

    let mut task = tokio::spawn(attempt_with_retries(
        backend,
        image_path.to_path_buf(),
        policy,
    ));

    let outcome = match tokio::time::timeout(policy.timeout, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            warn!(backend = %name, error = %join_error, "backend task failed");
            return BackendResult::failed(
                &name,
                BackendStatus::Error,
                elapsed_seconds(started),
                truncate_chars(&format!("backend task failed: {join_error}"), MAX_ERROR_CHARS),
            );
        }
        Err(_) => {
            task.abort();
            warn!(
                backend = %name,
                image = %image_path.display(),
                timeout_sec = policy.timeout.as_secs_f64(),
                "backend timed out"
            );
            return BackendResult::failed(
                &name,
                BackendStatus::Timeout,
                elapsed_seconds(started),
                format!("Timed out after {}s", policy.timeout.as_secs_f64()),
            );
        }
    };

    let latency = elapsed_seconds(started);
    match outcome {
        Ok(text) => BackendResult::extracted(&name, text, latency),
        Err(BackendError::MissingCredential(detail)) => BackendResult::failed(
            &name,
            BackendStatus::SkippedMissingCredential,
            latency,
            detail,
        ),
        Err(err) => BackendResult::failed(
            &name,
            BackendStatus::Error,
            latency,
            truncate_chars(&err.to_string(), MAX_ERROR_CHARS),
        ),
    }
}

async fn attempt_with_retries(
    backend: SharedBackend,
    image_path: PathBuf,
    policy: CallPolicy,
) -> Result<String, BackendError> {
    let attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0_u32;

    loop {
        match backend.attempt(&image_path).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_transient() && attempt + 1 < attempts => {
                let delay = backoff_delay(policy.backoff_base, attempt);
                debug!(
                    backend = %backend.name(),
                    attempt = attempt + 1,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient backend failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sleep after failed attempt `attempt` (0-indexed): `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

fn elapsed_seconds(started: Instant) -> f64 {
    round_to(started.elapsed().as_secs_f64(), 4)
}
