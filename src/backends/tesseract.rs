use std::path::Path;
use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::info;

use super::{Backend, BackendError, BackendSettings, CallPolicy};

const NAME: &str = "tesseract";
const DEFAULT_PROGRAM: &str = "tesseract";
const DEFAULT_LANG: &str = "eng";

/// Local OCR through the `tesseract` binary. The engine probe runs once and
/// is shared by every worker holding this backend.
pub struct TesseractBackend {
    program: String,
    lang: String,
    policy: CallPolicy,
    engine_version: OnceCell<String>,
}

impl TesseractBackend {
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        Ok(Self::new(
            settings.get_or("TESSERACT_BIN", DEFAULT_PROGRAM),
            settings.get_or("TESSERACT_LANG", DEFAULT_LANG),
            settings.policy("TESSERACT", CallPolicy::default())?,
        ))
    }

    pub fn new(program: String, lang: String, policy: CallPolicy) -> Self {
        Self {
            program,
            lang,
            policy,
            engine_version: OnceCell::new(),
        }
    }

    async fn ensure_engine(&self) -> Result<&str, BackendError> {
        self.engine_version
            .get_or_try_init(|| probe_engine(&self.program))
            .await
            .map(String::as_str)
    }
}

async fn probe_engine(program: &str) -> Result<String, BackendError> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| BackendError::Engine(format!("failed to execute {program}: {err}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    let version = source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or("unknown")
        .to_string();

    info!(program = %program, version = %version, "local OCR engine ready");
    Ok(version)
}

#[async_trait]
impl Backend for TesseractBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn policy(&self) -> CallPolicy {
        self.policy
    }

    async fn attempt(&self, image_path: &Path) -> Result<String, BackendError> {
        tokio::fs::metadata(image_path)
            .await
            .map_err(|err| BackendError::ImageUnreadable {
                path: image_path.display().to_string(),
                reason: err.to_string(),
            })?;

        self.ensure_engine().await?;

        let output = Command::new(&self.program)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                BackendError::Engine(format!("failed to execute {}: {err}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Engine(format!(
                "{} returned non-zero exit status for {}: {}",
                self.program,
                image_path.display(),
                stderr.trim()
            )));
        }

        Ok(clean_engine_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

pub(super) fn clean_engine_output(raw: &str) -> String {
    raw.replace('\u{0000}', "")
        .replace('\u{000C}', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}
