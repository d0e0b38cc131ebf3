use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::BackendError;
use crate::util::truncate_chars;

pub const TAG_PROMPT: &str = "Extract all visible garment-care/tag text verbatim. \
     Return plain text only with no commentary.";

const MAX_ERROR_BODY_CHARS: usize = 400;

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

pub struct EncodedImage {
    pub mime_type: &'static str,
    pub data: String,
}

impl EncodedImage {
    pub async fn load(path: &Path) -> Result<Self, BackendError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| BackendError::ImageUnreadable {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            mime_type: mime_for(path),
            data: general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

pub fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

pub async fn send_json(request: RequestBuilder) -> Result<Value, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|err| BackendError::Network(err.to_string()))?;
    let status = response.status();

    let body = response
        .text()
        .await
        .map_err(|err| BackendError::Network(err.to_string()))?;

    if !status.is_success() {
        return Err(BackendError::Http {
            status: status.as_u16(),
            detail: extract_error_message(&body),
        });
    }

    serde_json::from_str::<Value>(&body)
        .map_err(|err| BackendError::InvalidResponse(format!("body is not JSON: {err}")))
}

pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    truncate_chars(body, MAX_ERROR_BODY_CHARS)
}

pub fn join_chunks<'a>(chunks: impl IntoIterator<Item = &'a str>) -> String {
    chunks
        .into_iter()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}
