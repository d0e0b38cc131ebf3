use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::http::{EncodedImage, TAG_PROMPT, build_client, join_chunks, send_json};
use super::{Backend, BackendError, BackendSettings, CallPolicy};

const NAME: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiBackend {
    client: Client,
    api_key: Option<String>,
    model: String,
    policy: CallPolicy,
}

impl GeminiBackend {
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let policy = settings.policy("GEMINI", CallPolicy::default())?;
        Ok(Self {
            client: build_client(policy.timeout)?,
            api_key: settings.get("GEMINI_API_KEY").map(ToOwned::to_owned),
            model: settings.get_or("GEMINI_MODEL", DEFAULT_MODEL),
            policy,
        })
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn policy(&self) -> CallPolicy {
        self.policy
    }

    async fn attempt(&self, image_path: &Path) -> Result<String, BackendError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            BackendError::MissingCredential("GEMINI_API_KEY is not set".to_string())
        })?;
        let image = EncodedImage::load(image_path).await?;

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": TAG_PROMPT },
                    { "inline_data": { "mime_type": image.mime_type, "data": image.data } }
                ]
            }]
        });

        let request = self
            .client
            .post(format!("{ENDPOINT_BASE}/{}:generateContent", self.model))
            .query(&[("key", api_key)])
            .json(&body);

        let payload = send_json(request).await?;
        Ok(extract_text(&payload))
    }
}

pub(super) fn extract_text(payload: &Value) -> String {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str));

    join_chunks(parts)
}
