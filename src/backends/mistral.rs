use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::http::{EncodedImage, build_client, join_chunks, send_json};
use super::{Backend, BackendError, BackendSettings, CallPolicy};

const NAME: &str = "mistral_ocr2";
const DEFAULT_MODEL: &str = "mistral-ocr-latest";
const ENDPOINT: &str = "https://api.mistral.ai/v1/ocr";

pub struct MistralOcrBackend {
    client: Client,
    api_key: Option<String>,
    model: String,
    policy: CallPolicy,
}

impl MistralOcrBackend {
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let policy = settings.policy("MISTRAL", CallPolicy::default())?;
        Ok(Self {
            client: build_client(policy.timeout)?,
            api_key: settings.get("MISTRAL_API_KEY").map(ToOwned::to_owned),
            model: settings.get_or("MISTRAL_OCR_MODEL", DEFAULT_MODEL),
            policy,
        })
    }
}

#[async_trait]
impl Backend for MistralOcrBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn policy(&self) -> CallPolicy {
        self.policy
    }

    async fn attempt(&self, image_path: &Path) -> Result<String, BackendError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            BackendError::MissingCredential("MISTRAL_API_KEY is not set".to_string())
        })?;
        let image = EncodedImage::load(image_path).await?;

        let body = json!({
            "model": self.model,
            "document": {
                "type": "image_url",
                "image_url": image.data_url(),
            }
        });

        let request = self.client.post(ENDPOINT).bearer_auth(api_key).json(&body);
        let payload = send_json(request).await?;
        Ok(extract_text(&payload))
    }
}

/// Pages first, then the older `output.text` shape, then a bare `text`.
pub(super) fn extract_text(payload: &Value) -> String {
    let pages = payload
        .get("pages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|page| {
            page.get("markdown")
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
                .or_else(|| page.get("text").and_then(Value::as_str))
        });
    let text = join_chunks(pages);
    if !text.is_empty() {
        return text;
    }

    let output = payload
        .get("output")
        .and_then(|output| output.get("text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if !output.is_empty() {
        return output.to_string();
    }

    payload
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}
