use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::http::{EncodedImage, TAG_PROMPT, build_client, join_chunks, send_json};
use super::{Backend, BackendError, BackendSettings, CallPolicy};

const NAME: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-5.2";
const ENDPOINT: &str = "https://api.openai.com/v1/responses";
const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct OpenAiBackend {
    client: Client,
    api_key: Option<String>,
    model: String,
    policy: CallPolicy,
}

impl OpenAiBackend {
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let defaults = CallPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_secs(1),
            ..CallPolicy::default()
        };
        let policy = settings.policy("OPENAI", defaults)?;
        Ok(Self {
            client: build_client(policy.timeout)?,
            api_key: settings.get("OPENAI_API_KEY").map(ToOwned::to_owned),
            model: settings.get_or("OPENAI_MODEL", DEFAULT_MODEL),
            policy,
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn policy(&self) -> CallPolicy {
        self.policy
    }

    async fn attempt(&self, image_path: &Path) -> Result<String, BackendError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            BackendError::MissingCredential("OPENAI_API_KEY is not set".to_string())
        })?;
        let image = EncodedImage::load(image_path).await?;

        let body = json!({
            "model": self.model,
            "input": [{
                "role": "user",
                "content": [
                    { "type": "input_text", "text": TAG_PROMPT },
                    { "type": "input_image", "image_url": image.data_url() }
                ]
            }]
        });

        let request = self.client.post(ENDPOINT).bearer_auth(api_key).json(&body);
        let payload = send_json(request).await?;
        Ok(extract_text(&payload))
    }
}

pub(super) fn extract_text(payload: &Value) -> String {
    if let Some(text) = payload
        .get("output_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        return text.to_string();
    }

    let chunks = payload
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|content| content.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|content| content.get("text").and_then(Value::as_str));

    join_chunks(chunks)
}
