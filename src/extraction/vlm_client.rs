use super::{ExtractionService, MediaType};
use crate::config::ExtractionConfig;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const EXTRACTION_PROMPT: &str = r#"You review photographs of government identity documents.

1. Decide whether the image is an identity document at all. If it is not, set "is_identity_document" to false and give a "rejection_reason".
2. Inspect it forensically: font and alignment consistency, signs of digital editing, copy-paste artifacts, seals, holograms, stamps, and whether the portrait shows a real person.
3. Extract every labelled value. Transliterate regional scripts into English. Prefer DD-MM-YYYY for dates. Put the primary document number under "id_number".

Reply with one JSON object and nothing else:
{
  "document_type": "aadhaar | pan | voter_id | driving_license | passport | unknown",
  "is_identity_document": true,
  "rejection_reason": null,
  "is_readable": true,
  "quality_issues": ["..."],
  "fields": {
    "name": {"value": "...", "confidence": 0.0},
    "dob": {"value": "...", "confidence": 0.0},
    "id_number": {"value": "...", "confidence": 0.0}
  },
  "forensics": {
    "genuine_appearance": true,
    "validity_score": 0.0,
    "reasoning": "...",
    "suspicious_elements": ["..."],
    "alterations": ["..."],
    "security_features": ["..."]
  }
}

Confidence and validity_score are between 0 and 1. Be strict: a generic digital template scores below 0.5, a real photograph of a physical card above 0.8."#;

/// Chat-completion client for the vision-language extraction model.
pub struct VlmClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl VlmClient {
    pub fn from_config(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("docverify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, image: &[u8], media_type: MediaType, hint: Option<&str>) -> Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let mut prompt = EXTRACTION_PROMPT.to_string();
        if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
            prompt.push_str(&format!(
                "\n\nThe submitter believes this is a {hint}. Verify that rather than assuming it."
            ));
        }

        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:{};base64,{}", media_type.mime(), encoded)}
                    }
                ]
            }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

/// Pulls the assistant text out of a chat-completion body.
fn reply_text(body: &Value) -> Result<String, CollaboratorError> {
    if let Some(error) = body.get("error") {
        return Err(CollaboratorError::Transport(format!(
            "model endpoint reported an error: {error}"
        )));
    }

    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::Malformed("no message content in reply".to_string()))
}

#[async_trait]
impl ExtractionService for VlmClient {
    async fn extract(
        &self,
        image: &[u8],
        media_type: MediaType,
        hint: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(image, media_type, hint));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Transport(format!(
                "model endpoint returned {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("reply body is not JSON: {e}")))?;
        reply_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_request_carries_data_url_and_hint() {
        let client = VlmClient::from_config(&Config::default().extraction).unwrap();
        let body = client.request_body(b"\xff\xd8\xff", MediaType::Jpeg, Some("pan"));

        let url = body
            .pointer("/messages/0/content/1/image_url/url")
            .and_then(Value::as_str)
            .unwrap();
        assert_eq!(url, "data:image/jpeg;base64,/9j/");

        let prompt = body
            .pointer("/messages/0/content/0/text")
            .and_then(Value::as_str)
            .unwrap();
        assert!(prompt.contains("believes this is a pan"));
        assert_eq!(body["max_tokens"], 15000);
    }

    #[test]
    fn test_reply_text_classification() {
        let ok = json!({"choices": [{"message": {"content": "{\"fields\": {}}"}}]});
        assert_eq!(reply_text(&ok).unwrap(), "{\"fields\": {}}");

        let upstream_error = json!({"error": {"message": "rate limited"}});
        assert!(!reply_text(&upstream_error).unwrap_err().is_retryable());

        let empty = json!({"choices": []});
        assert!(reply_text(&empty).unwrap_err().is_retryable());
    }
}
