use super::{MediaType, UpscaleService};
use crate::config::UpscaleConfig;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Talks to a super-resolution service that accepts the raw image as the
/// request body and answers with the 4x enhanced image.
pub struct HttpUpscaler {
    client: Client,
    endpoint: String,
}

impl HttpUpscaler {
    pub fn from_config(config: &UpscaleConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("docverify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl UpscaleService for HttpUpscaler {
    async fn upscale(&self, image: &[u8], media_type: MediaType) -> Result<Vec<u8>, CollaboratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, media_type.mime())
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Transport(format!(
                "upscaler returned {status}"
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CollaboratorError::Malformed(
                "upscaler returned an empty image".to_string(),
            ));
        }
        log::debug!("Upscaled image from {} to {} bytes", image.len(), bytes.len());
        Ok(bytes.to_vec())
    }
}
