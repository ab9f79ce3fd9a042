//! Image description through a vision-capable model.

use crate::error::{ParleyError, Result};
use crate::providers::{ChatOptions, LLMProvider, ModelDescriptor};
use crate::session::Turn;
use crate::utils::string::{preview, LOG_PREVIEW_CHARS};
use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tracing::debug;

/// Largest image accepted for description.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Turns an image reference into a textual description.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn describe(&self, image_url: &str) -> Result<String>;
}

/// [`VisionService`] backed by a `vision-understanding` model.
///
/// Downloads the image, inlines it as a base64 data URL and asks the model
/// to describe it. Animated GIFs are rejected.
pub struct VisionModelDescriber {
    provider: Arc<dyn LLMProvider>,
    model: Arc<ModelDescriptor>,
    client: reqwest::Client,
    prompt: String,
}

impl VisionModelDescriber {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: Arc<ModelDescriptor>,
        client: reqwest::Client,
        prompt: &str,
    ) -> Self {
        Self {
            provider,
            model,
            client,
            prompt: prompt.to_string(),
        }
    }

    /// Resolve `image_url` into a data URL, downloading if needed.
    async fn to_data_url(&self, image_url: &str) -> Result<String> {
        if let Some(rest) = image_url.strip_prefix("data:") {
            let mime = rest.split([';', ',']).next().unwrap_or_default();
            reject_unsupported(mime)?;
            return Ok(image_url.to_string());
        }

        let response = self.client.get(image_url).send().await?.error_for_status()?;
        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?;

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ParleyError::Vision(format!(
                "image too large ({} bytes)",
                bytes.len()
            )));
        }

        let mime = sniff_image_type(&bytes)
            .map(str::to_string)
            .or(header_mime)
            .unwrap_or_else(|| "image/jpeg".to_string());
        reject_unsupported(&mime)?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }
}

#[async_trait]
impl VisionService for VisionModelDescriber {
    async fn describe(&self, image_url: &str) -> Result<String> {
        let data_url = self.to_data_url(image_url).await?;
        let turn = Turn::user_with_image(&self.prompt, &data_url);

        let response = self
            .provider
            .chat(&self.model, vec![turn], vec![], ChatOptions::new())
            .await?;

        let description = response.content.trim();
        if description.is_empty() {
            return Err(ParleyError::Vision("model returned no description".into()));
        }
        debug!(
            model = %self.model.name,
            description = %preview(description, LOG_PREVIEW_CHARS),
            "Image described"
        );
        Ok(description.to_string())
    }
}

fn reject_unsupported(mime: &str) -> Result<()> {
    if mime.eq_ignore_ascii_case("image/gif") {
        return Err(ParleyError::Vision(
            "animated images are not supported".into(),
        ));
    }
    Ok(())
}

/// Detect the image type from magic bytes.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LLMResponse, ToolDefinition};
    use std::sync::Mutex;

    struct EchoVision {
        seen: Mutex<Vec<Turn>>,
        reply: String,
    }

    #[async_trait]
    impl LLMProvider for EchoVision {
        async fn chat(
            &self,
            _model: &ModelDescriptor,
            turns: Vec<Turn>,
            _tools: Vec<ToolDefinition>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            self.seen.lock().unwrap().extend(turns);
            Ok(LLMResponse::text(&self.reply))
        }

        fn name(&self) -> &str {
            "echo-vision"
        }
    }

    fn describer(reply: &str) -> (VisionModelDescriber, Arc<EchoVision>) {
        let provider = Arc::new(EchoVision {
            seen: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        });
        let model = Arc::new(ModelDescriptor::new("vision", "http://v", "v-1"));
        let describer = VisionModelDescriber::new(
            provider.clone(),
            model,
            reqwest::Client::new(),
            "Describe this image.",
        );
        (describer, provider)
    }

    #[test]
    fn test_sniff_image_type() {
        assert_eq!(sniff_image_type(b"\x89PNG\r\n\x1a\nrest"), Some("image/png"));
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_type(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_type(b"hello"), None);
    }

    #[tokio::test]
    async fn test_describe_data_url() {
        let (describer, provider) = describer("  a cat on a sofa  ");
        let text = describer
            .describe("data:image/png;base64,iVBORw0KGgo=")
            .await
            .unwrap();
        assert_eq!(text, "a cat on a sofa");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].text(), "Describe this image. [IMAGE]");
    }

    #[tokio::test]
    async fn test_gif_rejected_without_model_call() {
        let (describer, provider) = describer("unused");
        let err = describer
            .describe("data:image/gif;base64,R0lGODlh")
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Vision(_)));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_description_is_failure() {
        let (describer, _) = describer("   ");
        assert!(describer
            .describe("data:image/png;base64,AAAA")
            .await
            .is_err());
    }
}
