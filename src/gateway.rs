use anyhow::Result;
use thiserror::Error;
use tracing::{error, info};

use crate::data::{SelectedImage, strip_data_url_prefix};
use crate::prompts::render_extract_prompt;
use crate::providers::{InlineData, Provider, ProviderUsage};

/// Returned when the service answers with no text at all.
pub const FALLBACK_TEXT: &str = "No text extracted.";

/// User-facing failure of an extraction. `Display` is always the same
/// generic message; the underlying cause is kept in `diagnostic` for logs.
#[derive(Debug, Clone, Error)]
#[error("Failed to process image. Please try again.")]
pub struct OcrError {
    diagnostic: String,
}

impl OcrError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Sends one image to the model and returns whatever text it reads.
///
/// Exactly one request per call: no retry, no local timeout.
#[derive(Debug, Clone)]
pub struct OcrGateway<P: Provider> {
    provider: P,
}

impl<P: Provider> OcrGateway<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub async fn extract_text(&self, image: &SelectedImage) -> Result<Extraction, OcrError> {
        match self.request(image).await {
            Ok(extraction) => {
                info!(
                    "extracted {} chars from {}",
                    extraction.text.chars().count(),
                    image.display_name()
                );
                Ok(extraction)
            }
            Err(err) => {
                let diagnostic = format!("{:#}", err);
                error!("OCR error: {}", diagnostic);
                Err(OcrError::new(diagnostic))
            }
        }
    }

    async fn request(&self, image: &SelectedImage) -> Result<Extraction> {
        let payload = strip_data_url_prefix(&image.preview).to_string();
        let prompt = render_extract_prompt()?;
        let response = self
            .provider
            .clone()
            .append_user_data(InlineData {
                mime: image.mime.clone(),
                data: payload,
            })
            .append_user_input(prompt)
            .generate()
            .await?;

        let text = response
            .text
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| FALLBACK_TEXT.to_string());
        Ok(Extraction {
            text,
            model: response.model,
            usage: response.usage,
        })
    }
}
