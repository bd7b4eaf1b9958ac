use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

mod gemini;

pub use gemini::Gemini;
pub(crate) use gemini::DEFAULT_MODEL;

const KEY_ENV_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Clone)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: Option<String>,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Base64 payload sent inline with a request.
#[derive(Debug, Clone)]
pub struct InlineData {
    pub mime: String,
    pub data: String,
}

#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    Data(InlineData),
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// A generative model that answers one request built from ordered parts.
pub trait Provider: Clone + Send + Sync {
    fn append_user_data(self, data: InlineData) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn generate(self) -> ProviderFuture;
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    KEY_ENV_VARS
        .iter()
        .find_map(|name| get_env(name))
        .ok_or_else(|| {
            anyhow!(
                "no API key found (checked {})",
                KEY_ENV_VARS.join(", ")
            )
        })
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
