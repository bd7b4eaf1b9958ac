use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

const EXTRACT_TEXT_TEMPLATE: &str = include_str!("extract_text.tera");

/// What the model is told to answer when the image holds no text.
pub const EMPTY_MARKER: &str = "No text detected";

pub fn render_extract_prompt() -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("empty_marker", EMPTY_MARKER);
    let rendered = Tera::one_off(EXTRACT_TEXT_TEMPLATE, &context, false)
        .with_context(|| "failed to render extraction prompt")?;
    Ok(rendered.trim().to_string())
}
