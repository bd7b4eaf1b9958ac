use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Cursor;
use std::path::Path;

pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// A file offered for selection, before validation.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl ImageCandidate {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The accepted image together with its displayable preview.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
    /// `data:<mime>;base64,<payload>`
    pub preview: String,
    pub dimensions: Option<(u32, u32)>,
}

impl SelectedImage {
    pub fn from_candidate(candidate: ImageCandidate) -> Self {
        let preview = to_data_url(&candidate.mime, &candidate.bytes);
        let dimensions = image_dimensions(&candidate.bytes);
        Self {
            bytes: candidate.bytes,
            mime: candidate.mime,
            name: candidate.name,
            preview,
            dimensions,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed image)")
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![self.mime.clone()];
        if let Some((width, height)) = self.dimensions {
            parts.push(format!("{}x{}", width, height));
        }
        parts.push(format_size(self.size()));
        format!("{} ({})", self.display_name(), parts.join(", "))
    }
}

pub fn load_candidate(path: &Path, mime_hint: Option<&str>) -> Result<ImageCandidate> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    let mime = match mime_hint.map(str::trim).filter(|value| !value.is_empty()) {
        Some(hint) if !hint.eq_ignore_ascii_case("auto") => resolve_mime_hint(hint)?,
        _ => detect_mime(&bytes, Some(path)),
    };
    Ok(ImageCandidate { bytes, mime, name })
}

pub fn candidate_from_bytes(bytes: Vec<u8>, name: Option<&str>) -> ImageCandidate {
    let mime = detect_mime(&bytes, name.map(Path::new));
    ImageCandidate {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    }
}

/// Sniffs the content first and falls back to the file extension. Anything
/// unrecognised is reported as an octet stream so validation can reject it.
pub fn detect_mime(bytes: &[u8], path: Option<&Path>) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    extension_lower(path)
        .and_then(|ext| mime_from_extension(&ext))
        .unwrap_or(OCTET_STREAM_MIME)
        .to_string()
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Strips the `data:...;base64,` prefix. Input without a prefix is returned
/// unchanged.
pub fn strip_data_url_prefix(value: &str) -> &str {
    match value.split_once(',') {
        Some((_, payload)) => payload,
        None => value,
    }
}

fn resolve_mime_hint(hint: &str) -> Result<String> {
    let lower = hint.to_lowercase();
    if lower.contains('/') {
        return Ok(lower);
    }
    mime_from_extension(&lower)
        .map(|mime| mime.to_string())
        .ok_or_else(|| anyhow!("unsupported mime hint '{}'", hint))
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn extension_lower(path: Option<&Path>) -> Option<String> {
    path.and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        "svg" => Some("image/svg+xml"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{} B", bytes)
    } else if value < KIB * KIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{:.1} MB", value / (KIB * KIB))
    }
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::new(3, 2)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn png_bytes_are_sniffed_and_measured() {
        let candidate = candidate_from_bytes(tiny_png(), Some("shot.bin"));
        assert_eq!(candidate.mime, "image/png");
        let image = SelectedImage::from_candidate(candidate);
        assert_eq!(image.dimensions, Some((3, 2)));
        assert!(image.preview.starts_with("data:image/png;base64,"));
        assert!(image.describe().starts_with("shot.bin (image/png, 3x2, "));
    }

    #[test]
    fn extension_is_used_when_content_is_unknown() {
        let candidate = candidate_from_bytes(b"not really".to_vec(), Some("notes.txt"));
        assert_eq!(candidate.mime, "text/plain");
        let candidate = candidate_from_bytes(b"???".to_vec(), None);
        assert_eq!(candidate.mime, OCTET_STREAM_MIME);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let url = to_data_url("image/png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
        assert_eq!(strip_data_url_prefix(&url), "YWJj");
        assert_eq!(strip_data_url_prefix("YWJj"), "YWJj");
    }

    #[test]
    fn load_candidate_honours_mime_hint() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("scan");
        std::fs::write(&path, b"raw").expect("write");

        let detected = load_candidate(&path, None).expect("load");
        assert_eq!(detected.mime, OCTET_STREAM_MIME);
        assert_eq!(detected.name.as_deref(), Some("scan"));

        let hinted = load_candidate(&path, Some("jpg")).expect("load");
        assert_eq!(hinted.mime, "image/jpeg");
        assert_eq!(hinted.size(), 3);

        assert!(load_candidate(&path, Some("weird")).is_err());
    }
}
