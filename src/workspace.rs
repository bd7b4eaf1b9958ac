use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::clipboard::Clipboard;
use crate::credits::CreditStore;
use crate::data::{ImageCandidate, SelectedImage};
use crate::gateway::{Extraction, OcrError};
use crate::storage::KeyValueStore;
use crate::validator::{ValidationError, validate_image};

pub const DOWNLOAD_FILE_NAME: &str = "extracted-text.txt";
pub const COPY_ACK_DURATION: Duration = Duration::from_secs(2);
pub const INSUFFICIENT_CREDITS: &str = "Insufficient credits.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Empty,
    Selected,
    Processing,
    Result,
    Error,
}

/// What `begin_extract` decided.
#[derive(Debug, Clone)]
pub enum ExtractStart {
    /// A credit was spent; hand the image to the gateway.
    Ready(SelectedImage),
    NoFile,
    Busy,
    /// Nothing was spent; the user should be sent to pricing.
    NeedsCredits,
}

#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Extracted(Extraction),
    Failed(OcrError),
    NoFile,
    Busy,
    NeedsCredits,
}

#[derive(Debug)]
pub struct Workspace {
    image: Option<SelectedImage>,
    result: Option<String>,
    error: Option<String>,
    processing: bool,
    copied_at: Option<Instant>,
    max_file_size: u64,
}

impl Workspace {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            image: None,
            result: None,
            error: None,
            processing: false,
            copied_at: None,
            max_file_size,
        }
    }

    pub fn state(&self) -> WorkspaceState {
        if self.processing {
            WorkspaceState::Processing
        } else if self.error.is_some() {
            WorkspaceState::Error
        } else if self.result.is_some() {
            WorkspaceState::Result
        } else if self.image.is_some() {
            WorkspaceState::Selected
        } else {
            WorkspaceState::Empty
        }
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Validates and takes a new image, dropping any previous result. A
    /// rejected candidate only sets the error message.
    pub fn select(&mut self, candidate: ImageCandidate) -> Result<(), ValidationError> {
        if let Err(err) = validate_image(&candidate.mime, candidate.size(), self.max_file_size) {
            warn!("rejected {:?}: {:?}", candidate.name, err);
            self.error = Some(err.to_string());
            return Err(err);
        }
        let image = SelectedImage::from_candidate(candidate);
        info!("selected {}", image.describe());
        self.error = None;
        self.result = None;
        self.copied_at = None;
        self.image = Some(image);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.result = None;
        self.error = None;
        self.copied_at = None;
    }

    /// Why an extraction cannot start with `balance` credits, if it cannot.
    pub fn blocked(&self, balance: u64) -> Option<ExtractStart> {
        if self.processing {
            Some(ExtractStart::Busy)
        } else if self.image.is_none() {
            Some(ExtractStart::NoFile)
        } else if balance == 0 {
            Some(ExtractStart::NeedsCredits)
        } else {
            None
        }
    }

    /// Spends a credit and enters Processing, unless there is nothing to do
    /// or nothing to pay with.
    pub fn begin_extract<S: KeyValueStore>(
        &mut self,
        credits: &mut CreditStore<S>,
    ) -> Result<ExtractStart> {
        if let Some(blocked) = self.blocked(credits.balance()) {
            return Ok(blocked);
        }
        let Some(image) = self.image.clone() else {
            return Ok(ExtractStart::NoFile);
        };

        self.processing = true;
        self.error = None;
        match credits.deduct() {
            Ok(true) => Ok(ExtractStart::Ready(image)),
            Ok(false) => {
                self.processing = false;
                self.error = Some(INSUFFICIENT_CREDITS.to_string());
                Ok(ExtractStart::NeedsCredits)
            }
            Err(err) => {
                self.processing = false;
                Err(err)
            }
        }
    }

    /// Applies the gateway's answer. Runs even when the user cleared the
    /// file while the request was in flight.
    pub fn finish_extract(&mut self, outcome: &Result<Extraction, OcrError>) {
        self.processing = false;
        self.copied_at = None;
        match outcome {
            Ok(extraction) => {
                self.result = Some(extraction.text.clone());
                self.error = None;
            }
            Err(err) => {
                self.result = None;
                self.error = Some(err.to_string());
            }
        }
    }

    /// Copies the result, starting the "copied" acknowledgement. Returns
    /// `false` when there is no result to copy.
    pub fn copy(&mut self, clipboard: &mut impl Clipboard, now: Instant) -> Result<bool> {
        let Some(result) = self.result.as_deref() else {
            return Ok(false);
        };
        clipboard.set_text(result)?;
        self.copied_at = Some(now);
        Ok(true)
    }

    pub fn copied(&self, now: Instant) -> bool {
        self.copied_at
            .map(|at| now.saturating_duration_since(at) < COPY_ACK_DURATION)
            .unwrap_or(false)
    }

    /// Writes the result to `dir/extracted-text.txt`.
    pub fn download(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(result) = self.result.as_deref() else {
            return Ok(None);
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create download dir: {}", dir.display()))?;
        let path = dir.join(DOWNLOAD_FILE_NAME);
        fs::write(&path, result)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("saved extracted text to {}", path.display());
        Ok(Some(path))
    }

    pub fn character_count(&self) -> usize {
        self.result
            .as_deref()
            .map(|text| text.chars().count())
            .unwrap_or(0)
    }

    pub fn render(&self, now: Instant) -> String {
        let mut lines = Vec::new();
        lines.push("Source Image".to_string());
        match &self.image {
            Some(image) => lines.push(format!("  {}", image.describe())),
            None => lines.push(
                "  No file selected. Supports JPG, PNG, WEBP up to 5MB. Use /select <path>."
                    .to_string(),
            ),
        }
        if self.processing {
            lines.push("  [Scanning...]".to_string());
        } else if self.image.is_some() {
            lines.push("  [Extract Text] /extract".to_string());
        }

        let copy_label = if self.copied(now) { "Copied" } else { "Copy" };
        lines.push(String::new());
        lines.push(format!("Extracted Result  [{}] [Download]", copy_label));
        if let Some(error) = &self.error {
            lines.push(format!("  ! {}", error));
        } else if let Some(result) = &self.result {
            lines.extend(result.lines().map(|line| format!("  {}", line)));
        } else if self.processing {
            lines.push("  Analyzing image content...".to_string());
        } else {
            lines.push("  Extracted text will appear here...".to_string());
        }
        lines.push(format!("  {} characters", self.character_count()));
        lines.join("\n")
    }
}
