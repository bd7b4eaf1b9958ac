use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::credits::INITIAL_CREDITS;
use crate::providers::DEFAULT_MODEL;
use crate::pricing::PURCHASE_DELAY_MS;
use crate::validator::MAX_FILE_SIZE;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub initial_credits: u64,
    pub model: String,
    pub max_file_size: u64,
    pub history_limit: usize,
    pub purchase_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_credits: INITIAL_CREDITS,
            model: DEFAULT_MODEL.to_string(),
            max_file_size: MAX_FILE_SIZE,
            history_limit: 10,
            purchase_delay_ms: PURCHASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    credits: Option<CreditSettings>,
    ocr: Option<OcrSettings>,
    system: Option<SystemSettings>,
    pricing: Option<PricingSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct CreditSettings {
    initial: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    model: Option<String>,
    max_file_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SystemSettings {
    histories: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingSettings {
    delay_ms: Option<u64>,
}

/// Loads settings layered from the working directory, the app directory and
/// an optional extra file, later files winning.
pub fn load_settings(app_dir: &Path, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_app_settings_file(app_dir)?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
        app_dir.join("settings.toml"),
        app_dir.join("settings.local.toml"),
    ];

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(credits) = incoming.credits
            && let Some(initial) = credits.initial
        {
            self.initial_credits = initial;
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(model) = ocr.model
                && !model.trim().is_empty()
            {
                self.model = model.trim().to_string();
            }
            if let Some(size) = ocr.max_file_size
                && size > 0
            {
                self.max_file_size = size;
            }
        }
        if let Some(system) = incoming.system
            && let Some(limit) = system.histories
            && limit > 0
        {
            self.history_limit = limit;
        }
        if let Some(pricing) = incoming.pricing
            && let Some(delay) = pricing.delay_ms
        {
            self.purchase_delay_ms = delay;
        }
    }
}

fn ensure_app_settings_file(app_dir: &Path) -> Result<()> {
    fs::create_dir_all(app_dir)
        .with_context(|| format!("failed to create settings directory: {}", app_dir.display()))?;
    let path = app_dir.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bundled_settings_match_defaults() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("parse");
        let mut settings = Settings::default();
        settings.merge(parsed);
        let defaults = Settings::default();
        assert_eq!(settings.initial_credits, defaults.initial_credits);
        assert_eq!(settings.model, defaults.model);
        assert_eq!(settings.max_file_size, defaults.max_file_size);
        assert_eq!(settings.history_limit, defaults.history_limit);
        assert_eq!(settings.purchase_delay_ms, defaults.purchase_delay_ms);
    }

    #[test]
    fn load_settings_writes_app_file_and_applies_extra() {
        let dir = tempdir().expect("tempdir");
        let app_dir = dir.path().join("app");
        let extra = dir.path().join("extra.toml");
        fs::write(
            &extra,
            "[credits]\ninitial = 12\n[system]\nhistories = 0\n[pricing]\ndelay_ms = 0\n",
        )
        .expect("write extra");

        let settings = load_settings(&app_dir, Some(&extra)).expect("settings");
        assert!(app_dir.join("settings.toml").exists());
        assert_eq!(settings.initial_credits, 12);
        assert_eq!(settings.history_limit, 10);
        assert_eq!(settings.purchase_delay_ms, 0);
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let err = load_settings(dir.path(), Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }
}
