use std::path::{Path, PathBuf};

const APP_DIR_ENV: &str = "TEXT_EXTRACT_RUST_DIR";
const APP_DIR_NAME: &str = ".text-extract-rust";
const STORAGE_FILE_NAME: &str = "storage.json";

/// Directory holding settings and local storage.
pub fn app_dir() -> PathBuf {
    if let Some(dir) = app_dir_override() {
        return dir;
    }
    home_join(APP_DIR_NAME).unwrap_or_else(|| PathBuf::from(APP_DIR_NAME))
}

pub fn storage_path() -> PathBuf {
    app_dir().join(STORAGE_FILE_NAME)
}

fn app_dir_override() -> Option<PathBuf> {
    std::env::var(APP_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

pub(crate) fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            if value == "~" {
                return home.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}
