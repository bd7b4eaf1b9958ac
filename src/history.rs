use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::storage::KeyValueStore;

pub const HISTORY_KEY: &str = "ocr_app_history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub image_name: Option<String>,
    pub mime: String,
    pub model: Option<String>,
}

impl HistoryEntry {
    pub fn new(text: &str, image_name: Option<&str>, mime: &str, model: Option<&str>) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        let seed = format!("{}:{}:{}", timestamp, image_name.unwrap_or(""), text);
        Self {
            id: format!("{:x}", md5::compute(seed.as_bytes())),
            text: text.to_string(),
            timestamp,
            image_name: image_name.map(|value| value.to_string()),
            mime: mime.to_string(),
            model: model.map(|value| value.to_string()),
        }
    }
}

/// Successful extractions, newest first, capped at `limit`.
#[derive(Debug)]
pub struct HistoryStore<S: KeyValueStore> {
    store: S,
    limit: usize,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let Some(raw) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).with_context(|| "failed to parse extraction history")
    }

    pub fn record(&mut self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries()?;
        entries.insert(0, entry);
        if self.limit > 0 && entries.len() > self.limit {
            entries.truncate(self.limit);
        }
        let raw = serde_json::to_string(&entries)?;
        self.store.set(HISTORY_KEY, &raw)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(HISTORY_KEY)
    }
}

pub fn format_histories(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "no extraction history".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let preview = entry
                .text
                .lines()
                .next()
                .unwrap_or("")
                .chars()
                .take(60)
                .collect::<String>();
            format!(
                "{}\t{}\t{}\t{}",
                entry.timestamp,
                entry.image_name.as_deref().unwrap_or("-"),
                entry.text.chars().count(),
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
