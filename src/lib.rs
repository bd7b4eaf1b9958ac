use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub mod app;
pub mod clipboard;
pub mod credits;
pub mod data;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod paths;
pub mod pricing;
mod prompts;
pub mod providers;
pub mod settings;
pub mod storage;
pub mod validator;
pub mod workspace;

pub use app::{App, AppEvent, AppTask, View};
pub use credits::CreditStore;
pub use gateway::{Extraction, OcrError, OcrGateway};
pub use pricing::{PaymentProcessor, PaymentSimulator};
pub use prompts::render_extract_prompt;
pub use providers::{Gemini, Provider, ProviderUsage};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use workspace::{ExtractOutcome, Workspace};

pub type DesktopApp = App<FileStore, Gemini, PaymentSimulator>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub data_mime: Option<String>,
    pub key: Option<String>,
    pub model: Option<String>,
    pub settings_path: Option<String>,
    pub show_credits: bool,
    pub show_tiers: bool,
    pub show_histories: bool,
    pub buy: Option<String>,
    pub copy: bool,
    pub download: Option<String>,
    pub verbose: bool,
}

pub fn load_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    settings::load_settings(&paths::app_dir(), settings_path)
}

/// Wires the app against the on-disk store and the Gemini client. Without an
/// API key the app still runs, but extraction is refused before any credit
/// is spent.
pub fn build_app(config: &Config, settings: &settings::Settings) -> DesktopApp {
    let store = FileStore::new(paths::storage_path());
    let credits = CreditStore::init(store.clone(), settings.initial_credits);
    let history = history::HistoryStore::new(store, settings.history_limit);
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| settings.model.clone());
    let gateway = match providers::resolve_key(config.key.as_deref()) {
        Ok(key) => Some(OcrGateway::new(Gemini::new(key).with_model(model))),
        Err(err) => {
            warn!("{:#}", err);
            None
        }
    };
    App::new(
        credits,
        history,
        Workspace::new(settings.max_file_size),
        gateway,
        PaymentSimulator::new(Duration::from_millis(settings.purchase_delay_ms)),
    )
}

pub async fn run(config: Config) -> Result<String> {
    let settings = load_settings(&config)?;
    let mut app = build_app(&config, &settings);

    if config.show_credits || config.show_tiers || config.show_histories {
        return format_show_output(&config, &app);
    }

    if let Some(tier) = config.buy.as_deref() {
        app.buy_now(tier).await?;
        let notice = app.take_notice().unwrap_or_default();
        return Ok(format!("{}\ncredits: {}", notice, app.credits()));
    }

    let Some(data) = config.data.as_deref() else {
        return Err(anyhow!("no image given (use --data <path> or --interactive)"));
    };
    let path = PathBuf::from(data);
    if !app.select_path(&path, config.data_mime.as_deref())? {
        let reason = app
            .workspace()
            .error()
            .unwrap_or("Please select a valid image file.")
            .to_string();
        return Err(anyhow!(reason));
    }

    match app.extract_now().await? {
        ExtractOutcome::Extracted(extraction) => {
            info!(
                "credits left: {} (model: {})",
                app.credits(),
                extraction.model.as_deref().unwrap_or("unavailable")
            );
        }
        ExtractOutcome::Failed(err) => return Err(err.into()),
        ExtractOutcome::NeedsCredits => {
            return Err(anyhow!(
                "Insufficient credits. Buy more with --buy <tier> (see --show-tiers)."
            ));
        }
        ExtractOutcome::NoFile | ExtractOutcome::Busy => {
            return Err(anyhow!("no image selected"));
        }
    }

    let mut clipboard = clipboard::SystemClipboard;
    let download = config
        .download
        .as_deref()
        .map(|dir| paths::normalize_dir(dir).unwrap_or_else(|| PathBuf::from(".")));
    deliver(&mut app, config.copy.then_some(&mut clipboard), download.as_deref())
}

/// Hands back the extracted text, copying and saving it on the way. A failed
/// copy or save is reported as a warning and never costs the text.
fn deliver<S, P, Pay, C>(
    app: &mut App<S, P, Pay>,
    clipboard: Option<&mut C>,
    download: Option<&Path>,
) -> Result<String>
where
    S: KeyValueStore,
    P: Provider + 'static,
    Pay: PaymentProcessor,
    C: clipboard::Clipboard,
{
    if let Some(clipboard) = clipboard
        && let Err(err) = app.copy(clipboard, Instant::now())
    {
        warn!("copy failed: {:#}", err);
        eprintln!("warning: could not copy to clipboard: {:#}", err);
    }
    if let Some(dir) = download {
        match app.download(dir) {
            Ok(Some(saved)) => info!("saved {}", saved.display()),
            Ok(None) => {}
            Err(err) => {
                warn!("download failed: {:#}", err);
                eprintln!("warning: could not save the text: {:#}", err);
            }
        }
    }

    app.workspace()
        .result()
        .map(|text| text.to_string())
        .with_context(|| "extraction produced no result")
}

fn format_show_output(config: &Config, app: &DesktopApp) -> Result<String> {
    let mut sections = Vec::new();
    if config.show_credits {
        sections.push(format!("credits: {}", app.credits()));
    }
    if config.show_tiers {
        sections.push(pricing::format_tiers());
    }
    if config.show_histories {
        sections.push(history::format_histories(&app.histories()?));
    }
    Ok(sections.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::Clipboard;
    use crate::credits::CREDITS_KEY;
    use crate::data::tiny_png;
    use crate::gateway::test_provider::TestProvider;
    use crate::history::HistoryStore;
    use crate::validator::MAX_FILE_SIZE;
    use crate::workspace::DOWNLOAD_FILE_NAME;
    use tempfile::tempdir;

    struct HeadlessClipboard;

    impl Clipboard for HeadlessClipboard {
        fn set_text(&mut self, _text: &str) -> Result<()> {
            Err(anyhow!("no display server"))
        }
    }

    #[tokio::test]
    async fn copy_and_save_failures_still_return_text() {
        let mut store = MemoryStore::new();
        store.set(CREDITS_KEY, "5").expect("set");
        let mut app = App::new(
            CreditStore::init(store, 5),
            HistoryStore::new(MemoryStore::new(), 10),
            Workspace::new(MAX_FILE_SIZE),
            Some(OcrGateway::new(TestProvider::replying(Some("receipt total")))),
            PaymentSimulator::default(),
        );
        let dir = tempdir().expect("tempdir");
        let image = dir.path().join("page.png");
        std::fs::write(&image, tiny_png()).expect("write");
        assert!(app.select_path(&image, None).expect("select"));
        app.extract_now().await.expect("extract");

        let not_a_dir = dir.path().join("taken");
        std::fs::write(&not_a_dir, "x").expect("write");
        let text = deliver(&mut app, Some(&mut HeadlessClipboard), Some(&not_a_dir))
            .expect("deliver");

        assert_eq!(text, "receipt total");
        assert_eq!(app.credits(), 4);
        assert!(!not_a_dir.join(DOWNLOAD_FILE_NAME).exists());
    }
}
