use anyhow::{Result, anyhow};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Instant;
use tracing::{info, warn};

use crate::clipboard::Clipboard;
use crate::credits::CreditStore;
use crate::data::{SelectedImage, load_candidate};
use crate::gateway::{Extraction, OcrError, OcrGateway};
use crate::history::{HistoryEntry, HistoryStore};
use crate::pricing::{PaymentProcessor, PricingView, Receipt};
use crate::providers::Provider;
use crate::storage::KeyValueStore;
use crate::workspace::{ExtractOutcome, ExtractStart, Workspace};

pub const PRODUCT_NAME: &str = "TextExtract Pro";
pub const FOOTER: &str = "© 2024 TextExtract Pro. Powered by Gemini 2.5.";
const NO_API_KEY: &str = "no API key configured (set GEMINI_API_KEY or use --key)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Workspace,
    Pricing,
}

/// Completion of background work started by the shell.
#[derive(Debug)]
pub enum AppEvent {
    ExtractionFinished {
        image: SelectedImage,
        outcome: Result<Extraction, OcrError>,
    },
    PurchaseFinished {
        tier: &'static str,
        outcome: Result<Receipt>,
    },
}

pub type AppTask = Pin<Box<dyn Future<Output = AppEvent> + Send>>;

enum Prepared<P: Provider> {
    Ready(SelectedImage, OcrGateway<P>),
    Skipped(ExtractOutcome),
}

/// Top-level wiring: owns the credit balance and the current view, and
/// routes user actions to the workspace and pricing views.
pub struct App<S, P, Pay>
where
    S: KeyValueStore,
    P: Provider + 'static,
    Pay: PaymentProcessor,
{
    credits: CreditStore<S>,
    history: HistoryStore<S>,
    view: View,
    workspace: Workspace,
    pricing: PricingView,
    gateway: Option<OcrGateway<P>>,
    payments: Pay,
    notice: Option<String>,
}

impl<S, P, Pay> App<S, P, Pay>
where
    S: KeyValueStore,
    P: Provider + 'static,
    Pay: PaymentProcessor,
{
    pub fn new(
        credits: CreditStore<S>,
        history: HistoryStore<S>,
        workspace: Workspace,
        gateway: Option<OcrGateway<P>>,
        payments: Pay,
    ) -> Self {
        Self {
            credits,
            history,
            view: View::Workspace,
            workspace,
            pricing: PricingView::new(),
            gateway,
            payments,
            notice: None,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn navigate(&mut self, view: View) {
        if self.view != view {
            info!("navigate to {:?}", view);
        }
        self.view = view;
    }

    pub fn credits(&self) -> u64 {
        self.credits.balance()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn pricing(&self) -> &PricingView {
        &self.pricing
    }

    pub fn histories(&self) -> Result<Vec<HistoryEntry>> {
        self.history.entries()
    }

    pub fn clear_histories(&mut self) -> Result<()> {
        self.history.clear()?;
        self.notice = Some("Extraction history cleared.".to_string());
        Ok(())
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Loads a file and offers it to the workspace. Returns `false` when the
    /// file was rejected; the reason is left in the workspace error.
    pub fn select_path(&mut self, path: &Path, mime_hint: Option<&str>) -> Result<bool> {
        let candidate = load_candidate(path, mime_hint)?;
        Ok(self.workspace.select(candidate).is_ok())
    }

    pub fn clear(&mut self) {
        self.workspace.clear();
    }

    /// Spends the credit for an extraction. Nothing is spent when the
    /// workspace is not ready, when the balance is zero or when no API key
    /// is configured.
    fn prepare_extract(&mut self) -> Result<Prepared<P>> {
        let gateway = self.gateway.clone();
        let start = match &gateway {
            Some(_) => self.workspace.begin_extract(&mut self.credits)?,
            None => self
                .workspace
                .blocked(self.credits.balance())
                .ok_or_else(|| anyhow!(NO_API_KEY))?,
        };
        let skipped = match (start, gateway) {
            (ExtractStart::Ready(image), Some(gateway)) => {
                return Ok(Prepared::Ready(image, gateway));
            }
            (ExtractStart::Ready(_), None) => return Err(anyhow!(NO_API_KEY)),
            (ExtractStart::NoFile, _) => {
                self.notice = Some("Select an image first.".to_string());
                ExtractOutcome::NoFile
            }
            (ExtractStart::Busy, _) => {
                self.notice = Some("Extraction already in progress.".to_string());
                ExtractOutcome::Busy
            }
            (ExtractStart::NeedsCredits, _) => {
                self.navigate(View::Pricing);
                ExtractOutcome::NeedsCredits
            }
        };
        Ok(Prepared::Skipped(skipped))
    }

    /// Starts an extraction and hands back the request to run. Returns
    /// `None` when nothing was started, in which case a notice or a
    /// navigation explains why.
    pub fn start_extract(&mut self) -> Result<Option<AppTask>> {
        let Prepared::Ready(image, gateway) = self.prepare_extract()? else {
            return Ok(None);
        };
        Ok(Some(Box::pin(async move {
            let outcome = gateway.extract_text(&image).await;
            AppEvent::ExtractionFinished { image, outcome }
        })))
    }

    pub fn start_purchase(&mut self, tier: &str) -> Result<AppTask> {
        let tier = self.pricing.begin_purchase(tier)?;
        let payments = self.payments.clone();
        Ok(Box::pin(async move {
            let outcome = payments.charge(tier).await;
            AppEvent::PurchaseFinished {
                tier: tier.name,
                outcome,
            }
        }))
    }

    pub fn apply(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::ExtractionFinished { image, outcome } => {
                self.workspace.finish_extract(&outcome);
                if let Ok(extraction) = &outcome {
                    let tokens = extraction.usage.as_ref().and_then(|usage| usage.total_tokens);
                    if let Some(total) = tokens {
                        info!("extraction used {} tokens", total);
                    }
                    let entry = HistoryEntry::new(
                        &extraction.text,
                        image.name.as_deref(),
                        &image.mime,
                        extraction.model.as_deref(),
                    );
                    if let Err(err) = self.history.record(entry) {
                        warn!("failed to record history: {:#}", err);
                    }
                }
            }
            AppEvent::PurchaseFinished { tier, outcome } => match outcome {
                Ok(receipt) => {
                    self.pricing.complete_purchase(&receipt, &mut self.credits)?;
                    self.notice = Some(format!(
                        "Added {} credits ({} plan, simulated purchase).",
                        receipt.credits, receipt.tier
                    ));
                    self.navigate(View::Workspace);
                }
                Err(err) => {
                    self.pricing.abort_purchase(tier);
                    warn!("purchase of {} failed: {:#}", tier, err);
                    self.notice = Some(format!("Purchase of {} failed: {}", tier, err));
                }
            },
        }
        Ok(())
    }

    /// Runs an extraction to completion.
    pub async fn extract_now(&mut self) -> Result<ExtractOutcome> {
        let (image, gateway) = match self.prepare_extract()? {
            Prepared::Ready(image, gateway) => (image, gateway),
            Prepared::Skipped(outcome) => return Ok(outcome),
        };
        let outcome = gateway.extract_text(&image).await;
        let result = match &outcome {
            Ok(extraction) => ExtractOutcome::Extracted(extraction.clone()),
            Err(err) => ExtractOutcome::Failed(err.clone()),
        };
        self.apply(AppEvent::ExtractionFinished { image, outcome })?;
        Ok(result)
    }

    /// Runs a purchase to completion.
    pub async fn buy_now(&mut self, tier: &str) -> Result<()> {
        let task = self.start_purchase(tier)?;
        let event = task.await;
        let failure = match &event {
            AppEvent::PurchaseFinished {
                outcome: Err(err), ..
            } => Some(format!("{:#}", err)),
            _ => None,
        };
        self.apply(event)?;
        match failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    pub fn copy(&mut self, clipboard: &mut impl Clipboard, now: Instant) -> Result<bool> {
        self.workspace.copy(clipboard, now)
    }

    pub fn download(&self, dir: &Path) -> Result<Option<std::path::PathBuf>> {
        self.workspace.download(dir)
    }

    pub fn header(&self) -> String {
        format!(
            "{}  |  {} Credits  |  /workspace  /pricing",
            PRODUCT_NAME,
            self.credits.balance()
        )
    }

    pub fn render(&self, now: Instant) -> String {
        let mut sections = vec![self.header()];
        match self.view {
            View::Workspace => {
                let mut title = "Extract text from images".to_string();
                if self.credits.is_low() {
                    title.push_str("  (! Low credits balance)");
                }
                sections.push(title);
                sections.push(self.workspace.render(now));
            }
            View::Pricing => {
                sections.push(self.pricing.render());
                sections.push(FOOTER.to_string());
            }
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::CREDITS_KEY;
    use crate::data::tiny_png;
    use crate::gateway::test_provider::TestProvider;
    use crate::pricing::{PaymentFuture, PaymentSimulator, PricingTier, TIERS};
    use crate::storage::MemoryStore;
    use crate::validator::MAX_FILE_SIZE;
    use crate::workspace::WorkspaceState;
    use std::time::Duration;
    use tempfile::tempdir;

    type TestApp = App<MemoryStore, TestProvider, PaymentSimulator>;

    #[derive(Clone)]
    struct DecliningProcessor;

    impl PaymentProcessor for DecliningProcessor {
        fn charge(&self, _tier: &'static PricingTier) -> PaymentFuture {
            Box::pin(async { Err(anyhow!("card declined")) })
        }
    }

    fn build<Pay: PaymentProcessor>(
        balance: u64,
        gateway: Option<OcrGateway<TestProvider>>,
        payments: Pay,
    ) -> App<MemoryStore, TestProvider, Pay> {
        let mut store = MemoryStore::new();
        store.set(CREDITS_KEY, &balance.to_string()).expect("set");
        App::new(
            CreditStore::init(store, 5),
            HistoryStore::new(MemoryStore::new(), 10),
            Workspace::new(MAX_FILE_SIZE),
            gateway,
            payments,
        )
    }

    fn app(balance: u64, provider: TestProvider) -> TestApp {
        build(
            balance,
            Some(OcrGateway::new(provider)),
            PaymentSimulator::new(Duration::from_millis(800)),
        )
    }

    fn select_png<Pay: PaymentProcessor>(
        app: &mut App<MemoryStore, TestProvider, Pay>,
    ) -> tempfile::TempDir {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("page.png");
        std::fs::write(&path, tiny_png()).expect("write");
        assert!(app.select_path(&path, None).expect("select"));
        dir
    }

    #[tokio::test]
    async fn zero_credits_redirects_to_pricing() {
        let provider = TestProvider::replying(Some("text"));
        let mut app = app(0, provider.clone());
        let _dir = select_png(&mut app);

        let outcome = app.extract_now().await.expect("extract");
        assert!(matches!(outcome, ExtractOutcome::NeedsCredits));
        assert_eq!(app.view(), View::Pricing);
        assert_eq!(app.credits(), 0);
        assert_eq!(provider.request_count(), 0);
        assert_eq!(app.workspace().state(), WorkspaceState::Selected);
        assert!(app.render(Instant::now()).ends_with(FOOTER));
    }

    #[test]
    fn zero_credits_redirect_wins_over_missing_key() {
        let mut app: TestApp = build(0, None, PaymentSimulator::default());
        let _dir = select_png(&mut app);

        assert!(app.start_extract().expect("start").is_none());
        assert_eq!(app.view(), View::Pricing);
        assert_eq!(app.credits(), 0);
    }

    #[test]
    fn missing_gateway_spends_nothing() {
        let mut app: TestApp = build(5, None, PaymentSimulator::default());
        assert!(app.start_extract().expect("start").is_none());
        assert_eq!(app.take_notice().as_deref(), Some("Select an image first."));

        let _dir = select_png(&mut app);
        let err = app.start_extract().err().expect("no key");
        assert!(err.to_string().contains("no API key"));
        assert_eq!(app.credits(), 5);
        assert!(!app.workspace().is_processing());
    }

    #[tokio::test]
    async fn successful_extraction_spends_exactly_one_credit() {
        let provider = TestProvider::replying(Some("Total: 12.00"));
        let mut app = app(3, provider.clone());
        let _dir = select_png(&mut app);

        let outcome = app.extract_now().await.expect("extract");
        assert!(matches!(outcome, ExtractOutcome::Extracted(_)));
        assert_eq!(app.credits(), 2);
        assert_eq!(provider.request_count(), 1);
        assert_eq!(app.workspace().result(), Some("Total: 12.00"));
        assert_eq!(app.workspace().state(), WorkspaceState::Result);
        assert_eq!(app.workspace().character_count(), 12);

        let histories = app.histories().expect("histories");
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].text, "Total: 12.00");
        assert_eq!(histories[0].image_name.as_deref(), Some("page.png"));
    }

    #[tokio::test]
    async fn failed_extraction_keeps_credit_spent() {
        let mut app = app(1, TestProvider::failing("timeout"));
        let _dir = select_png(&mut app);

        let outcome = app.extract_now().await.expect("extract");
        assert!(matches!(outcome, ExtractOutcome::Failed(_)));
        assert_eq!(app.credits(), 0);
        assert_eq!(
            app.workspace().error(),
            Some("Failed to process image. Please try again.")
        );
        assert!(app.workspace().result().is_none());
        assert_eq!(app.workspace().state(), WorkspaceState::Error);
        assert!(app.histories().expect("histories").is_empty());
    }

    #[tokio::test]
    async fn background_extraction_lands_through_event() {
        let provider = TestProvider::replying(Some("Hello world"));
        let mut app = app(5, provider.clone());
        let _dir = select_png(&mut app);

        let task = app.start_extract().expect("start").expect("task");
        assert_eq!(app.credits(), 4);
        assert_eq!(app.workspace().state(), WorkspaceState::Processing);
        assert!(app.start_extract().expect("start").is_none());
        assert_eq!(
            app.take_notice().as_deref(),
            Some("Extraction already in progress.")
        );

        let event = tokio::spawn(task).await.expect("join");
        app.apply(event).expect("apply");
        assert_eq!(app.credits(), 4);
        assert_eq!(provider.request_count(), 1);
        assert_eq!(app.workspace().result(), Some("Hello world"));
        assert_eq!(app.histories().expect("histories").len(), 1);
    }

    #[tokio::test]
    async fn late_result_lands_after_clear_and_navigation() {
        let mut app = app(5, TestProvider::replying(Some("late text")));
        let _dir = select_png(&mut app);

        let task = app.start_extract().expect("start").expect("task");
        app.clear();
        app.navigate(View::Pricing);

        let event = tokio::spawn(task).await.expect("join");
        app.apply(event).expect("apply");
        assert_eq!(app.view(), View::Pricing);
        assert!(app.workspace().image().is_none());
        assert_eq!(app.workspace().result(), Some("late text"));
        assert!(!app.workspace().is_processing());
        assert_eq!(app.credits(), 4);
    }

    // Simulated checkout only: no payment gateway is contacted.
    #[tokio::test(start_paused = true)]
    async fn purchase_credits_each_tier_after_delay() {
        for tier in TIERS.iter() {
            let mut app = app(1, TestProvider::replying(None));
            app.navigate(View::Pricing);
            let started = tokio::time::Instant::now();

            let task = app.start_purchase(tier.name).expect("start");
            assert!(app.pricing().is_pending(tier.name));
            assert!(app.start_purchase(tier.name).is_err());

            let event = tokio::spawn(task).await.expect("join");
            assert!(started.elapsed() >= Duration::from_millis(800));
            app.apply(event).expect("apply");

            assert_eq!(app.credits(), 1 + tier.credits);
            assert_eq!(app.view(), View::Workspace);
            assert!(!app.pricing().is_pending(tier.name));
            assert!(app.take_notice().expect("notice").contains("simulated"));
        }
    }

    #[tokio::test]
    async fn declined_payment_adds_nothing_and_reenables_tier() {
        let mut app = build(
            0,
            Some(OcrGateway::new(TestProvider::replying(None))),
            DecliningProcessor,
        );
        app.navigate(View::Pricing);

        let err = app.buy_now("enterprise").await.unwrap_err();
        assert!(err.to_string().contains("card declined"));
        assert_eq!(app.credits(), 0);
        assert_eq!(app.view(), View::Pricing);
        assert!(!app.pricing().is_pending("Enterprise"));
        assert!(app.take_notice().expect("notice").contains("failed"));
    }

    #[tokio::test]
    async fn history_can_be_cleared() {
        let mut app = app(5, TestProvider::replying(Some("keep me")));
        let _dir = select_png(&mut app);
        app.extract_now().await.expect("extract");
        assert_eq!(app.histories().expect("histories").len(), 1);

        app.clear_histories().expect("clear");
        assert!(app.histories().expect("histories").is_empty());
        assert_eq!(app.take_notice().as_deref(), Some("Extraction history cleared."));
    }

    #[test]
    fn header_and_low_credit_warning() {
        let app = app(2, TestProvider::replying(None));
        let rendered = app.render(Instant::now());
        assert!(rendered.starts_with("TextExtract Pro  |  2 Credits"));
        assert!(rendered.contains("Low credits balance"));
        assert!(!rendered.contains(FOOTER));
    }
}
