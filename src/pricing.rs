use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::credits::CreditStore;
use crate::storage::KeyValueStore;

pub const PURCHASE_DELAY_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingTier {
    pub name: &'static str,
    pub price: &'static str,
    pub credits: u64,
    pub features: &'static [&'static str],
    pub button: &'static str,
    pub popular: bool,
}

pub static TIERS: [PricingTier; 3] = [
    PricingTier {
        name: "Starter",
        price: "$0",
        credits: 5,
        features: &["5 free credits", "Standard speed", "Basic support"],
        button: "Claim Free",
        popular: false,
    },
    PricingTier {
        name: "Pro",
        price: "$10",
        credits: 50,
        features: &[
            "50 credits",
            "Priority processing",
            "History access",
            "Email support",
        ],
        button: "Buy Now",
        popular: true,
    },
    PricingTier {
        name: "Enterprise",
        price: "$49",
        credits: 300,
        features: &["300 credits", "Highest priority", "API Access", "24/7 Support"],
        button: "Contact Sales",
        popular: false,
    },
];

pub fn find_tier(name: &str) -> Option<&'static PricingTier> {
    let name = name.trim();
    TIERS.iter().find(|tier| tier.name.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    #[error("unknown tier '{0}' (expected starter, pro or enterprise)")]
    UnknownTier(String),
    #[error("a purchase of {0} is already in progress")]
    Pending(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tier: &'static str,
    pub credits: u64,
    /// Always true for the simulator; nothing was charged.
    pub simulated: bool,
}

pub type PaymentFuture = Pin<Box<dyn Future<Output = Result<Receipt>> + Send>>;

/// Settles a tier purchase. The credit store never sees this seam, so a
/// real payment backend can replace the simulator without touching it.
pub trait PaymentProcessor: Clone + Send + Sync + 'static {
    fn charge(&self, tier: &'static PricingTier) -> PaymentFuture;
}

/// Fake checkout: waits a fixed delay and approves every purchase.
#[derive(Debug, Clone)]
pub struct PaymentSimulator {
    delay: Duration,
}

impl PaymentSimulator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for PaymentSimulator {
    fn default() -> Self {
        Self::new(Duration::from_millis(PURCHASE_DELAY_MS))
    }
}

impl PaymentProcessor for PaymentSimulator {
    fn charge(&self, tier: &'static PricingTier) -> PaymentFuture {
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            info!("simulated purchase of {} ({} credits)", tier.name, tier.credits);
            Ok(Receipt {
                tier: tier.name,
                credits: tier.credits,
                simulated: true,
            })
        })
    }
}

/// Tier list plus the set of purchase buttons currently disabled.
#[derive(Debug, Default)]
pub struct PricingView {
    pending: HashSet<&'static str>,
}

impl PricingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, tier: &str) -> bool {
        self.pending.contains(tier)
    }

    /// Disables the tier's button until the purchase settles.
    pub fn begin_purchase(&mut self, name: &str) -> Result<&'static PricingTier, PurchaseError> {
        let tier = find_tier(name).ok_or_else(|| PurchaseError::UnknownTier(name.to_string()))?;
        if !self.pending.insert(tier.name) {
            return Err(PurchaseError::Pending(tier.name));
        }
        Ok(tier)
    }

    pub fn complete_purchase<S: KeyValueStore>(
        &mut self,
        receipt: &Receipt,
        credits: &mut CreditStore<S>,
    ) -> Result<()> {
        self.pending.remove(receipt.tier);
        credits.add(receipt.credits)
    }

    pub fn abort_purchase(&mut self, tier: &str) {
        self.pending.remove(tier);
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "Simple, transparent pricing".to_string(),
            "Buy credits as you go. No monthly subscriptions.".to_string(),
        ];
        for tier in TIERS.iter() {
            lines.push(String::new());
            let marker = if tier.popular { "  MOST POPULAR" } else { "" };
            lines.push(format!("{} {}{}", tier.name, tier.price, marker));
            for feature in tier.features {
                lines.push(format!("  - {}", feature));
            }
            let button = if self.is_pending(tier.name) {
                "Processing...".to_string()
            } else {
                format!("{} (/buy {})", tier.button, tier.name.to_lowercase())
            };
            lines.push(format!("  [{}]", button));
        }
        lines.join("\n")
    }
}

pub fn format_tiers() -> String {
    TIERS
        .iter()
        .map(|tier| {
            format!(
                "{}\t{}\t{} credits{}",
                tier.name.to_lowercase(),
                tier.price,
                tier.credits,
                if tier.popular { "\tpopular" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
