use anyhow::Result;
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

pub const CREDITS_KEY: &str = "ocr_app_credits";
pub const INITIAL_CREDITS: u64 = 5;
/// Below this balance the header shows a low-credit warning.
pub const LOW_CREDIT_THRESHOLD: u64 = 3;

/// Usage balance backed by a key/value store.
///
/// A new balance is written to the store first and only then taken in
/// memory, so a failed write leaves `balance()` untouched.
#[derive(Debug)]
pub struct CreditStore<S: KeyValueStore> {
    store: S,
    balance: u64,
}

impl<S: KeyValueStore> CreditStore<S> {
    /// Restores the balance from storage, falling back to `initial` when the
    /// key is absent or does not hold a non-negative integer.
    pub fn init(store: S, initial: u64) -> Self {
        let balance = match store.get(CREDITS_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!("stored credits '{}' are not a valid balance; using {}", raw, initial);
                    initial
                }
            },
            Ok(None) => initial,
            Err(err) => {
                warn!("failed to read stored credits ({:#}); using {}", err, initial);
                initial
            }
        };
        Self { store, balance }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn is_low(&self) -> bool {
        self.balance < LOW_CREDIT_THRESHOLD
    }

    /// Spends one credit. Returns `false` and leaves the balance alone when
    /// there is nothing to spend.
    pub fn deduct(&mut self) -> Result<bool> {
        if self.balance == 0 {
            return Ok(false);
        }
        self.commit(self.balance - 1)?;
        debug!("credit spent; balance {}", self.balance);
        Ok(true)
    }

    pub fn add(&mut self, amount: u64) -> Result<()> {
        self.commit(self.balance.saturating_add(amount))?;
        debug!("{} credits added; balance {}", amount, self.balance);
        Ok(())
    }

    fn commit(&mut self, balance: u64) -> Result<()> {
        self.store.set(CREDITS_KEY, &balance.to_string())?;
        self.balance = balance;
        Ok(())
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
