use crate::error::StoreError;
use crate::store::{Persistence, PAYMENT_METHODS};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_METHODS: &[&str] = &["Cash", "Debit Card", "Credit Card", "Bank Transfer"];

/// The user's list of payment method labels, offered when entering a transaction.
#[derive(Clone)]
pub struct PaymentMethods {
    slots: Arc<dyn Persistence>,
}

impl PaymentMethods {
    pub fn new(slots: Arc<dyn Persistence>) -> Self {
        Self { slots }
    }

    /// Returns the stored labels. Missing, unreadable or empty data falls back to the defaults.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let stored = match self.slots.get(PAYMENT_METHODS)? {
            Some(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(methods) => methods,
                Err(e) => {
                    warn!("Ignoring unreadable payment methods ({e}), using the defaults");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let methods: Vec<String> = stored
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if methods.is_empty() {
            return Ok(defaults());
        }
        Ok(methods)
    }

    /// Appends `label` unless an equal label (ignoring case) already exists.
    pub fn add(&self, label: &str) -> Result<Vec<String>, StoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::invalid("a payment method cannot be empty"));
        }
        let mut methods = self.list()?;
        if methods.iter().any(|m| m.eq_ignore_ascii_case(label)) {
            debug!("Payment method '{label}' already exists");
            return Ok(methods);
        }
        methods.push(label.to_string());
        self.save(&methods)?;
        Ok(methods)
    }

    /// Removes `label` (ignoring case). Removing an unknown label changes nothing.
    pub fn remove(&self, label: &str) -> Result<Vec<String>, StoreError> {
        let label = label.trim();
        let mut methods = self.list()?;
        let before = methods.len();
        methods.retain(|m| !m.eq_ignore_ascii_case(label));
        if methods.len() != before {
            self.save(&methods)?;
        }
        Ok(methods)
    }

    fn save(&self, methods: &[String]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(methods)?;
        self.slots.set(PAYMENT_METHODS, &bytes)?;
        Ok(())
    }
}

fn defaults() -> Vec<String> {
    DEFAULT_METHODS.iter().map(|s| s.to_string()).collect()
}
