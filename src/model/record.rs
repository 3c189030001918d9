use crate::error::StoreError;
use crate::model::Amount;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

/// Whether money went out or came in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Expense,
    Income,
}

serde_plain::derive_display_from_serialize!(Kind);
serde_plain::derive_fromstr_from_deserialize!(Kind);

/// Optional tag on an expense.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Necessity {
    Need,
    Want,
}

serde_plain::derive_display_from_serialize!(Necessity);
serde_plain::derive_fromstr_from_deserialize!(Necessity);

/// A single transaction as it is persisted on the device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransactionRecord {
    id: String,
    timestamp: DateTime<FixedOffset>,
    description: String,
    amount: Amount,
    payment_method: String,
    kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    necessity: Option<Necessity>,
}

impl TransactionRecord {
    pub(crate) fn from_new(id: String, new: NewRecord) -> Self {
        let mut record = Self {
            id,
            timestamp: new.timestamp,
            description: new.description,
            amount: new.amount,
            payment_method: new.payment_method,
            kind: new.kind,
            necessity: new.necessity,
        };
        record.normalize();
        record
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn necessity(&self) -> Option<Necessity> {
        self.necessity
    }

    /// Applies the fields that are present in `patch`.
    pub(crate) fn apply(&mut self, patch: &RecordPatch) {
        if let Some(timestamp) = patch.timestamp {
            self.timestamp = timestamp;
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(payment_method) = &patch.payment_method {
            self.payment_method = payment_method.clone();
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(necessity) = patch.necessity {
            self.necessity = necessity;
        }
        self.normalize();
    }

    /// Income never carries a necessity tag.
    fn normalize(&mut self) {
        if self.kind == Kind::Income {
            self.necessity = None;
        }
    }

    /// Whether a record read back from storage is fit to be kept.
    pub(crate) fn is_intact(&self) -> bool {
        !self.id.trim().is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if !self.amount.is_positive() {
            return Err(StoreError::invalid(format!(
                "the amount must be greater than zero, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// A record that has not been stored yet, so it has no identifier.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub description: String,
    pub amount: Amount,
    pub payment_method: String,
    pub kind: Kind,
    pub necessity: Option<Necessity>,
}

impl NewRecord {
    /// Creates an expense or income timestamped now, in the local timezone.
    pub fn now(
        description: impl Into<String>,
        amount: Amount,
        payment_method: impl Into<String>,
        kind: Kind,
    ) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            description: description.into(),
            amount,
            payment_method: payment_method.into(),
            kind,
            necessity: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_necessity(mut self, necessity: Option<Necessity>) -> Self {
        self.necessity = necessity;
        self
    }
}

/// The fields to change on an existing record. `None` leaves a field as it is. For `necessity`,
/// `Some(None)` clears the tag.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RecordPatch {
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub description: Option<String>,
    pub amount: Option<Amount>,
    pub payment_method: Option<String>,
    pub kind: Option<Kind>,
    pub necessity: Option<Option<Necessity>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }
}
