//! Device-local persistence: a key/value port with one JSON blob per key, and the typed slots
//! built on top of it.

mod channels;
mod files;
mod memory;
mod records;
mod vault;

use crate::error::PersistError;

pub use channels::PaymentMethods;
pub use files::FileSlots;
pub use memory::MemorySlots;
pub use records::RecordStore;
pub use vault::{Credential, CredentialVault};

/// Slot holding the transaction sequence.
pub(crate) const TRANSACTIONS: &str = "transactions";
/// Slot holding the OAuth credential and sync settings.
pub(crate) const CREDENTIALS: &str = "credentials";
/// Slot holding the list of payment method labels.
pub(crate) const PAYMENT_METHODS: &str = "payment_methods";

/// Synchronous key/value storage. Each `set` replaces the whole value for `key` atomically.
///
/// Implementations report exhaustion as `PersistError::Full` so that callers can refuse the
/// mutation instead of losing it silently.
pub trait Persistence: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}
