//! Types that represent the core data model, such as `TransactionRecord` and `Amount`.
mod amount;
mod record;

pub use amount::{Amount, AmountError};
pub use record::{Kind, Necessity, NewRecord, RecordPatch, TransactionRecord};
