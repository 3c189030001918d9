use crate::error::StoreError;
use crate::model::{NewRecord, RecordPatch, TransactionRecord};
use crate::store::{Persistence, TRANSACTIONS};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// The durable, ordered collection of transactions on this device, newest first by insertion.
///
/// There is no in-memory copy: every operation reads the persisted sequence, computes the new one
/// and writes it back as a single blob before returning. The returned sequence is therefore always
/// what is on disk. If the write fails, nothing has changed.
#[derive(Clone)]
pub struct RecordStore {
    slots: Arc<dyn Persistence>,
}

impl RecordStore {
    pub fn new(slots: Arc<dyn Persistence>) -> Self {
        Self { slots }
    }

    /// Reads the persisted sequence.
    ///
    /// Missing data is an empty sequence. Data that is not a JSON array is discarded: the slot is
    /// cleared and an empty sequence is returned. Elements that do not form a valid record are
    /// dropped while their valid siblings are kept.
    ///
    /// # Errors
    /// Only when the persistence backend itself cannot be read (or cleared).
    pub fn load(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        let Some(bytes) = self.slots.get(TRANSACTIONS)? else {
            return Ok(Vec::new());
        };

        let items = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                warn!(
                    "Stored transactions are a JSON {} rather than an array, resetting them",
                    json_type(&other)
                );
                self.slots.remove(TRANSACTIONS)?;
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Stored transactions are not valid JSON ({e}), resetting them");
                self.slots.remove(TRANSACTIONS)?;
                return Ok(Vec::new());
            }
        };

        let total = items.len();
        let records: Vec<TransactionRecord> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<TransactionRecord>(item).ok())
            .filter(TransactionRecord::is_intact)
            .collect();
        if records.len() < total {
            warn!(
                "Dropped {} malformed transaction(s) out of {total}",
                total - records.len()
            );
        }
        Ok(records)
    }

    /// Assigns a fresh identifier to `new`, puts it first, persists and returns the sequence.
    pub fn add(&self, new: NewRecord) -> Result<Vec<TransactionRecord>, StoreError> {
        let record = TransactionRecord::from_new(Uuid::new_v4().to_string(), new);
        record.validate()?;
        let mut records = self.load()?;
        debug!("Adding transaction {}", record.id());
        records.insert(0, record);
        self.save(&records)?;
        Ok(records)
    }

    /// Removes the record with `id`. An unknown `id` leaves the sequence unchanged.
    pub fn remove(&self, id: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            debug!("No transaction with id '{id}' to remove");
        }
        self.save(&records)?;
        Ok(records)
    }

    /// Merges `patch` into the record with `id`. An unknown `id` leaves the sequence unchanged.
    pub fn update(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.id() == id) {
            Some(record) => {
                let mut updated = record.clone();
                updated.apply(patch);
                updated.validate()?;
                *record = updated;
            }
            None => debug!("No transaction with id '{id}' to update"),
        }
        self.save(&records)?;
        Ok(records)
    }

    fn save(&self, records: &[TransactionRecord]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(records)?;
        self.slots.set(TRANSACTIONS, &bytes).map_err(|e| {
            warn!("Unable to persist transactions: {e}");
            StoreError::from(e)
        })
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Kind, Necessity};
    use crate::store::{FileSlots, MemorySlots};
    use std::str::FromStr;

    fn new_record(description: &str, amount: &str) -> NewRecord {
        NewRecord::now(
            description,
            Amount::from_str(amount).unwrap(),
            "Cash",
            Kind::Expense,
        )
    }

    fn memory_store() -> (Arc<MemorySlots>, RecordStore) {
        let slots = Arc::new(MemorySlots::new());
        let store = RecordStore::new(slots.clone());
        (slots, store)
    }

    #[test]
    fn load_empty_when_missing() {
        let (_, store) = memory_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn add_prepends() {
        let (_, store) = memory_store();
        store.add(new_record("first", "1")).unwrap();
        let returned = store.add(new_record("second", "2")).unwrap();
        assert_eq!(returned[0].description(), "second");

        let loaded = store.load().unwrap();
        assert_eq!(loaded, returned);
        assert_eq!(loaded[0].description(), "second");
        assert_eq!(loaded[1].description(), "first");
    }

    #[test]
    fn add_assigns_unique_ids() {
        let (_, store) = memory_store();
        store.add(new_record("a", "1")).unwrap();
        let records = store.add(new_record("a", "1")).unwrap();
        assert!(!records[0].id().is_empty());
        assert_ne!(records[0].id(), records[1].id());
    }

    #[test]
    fn add_rejects_non_positive_amount() {
        let (_, store) = memory_store();
        let err = store.add(new_record("refund", "-5")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let (_, store) = memory_store();
        store.add(new_record("a", "1")).unwrap();
        let before = store.add(new_record("b", "2")).unwrap();
        let after = store.remove("does-not-exist").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_drops_record() {
        let (_, store) = memory_store();
        let records = store.add(new_record("a", "1")).unwrap();
        let id = records[0].id().to_string();
        store.add(new_record("b", "2")).unwrap();
        let after = store.remove(&id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].description(), "b");
        assert_eq!(store.load().unwrap(), after);
    }

    #[test]
    fn update_merges_fields() {
        let (_, store) = memory_store();
        let records = store.add(new_record("a", "1")).unwrap();
        let id = records[0].id().to_string();
        let patch = RecordPatch {
            amount: Some(Amount::from_str("9.99").unwrap()),
            necessity: Some(Some(Necessity::Want)),
            ..RecordPatch::default()
        };
        let updated = store.update(&id, &patch).unwrap();
        assert_eq!(updated[0].amount(), Amount::from_str("9.99").unwrap());
        assert_eq!(updated[0].necessity(), Some(Necessity::Want));
        assert_eq!(updated[0].description(), "a");
        assert_eq!(updated[0].id(), id);
        assert_eq!(store.load().unwrap(), updated);
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let (_, store) = memory_store();
        let before = store.add(new_record("a", "1")).unwrap();
        let patch = RecordPatch {
            description: Some("x".into()),
            ..RecordPatch::default()
        };
        assert_eq!(store.update("nope", &patch).unwrap(), before);
    }

    #[test]
    fn update_rejects_zero_amount_and_keeps_record() {
        let (_, store) = memory_store();
        let before = store.add(new_record("a", "1")).unwrap();
        let patch = RecordPatch {
            amount: Some(Amount::from_str("0").unwrap()),
            ..RecordPatch::default()
        };
        assert!(store.update(before[0].id(), &patch).is_err());
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn corrupted_bytes_reset_slot() {
        let (slots, store) = memory_store();
        slots.insert_raw(TRANSACTIONS, "not json");
        assert!(store.load().unwrap().is_empty());
        assert!(slots.raw(TRANSACTIONS).is_none());
    }

    #[test]
    fn object_instead_of_array_resets_slot() {
        let (slots, store) = memory_store();
        slots.insert_raw(TRANSACTIONS, r#"{"id":"1"}"#);
        assert!(store.load().unwrap().is_empty());
        assert!(slots.raw(TRANSACTIONS).is_none());
    }

    #[test]
    fn invalid_elements_are_filtered() {
        let (slots, store) = memory_store();
        slots.insert_raw(
            TRANSACTIONS,
            r#"[
                {"id":"good","timestamp":"2025-03-01T10:00:00+01:00","description":"Bread",
                 "amount":3.5,"payment_method":"Cash","kind":"expense","necessity":"need"},
                {"timestamp":"2025-03-01T10:00:00Z","description":"No id",
                 "amount":1,"payment_method":"Cash","kind":"expense"},
                {"id":"","timestamp":"2025-03-01T10:00:00Z","description":"Empty id",
                 "amount":1,"payment_method":"Cash","kind":"expense"},
                {"id":"text-amount","timestamp":"2025-03-01T10:00:00Z","description":"x",
                 "amount":"ten","payment_method":"Cash","kind":"expense"},
                {"id":"bad-date","timestamp":"yesterday","description":"x",
                 "amount":1,"payment_method":"Cash","kind":"expense"},
                {"id":"savings","timestamp":"2025-03-01T10:00:00Z","description":"x",
                 "amount":1,"payment_method":"Cash","kind":"savings"},
                {"id":"also-good","timestamp":"2025-02-01T00:00:00Z","description":"Pay",
                 "amount":2000,"payment_method":"Bank Transfer","kind":"income"}
            ]"#,
        );
        let records = store.load().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["good", "also-good"]);
        // Filtering on load does not rewrite the slot.
        assert!(slots.raw(TRANSACTIONS).is_some());
    }

    #[test]
    fn amounts_reload_without_rounding() {
        let (_, store) = memory_store();
        store.add(new_record("house", "1234567890123456.78")).unwrap();
        store.add(new_record("everything", "79228162514264337593543950335")).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].amount().value().to_string(), "79228162514264337593543950335");
        assert_eq!(loaded[1].amount().value().to_string(), "1234567890123456.78");
    }

    #[test]
    fn storage_full_rejects_add_atomically() {
        let (slots, store) = memory_store();
        let before = store.add(new_record("fits", "1")).unwrap();
        let used = slots.raw(TRANSACTIONS).unwrap().len();
        slots.set_capacity(Some(used));

        let err = store.add(new_record("does not fit", "2")).unwrap_err();
        assert!(matches!(err, StoreError::StorageFull));
        let after = store.load().unwrap();
        assert_eq!(after, before);
        assert!(after.iter().all(|r| r.description() != "does not fit"));
    }

    #[test]
    fn durable_across_restart() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        let expected = {
            let store = RecordStore::new(Arc::new(FileSlots::open(&dir).unwrap()));
            let records = store.add(new_record("a", "1")).unwrap();
            let id = records[0].id().to_string();
            store.add(new_record("b", "2")).unwrap();
            store.add(new_record("c", "3")).unwrap();
            store
                .update(
                    &id,
                    &RecordPatch {
                        description: Some("a2".into()),
                        ..RecordPatch::default()
                    },
                )
                .unwrap();
            let last = store.load().unwrap()[1].id().to_string();
            store.remove(&last).unwrap()
        };

        let reopened = RecordStore::new(Arc::new(FileSlots::open(&dir).unwrap()));
        assert_eq!(reopened.load().unwrap(), expected);
        let descriptions: Vec<&str> = expected.iter().map(|r| r.description()).collect();
        assert_eq!(descriptions, vec!["c", "a2"]);
    }
}
