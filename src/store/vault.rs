use crate::error::StoreError;
use crate::store::{Persistence, CREDENTIALS};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// The persisted connection to the remote spreadsheet. Its absence means "not connected".
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub spreadsheet_id: String,
    #[serde(default)]
    pub auto_sync_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_epoch_millis: Option<i64>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            spreadsheet_id: spreadsheet_id.into(),
            auto_sync_enabled: true,
            last_sync_epoch_millis: None,
        }
    }

    /// True when there is a spreadsheet to write to.
    pub fn is_configured(&self) -> bool {
        !self.spreadsheet_id.trim().is_empty()
    }
}

/// A plain persisted slot for the `Credential`. It performs no validation.
///
/// Reads and writes are serialized by an internal lock so that read-modify-write updates from
/// concurrent tasks (token refresh, sync timestamps, disconnect) never interleave.
pub struct CredentialVault {
    slots: Arc<dyn Persistence>,
    lock: Mutex<()>,
}

impl CredentialVault {
    pub fn new(slots: Arc<dyn Persistence>) -> Self {
        Self {
            slots,
            lock: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Result<Option<Credential>, StoreError> {
        let _guard = self.guard();
        self.read()
    }

    /// Saves `credential`. Saving `None` disconnects by clearing the slot.
    pub fn save(&self, credential: Option<&Credential>) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.write(credential)
    }

    /// Applies `change` to the stored credential, if there is one, and returns the result.
    /// Returns `None` without writing anything when not connected.
    pub fn update<F>(&self, change: F) -> Result<Option<Credential>, StoreError>
    where
        F: FnOnce(&mut Credential),
    {
        let _guard = self.guard();
        let Some(mut credential) = self.read()? else {
            return Ok(None);
        };
        change(&mut credential);
        self.write(Some(&credential))?;
        Ok(Some(credential))
    }

    /// Stamps the time of a successful push.
    pub fn record_sync(&self, epoch_millis: i64) -> Result<(), StoreError> {
        self.update(|c| c.last_sync_epoch_millis = Some(epoch_millis))
            .map(|_| ())
    }

    fn read(&self) -> Result<Option<Credential>, StoreError> {
        let Some(bytes) = self.slots.get(CREDENTIALS)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!("Ignoring unreadable credentials ({e}), you will need to reconnect");
                Ok(None)
            }
        }
    }

    fn write(&self, credential: Option<&Credential>) -> Result<(), StoreError> {
        match credential {
            Some(credential) => {
                debug!("Saving credentials");
                let bytes = serde_json::to_vec(credential)?;
                self.slots.set(CREDENTIALS, &bytes)?;
            }
            None => {
                debug!("Clearing credentials");
                self.slots.remove(CREDENTIALS)?;
            }
        }
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
