//! The application facade: the record store with the sync machinery wired behind it.

use crate::api::{
    Connectivity, GoogleIdentity, GoogleSheet, IdentityProvider, Mode, RemoteMirror, SheetWriter,
    StaticConnectivity, TcpReachability, TestIdentity, TestSheet, TokenManager,
};
use crate::error::{AuthError, StoreError, SyncError};
use crate::model::{NewRecord, RecordPatch, TransactionRecord};
use crate::store::{
    Credential, CredentialVault, FileSlots, PaymentMethods, Persistence, RecordStore,
};
use crate::sync::SyncScheduler;
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// The collaborators an `App` is assembled from.
pub struct Backends {
    pub slots: Arc<dyn Persistence>,
    pub identity: Arc<dyn IdentityProvider>,
    pub writer: Arc<dyn SheetWriter>,
    pub connectivity: Arc<dyn Connectivity>,
    pub spreadsheet_id: String,
    pub sheet_range: String,
    pub debounce: Duration,
}

/// Connection and sync state, for display.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub connected: bool,
    pub spreadsheet_id: Option<String>,
    pub auto_sync: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub records: usize,
    pub sync_scheduled: bool,
    pub last_error: Option<String>,
}

pub struct App {
    records: RecordStore,
    vault: Arc<CredentialVault>,
    channels: PaymentMethods,
    tokens: Arc<TokenManager>,
    scheduler: SyncScheduler,
    spreadsheet_id: String,
    /// Serializes mutations so that snapshots reach the scheduler in the order they were made.
    writes: Mutex<()>,
}

impl App {
    /// Opens the app on the data directory named by `config`. `Mode::Test` swaps Google for
    /// in-process stand-ins. `offline` forces the connectivity check to fail.
    pub fn open(config: &Config, mode: Mode, offline: bool) -> Result<Self> {
        let slots: Arc<dyn Persistence> = Arc::new(FileSlots::open(config.data_dir())?);
        let (identity, writer, connectivity): (
            Arc<dyn IdentityProvider>,
            Arc<dyn SheetWriter>,
            Arc<dyn Connectivity>,
        ) = match mode {
            Mode::Google => (
                Arc::new(GoogleIdentity::new(
                    config.client_secret_path(),
                    config.http_timeout(),
                )?),
                Arc::new(GoogleSheet::new(config.http_timeout())?),
                Arc::new(TcpReachability::default()),
            ),
            Mode::Test => (
                Arc::new(TestIdentity::new()),
                Arc::new(TestSheet::new()),
                Arc::new(StaticConnectivity::online()),
            ),
        };
        let connectivity: Arc<dyn Connectivity> = if offline {
            Arc::new(StaticConnectivity::offline())
        } else {
            connectivity
        };
        debug!("Opening {mode:?} app on {}", config.data_dir().display());
        Ok(Self::new(Backends {
            slots,
            identity,
            writer,
            connectivity,
            spreadsheet_id: config.spreadsheet_id().to_string(),
            sheet_range: config.sheet_range().to_string(),
            debounce: config.debounce(),
        }))
    }

    pub fn new(backends: Backends) -> Self {
        let Backends {
            slots,
            identity,
            writer,
            connectivity,
            spreadsheet_id,
            sheet_range,
            debounce,
        } = backends;
        let vault = Arc::new(CredentialVault::new(slots.clone()));
        let tokens = Arc::new(TokenManager::new(
            identity,
            vault.clone(),
            connectivity.clone(),
        ));
        let mirror = Arc::new(RemoteMirror::new(
            writer,
            tokens.clone(),
            vault.clone(),
            connectivity.clone(),
            sheet_range,
        ));
        let scheduler = SyncScheduler::new(mirror, vault.clone(), connectivity, debounce);
        Self {
            records: RecordStore::new(slots.clone()),
            vault,
            channels: PaymentMethods::new(slots),
            tokens,
            scheduler,
            spreadsheet_id,
            writes: Mutex::new(()),
        }
    }

    pub fn list(&self) -> std::result::Result<Vec<TransactionRecord>, StoreError> {
        self.records.load()
    }

    pub async fn add(
        &self,
        new: NewRecord,
    ) -> std::result::Result<Vec<TransactionRecord>, StoreError> {
        self.mutate(|store| store.add(new)).await
    }

    pub async fn update(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> std::result::Result<Vec<TransactionRecord>, StoreError> {
        self.mutate(|store| store.update(id, patch)).await
    }

    pub async fn remove(
        &self,
        id: &str,
    ) -> std::result::Result<Vec<TransactionRecord>, StoreError> {
        self.mutate(|store| store.remove(id)).await
    }

    /// Applies `change` to the store and hands the result to the scheduler. The ticket is taken
    /// before another mutation can start, so a slow `notify` cannot let an older snapshot win.
    async fn mutate<F>(&self, change: F) -> std::result::Result<Vec<TransactionRecord>, StoreError>
    where
        F: FnOnce(&RecordStore) -> std::result::Result<Vec<TransactionRecord>, StoreError>,
    {
        let (records, ticket) = {
            let _writing = self
                .writes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let records = change(&self.records)?;
            (records, self.scheduler.ticket())
        };
        self.scheduler.notify_in_order(ticket, records.clone()).await;
        Ok(records)
    }

    /// Pushes the current records now, surfacing any failure. `Ok(false)` means the device was
    /// offline and nothing was written.
    pub async fn sync_now(&self) -> std::result::Result<bool, SyncError> {
        let records = self.records.load()?;
        self.scheduler.sync_now(&records).await
    }

    /// Runs the consent flow and stores the resulting credential with auto-sync on. A refresh
    /// token from an earlier connection is kept if the provider did not issue a new one.
    pub async fn connect(&self) -> std::result::Result<Credential, AuthError> {
        let grant = self.tokens.authenticate_interactive().await?;
        let previous = self.vault.get()?.and_then(|c| c.refresh_token);
        let credential = Credential::new(
            grant.access_token,
            grant.refresh_token.or(previous),
            self.spreadsheet_id.clone(),
        );
        self.vault.save(Some(&credential))?;
        info!("Connected to spreadsheet {}", self.spreadsheet_id);
        Ok(credential)
    }

    pub fn disconnect(&self) -> std::result::Result<(), StoreError> {
        self.scheduler.cancel();
        self.vault.save(None)?;
        info!("Disconnected");
        Ok(())
    }

    /// Turns automatic sync on or off. Returns `false` when not connected, in which case nothing
    /// changes.
    pub fn set_auto_sync(&self, enabled: bool) -> std::result::Result<bool, StoreError> {
        let updated = self.vault.update(|c| c.auto_sync_enabled = enabled)?;
        if !enabled {
            self.scheduler.cancel();
        }
        Ok(updated.is_some())
    }

    pub fn status(&self) -> std::result::Result<Status, StoreError> {
        let credential = self.vault.get()?;
        let records = self.records.load()?.len();
        Ok(Status {
            connected: credential.is_some(),
            spreadsheet_id: credential.as_ref().map(|c| c.spreadsheet_id.clone()),
            auto_sync: credential.as_ref().is_some_and(|c| c.auto_sync_enabled),
            last_sync: credential
                .as_ref()
                .and_then(|c| c.last_sync_epoch_millis)
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            records,
            sync_scheduled: self.scheduler.is_scheduled(),
            last_error: self.scheduler.last_error(),
        })
    }

    /// Waits for a scheduled sync to run and finish.
    pub async fn settle(&self) {
        self.scheduler.settle().await
    }

    pub fn payment_methods(&self) -> &PaymentMethods {
        &self.channels
    }
}
