//! Debounced, single-flight mirroring of the record store.
//!
//! Every mutation hands the scheduler the full, current record sequence. The scheduler waits for
//! a quiet period, then pushes the newest snapshot it has seen. Snapshots are ordered by the
//! `Ticket` taken when they were produced, not by when `notify` gets to look at them.
//!
//! Pushes never overlap: manual and automatic pushes share one lock, and snapshots that become
//! due while a push is running are folded into a single follow-up push.

use crate::api::{Connectivity, RemoteMirror};
use crate::error::SyncError;
use crate::model::TransactionRecord;
use crate::store::CredentialVault;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default quiet period between the last mutation and the automatic push.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Schedules automatic pushes after mutations and runs manual ones.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    mirror: Arc<RemoteMirror>,
    vault: Arc<CredentialVault>,
    connectivity: Arc<dyn Connectivity>,
    quiet: Duration,
    state: Mutex<State>,
    /// Held for the duration of every push.
    flight: tokio::sync::Mutex<()>,
    /// `true` while a timer is armed or a drain is running.
    busy: watch::Sender<bool>,
}

/// The position of a snapshot in mutation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Default)]
struct State {
    /// Number of tickets handed out so far.
    issued: u64,
    /// Snapshot carried by the armed timer.
    pending: Option<Vec<TransactionRecord>>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    /// Snapshot that is due and waits for the running drain.
    queued: Option<Vec<TransactionRecord>>,
    draining: bool,
    last_error: Option<String>,
}

impl SyncScheduler {
    pub fn new(
        mirror: Arc<RemoteMirror>,
        vault: Arc<CredentialVault>,
        connectivity: Arc<dyn Connectivity>,
        quiet: Duration,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                mirror,
                vault,
                connectivity,
                quiet,
                state: Mutex::new(State::default()),
                flight: tokio::sync::Mutex::new(()),
                busy,
            }),
        }
    }

    /// Reserves the next position in mutation order. Take it while the mutation that produced the
    /// snapshot still excludes other mutations, then hand both to `notify_in_order`.
    pub fn ticket(&self) -> Ticket {
        let mut state = self.inner.lock();
        state.issued += 1;
        Ticket(state.issued)
    }

    /// Called after every mutation with the sequence the store returned. Same as
    /// `notify_in_order` with a ticket taken now.
    pub async fn notify(&self, records: Vec<TransactionRecord>) {
        let ticket = self.ticket();
        self.notify_in_order(ticket, records).await
    }

    /// Does nothing when not connected, when auto-sync is off or when the device is offline.
    /// Otherwise cancels the armed timer, if any, and arms a new one carrying `records`.
    ///
    /// A snapshot whose ticket is older than the newest one handed out is dropped: the caller
    /// holding the newer ticket carries a more recent state and decides what to schedule.
    pub async fn notify_in_order(&self, ticket: Ticket, records: Vec<TransactionRecord>) {
        match self.inner.vault.get() {
            Ok(Some(credential)) if credential.is_configured() && credential.auto_sync_enabled => {}
            Ok(Some(_)) => {
                debug!("Auto-sync is off");
                return;
            }
            Ok(None) => {
                debug!("Not connected, nothing to schedule");
                return;
            }
            Err(e) => {
                warn!("Unable to read credentials, not scheduling a sync: {e}");
                return;
            }
        }
        if !self.inner.connectivity.is_online().await {
            debug!("Offline, not scheduling a sync");
            return;
        }

        let mut state = self.inner.lock();
        if ticket < Ticket(state.issued) {
            debug!("A newer snapshot has been handed in, dropping {ticket:?}");
            return;
        }
        state.pending = Some(records);
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let generation = state.generation;
        state.timer = Some(tokio::spawn(Inner::fire(
            Arc::clone(&self.inner),
            generation,
        )));
        self.inner.publish(&state);
        debug!("Sync scheduled in {:?}", self.inner.quiet);
    }

    /// Drops the armed timer and its snapshot. A push that has already started runs to completion.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.pending = None;
        if let Some(timer) = state.timer.take() {
            debug!("Cancelling scheduled sync");
            timer.abort();
        }
        self.inner.publish(&state);
    }

    /// Pushes `records` now and reports the outcome. Waits for any push already in flight.
    /// `Ok(false)` means the device was offline and nothing was written.
    pub async fn sync_now(&self, records: &[TransactionRecord]) -> Result<bool, SyncError> {
        let result = self.inner.push(records).await;
        if let Err(e) = &result {
            warn!("Sync failed: {e}");
        }
        result
    }

    /// Waits until no timer is armed and no automatic push is running.
    pub async fn settle(&self) {
        let mut busy = self.inner.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// The error of the most recent push, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().timer.is_some()
    }
}

impl Inner {
    async fn fire(inner: Arc<Inner>, generation: u64) {
        tokio::time::sleep(inner.quiet).await;
        {
            let mut state = inner.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
            if let Some(snapshot) = state.pending.take() {
                state.queued = Some(snapshot);
            }
            if state.draining {
                debug!("A sync is already running, it will push the latest snapshot next");
                inner.publish(&state);
                return;
            }
            state.draining = true;
            inner.publish(&state);
        }
        inner.drain().await;
    }

    async fn drain(&self) {
        loop {
            let records = {
                let mut state = self.lock();
                match state.queued.take() {
                    Some(records) => records,
                    None => {
                        state.draining = false;
                        self.publish(&state);
                        return;
                    }
                }
            };
            if let Err(e) = self.push(&records).await {
                warn!("Automatic sync failed: {e}");
            }
        }
    }

    /// One push under the flight lock. Stamps the vault after a successful write. `Ok(false)`
    /// means the device was offline.
    async fn push(&self, records: &[TransactionRecord]) -> Result<bool, SyncError> {
        let _flight = self.flight.lock().await;
        let result = match self.mirror.try_push(records).await {
            Ok(true) => self
                .vault
                .record_sync(Utc::now().timestamp_millis())
                .map(|_| true)
                .map_err(SyncError::from),
            other => other,
        };
        let mut state = self.lock();
        match &result {
            Ok(true) => {
                state.last_error = None;
                info!("Sync complete");
            }
            Ok(false) => state.last_error = None,
            Err(e) => state.last_error = Some(e.to_string()),
        }
        result
    }

    fn publish(&self, state: &State) {
        self.busy
            .send_replace(state.timer.is_some() || state.draining);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
