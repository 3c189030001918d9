//! Error types.
//!
//! Application glue (configuration, commands, the CLI) uses `anyhow` through [`Result`]. The
//! record store and the sync machinery use the typed errors below so that callers can tell
//! "storage is full" apart from "reconnect your account" apart from "the sheet said no".

use thiserror::Error;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a `Persistence` backend.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The backend has no room left for the value being written.
    #[error("Storage is full, unable to write '{key}'")]
    Full { key: String },

    /// Any other I/O failure.
    #[error("Unable to access the '{key}' slot: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by `RecordStore` and the other persisted slots.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write was rejected because storage is exhausted. Nothing was changed.
    #[error("Storage is full, the change was not saved")]
    StorageFull,

    /// The caller supplied a record that cannot be stored.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Persistence(PersistError),

    #[error("Unable to serialize data: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PersistError> for StoreError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::Full { .. } => StoreError::StorageFull,
            other => StoreError::Persistence(other),
        }
    }
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }
}

/// Errors raised while obtaining or refreshing an access token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("You are offline, connect to the internet and try again")]
    Offline,

    /// The identity provider's client could not be loaded or reached.
    #[error("The identity provider is unavailable: {0}")]
    ProviderUnavailable(String),

    /// The user declined consent, or the app is not authorized for the account.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unable to refresh the access token: {0}")]
    RefreshFailed(String),

    #[error("Unable to use the credential vault: {0}")]
    Vault(#[from] StoreError),
}

impl AuthError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::ProviderUnavailable(detail.into())
    }

    pub fn denied(detail: impl Into<String>) -> Self {
        Self::AccessDenied(detail.into())
    }

    pub fn refresh_failed(detail: impl Into<String>) -> Self {
        Self::RefreshFailed(detail.into())
    }
}

/// Errors raised by a push to the remote mirror.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No spreadsheet is configured, run 'fintrack auth' first")]
    NotConfigured,

    /// The access token was rejected and could not be renewed. Terminal until the user reconnects.
    #[error("Your Google session has expired, run 'fintrack auth' to reconnect")]
    ReauthenticationRequired,

    /// The remote service rejected the write for a reason other than authorization.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Unable to use the credential vault: {0}")]
    Vault(#[from] StoreError),
}
