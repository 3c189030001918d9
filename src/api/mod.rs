//! Everything that talks to the outside world: the identity provider that issues access tokens,
//! the spreadsheet that receives the mirror, and the reachability check that decides whether to
//! try.
//!
//! Each is a trait with a Google implementation and an in-process test implementation, selected
//! by `Mode`.

mod connectivity;
mod files;
mod mirror;
mod oauth;
mod sheet;
mod sheet_test_client;
mod tokens;

use crate::error::AuthError;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub use connectivity::{StaticConnectivity, TcpReachability};
pub(crate) use mirror::DEFAULT_RANGE;
pub use mirror::{to_rows, RemoteMirror, HEADER};
pub use oauth::GoogleIdentity;
pub use sheet::GoogleSheet;
pub use sheet_test_client::{RecordedWrite, TestIdentity, TestSheet, TestSheetState};
pub use tokens::TokenManager;

/// OAuth scope required to write spreadsheet values.
pub(crate) const OAUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// Base URL of the Google Sheets REST API.
pub(crate) const SHEETS_API: &str = "https://sheets.googleapis.com";

/// Environment variable that switches the app to `Mode::Test`.
pub const TEST_MODE_ENV: &str = "FINTRACK_IN_TEST_MODE";

/// Whether we are talking to Google or to in-process stand-ins.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Google,
    Test,
}

impl Mode {
    /// `Mode::Test` when `FINTRACK_IN_TEST_MODE` is set to a non-empty value, `Mode::Google`
    /// otherwise.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// Tokens handed out by the identity provider.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Providers only sometimes rotate the refresh token.
    pub refresh_token: Option<String>,
}

/// The two ways of getting a token: asking the user, or renewing quietly.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Runs the interactive consent flow.
    async fn consent(&self) -> Result<TokenGrant, AuthError>;

    /// Obtains a new access token without user interaction.
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, AuthError>;
}

/// Why a remote call did not succeed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Rejection {
    /// The access token was not accepted (HTTP 401).
    Unauthorized(String),
    /// Anything else: other statuses, transport errors, timeouts.
    Failed(String),
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Unauthorized(detail) => write!(f, "unauthorized: {detail}"),
            Rejection::Failed(detail) => f.write_str(detail),
        }
    }
}

/// Writes and clears spreadsheet ranges.
#[async_trait::async_trait]
pub trait SheetWriter: Send + Sync {
    /// Writes `rows` starting at the top-left cell of `range`. Cells outside the written block
    /// keep their values.
    async fn replace_range(
        &self,
        access_token: String,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), Rejection>;

    /// Empties every cell in `range`.
    async fn clear_range(
        &self,
        access_token: String,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<(), Rejection>;
}

/// Reports whether the network is worth trying.
#[async_trait::async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Default bound on any single HTTP request.
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
