//! These structs provide the CLI interface for the fintrack CLI.

use crate::model::{Amount, Kind, Necessity};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// fintrack: a local-first expense and income tracker.
///
/// Transactions are stored on this machine and work fully offline. Once you connect a Google
/// account, every change is mirrored to a Google Sheet shortly after you make it.
///
/// You will need to set up a Google Sheets API OAuth client for this. Run `fintrack init` with the
/// downloaded client secret and the URL of the sheet, then `fintrack auth`.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory and initialize the configuration files.
    ///
    /// This is the first command you should run. You need two things beforehand:
    ///
    /// - The URL of the Google Sheet that should receive your transactions, passed as
    ///   --sheet-url.
    ///
    /// - An OAuth 2.0 Desktop client secret downloaded from the Google Cloud Console, with
    ///   http://localhost as a redirect URI, passed as --client-secret.
    Init(InitArgs),
    /// Connect your Google account. Opens the consent screen and turns auto-sync on.
    Auth,
    /// Forget the Google connection. Local transactions are kept.
    Disconnect,
    /// Show the connection and sync state.
    Status,
    /// Turn automatic sync after every change on or off.
    AutoSync(AutoSyncArgs),
    /// Record a new expense or income.
    Add(AddArgs),
    /// Change fields of an existing transaction.
    Update(UpdateArgs),
    /// Delete a transaction.
    Delete(DeleteArgs),
    /// List all transactions, newest first.
    List,
    /// Push all transactions to the Google Sheet now and report the outcome.
    Sync,
    /// Manage the list of payment methods.
    #[command(subcommand)]
    Channels(ChannelsCommand),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where fintrack data and configuration is held. Defaults to ~/fintrack
    #[arg(long, env = "FINTRACK_HOME", default_value_t = default_fintrack_home())]
    fintrack_home: DisplayPath,

    /// Behave as if there were no network connection.
    #[arg(long)]
    offline: bool,
}

impl Common {
    pub fn new(log_level: LevelFilter, fintrack_home: PathBuf, offline: bool) -> Self {
        Self {
            log_level,
            fintrack_home: fintrack_home.into(),
            offline,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn fintrack_home(&self) -> &DisplayPath {
        &self.fintrack_home
    }

    pub fn offline(&self) -> bool {
        self.offline
    }
}

/// (Not shown): Args for the `fintrack init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// The path to your downloaded OAuth client secret. This file will be copied to the default
    /// secrets location in the home directory.
    #[arg(long)]
    client_secret: PathBuf,
}

impl InitArgs {
    pub fn new(sheet_url: impl Into<String>, client_secret: impl Into<PathBuf>) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    #[default]
    On,
    Off,
}

serde_plain::derive_display_from_serialize!(Toggle);
serde_plain::derive_fromstr_from_deserialize!(Toggle);

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

/// (Not shown): Args for the `fintrack auto-sync` command.
#[derive(Debug, Parser, Clone)]
pub struct AutoSyncArgs {
    /// "on" or "off"
    state: Toggle,
}

impl AutoSyncArgs {
    pub fn new(state: Toggle) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Toggle {
        self.state
    }
}

/// (Not shown): Args for the `fintrack add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// A positive amount, e.g. 12.50
    #[arg(long)]
    pub amount: Amount,

    #[arg(long)]
    pub description: String,

    /// One of the labels from `fintrack channels list`, e.g. "Cash"
    #[arg(long)]
    pub payment_method: String,

    /// "expense" or "income"
    #[arg(long, default_value_t = Kind::Expense)]
    pub kind: Kind,

    /// "need" or "want". Only kept on expenses.
    #[arg(long)]
    pub necessity: Option<Necessity>,

    /// YYYY-MM-DD, DD/MM/YYYY or an RFC 3339 timestamp. Defaults to now.
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<FixedOffset>>,
}

/// (Not shown): Args for the `fintrack update` command.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// The id of the transaction, as shown by `fintrack list`
    pub id: String,

    #[arg(long)]
    pub amount: Option<Amount>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub payment_method: Option<String>,

    #[arg(long)]
    pub kind: Option<Kind>,

    #[arg(long, conflicts_with = "clear_necessity")]
    pub necessity: Option<Necessity>,

    /// Remove the need/want tag.
    #[arg(long)]
    pub clear_necessity: bool,

    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<FixedOffset>>,
}

/// (Not shown): Args for the `fintrack delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The id of the transaction, as shown by `fintrack list`
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChannelsCommand {
    /// Show the payment methods.
    List,
    /// Add a payment method.
    Add { label: String },
    /// Remove a payment method.
    Remove { label: String },
}

/// Parses a transaction date. Plain dates are placed at noon local time.
pub fn parse_date(s: &str) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .map_err(|_| format!("'{s}' is not a date, expected YYYY-MM-DD or DD/MM/YYYY"))?;
    let noon = date
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| format!("'{s}' is not a valid date"))?;
    Local
        .from_local_datetime(&noon)
        .earliest()
        .map(|local| local.fixed_offset())
        .ok_or_else(|| format!("'{s}' does not exist in the local timezone"))
}

fn default_fintrack_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("fintrack"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --fintrack-home or FINTRACK_HOME instead of relying on the \
                default home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("fintrack")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_add_command() {
        let args = Args::try_parse_from([
            "fintrack",
            "--offline",
            "add",
            "--amount",
            "12.50",
            "--description",
            "Lunch",
            "--payment-method",
            "Cash",
            "--necessity",
            "want",
            "--date",
            "2024-03-05",
        ])
        .unwrap();
        assert!(args.common().offline());
        let Command::Add(add) = args.command() else {
            panic!("expected add");
        };
        assert_eq!(add.amount.to_string(), "12.50");
        assert_eq!(add.kind, Kind::Expense);
        assert_eq!(add.necessity, Some(Necessity::Want));
        assert_eq!(add.date.unwrap().day(), 5);
    }

    #[test]
    fn update_rejects_conflicting_necessity_flags() {
        let result = Args::try_parse_from([
            "fintrack",
            "update",
            "abc",
            "--necessity",
            "need",
            "--clear-necessity",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn auto_sync_takes_on_or_off() {
        let args = Args::try_parse_from(["fintrack", "auto-sync", "off"]).unwrap();
        let Command::AutoSync(auto) = args.command() else {
            panic!("expected auto-sync");
        };
        assert!(!auto.state().enabled());
        assert!(Args::try_parse_from(["fintrack", "auto-sync", "maybe"]).is_err());
    }

    #[test]
    fn dates() {
        assert_eq!(parse_date("05/03/2024").unwrap().month(), 3);
        assert_eq!(
            parse_date("2024-03-05T23:30:00-03:00").unwrap().to_rfc3339(),
            "2024-03-05T23:30:00-03:00"
        );
        assert!(parse_date("yesterday").is_err());
    }
}
