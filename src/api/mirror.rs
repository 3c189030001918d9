use crate::api::{Connectivity, SheetWriter, TokenManager};
use crate::error::SyncError;
use crate::model::TransactionRecord;
use crate::store::CredentialVault;
use std::sync::Arc;
use tracing::{debug, info};

/// The first row written to the sheet.
pub const HEADER: [&str; 6] = [
    "Date",
    "Description",
    "Amount",
    "Payment Method",
    "Type",
    "Necessity",
];

/// Range written when the configuration does not name one.
pub(crate) const DEFAULT_RANGE: &str = "Transactions!A1";

/// Renders `records` as sheet rows, header first, in the order given.
pub fn to_rows(records: &[TransactionRecord]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(HEADER.iter().map(|s| s.to_string()).collect());
    rows.extend(records.iter().map(|r| {
        vec![
            r.timestamp().format("%d/%m/%Y").to_string(),
            r.description().to_string(),
            r.amount().to_string(),
            r.payment_method().to_string(),
            r.kind().to_string(),
            r.necessity().map(|n| n.to_string()).unwrap_or_default(),
        ]
    }));
    rows
}

/// Where an A1 range such as `Transactions!B3:G` starts, and where it ends horizontally.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct Anchor {
    /// Zero-based.
    pub column: usize,
    /// One-based, as in A1 notation.
    pub row: usize,
    /// `None` when the range has no end or its end names no column.
    pub last_column: Option<usize>,
}

impl Anchor {
    /// Parses `range`, returning the sheet prefix (including the `!`) and the anchor.
    pub(crate) fn parse(range: &str) -> Option<(&str, Anchor)> {
        let (prefix, cells) = match range.rfind('!') {
            Some(at) => range.split_at(at + 1),
            None => ("", range),
        };
        let (first, last) = match cells.split_once(':') {
            Some((first, last)) => (first, Some(last)),
            None => (cells, None),
        };
        let (letters, digits) = first.split_at(first.find(|c: char| c.is_ascii_digit())?);
        let column = column_index(letters)?;
        let row = digits.parse::<usize>().ok().filter(|row| *row > 0)?;
        let last_column = last.and_then(|last| {
            let end = last.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(last.len());
            column_index(&last[..end])
        });
        Some((
            prefix,
            Anchor {
                column,
                row,
                last_column,
            },
        ))
    }
}

/// `A` is `0`, `Z` is `25`, `AA` is `26`.
fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letters.chars().try_fold(0_usize, |acc, c| {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })?;
    Some(n - 1)
}

/// `0` is `A`, `25` is `Z`, `26` is `AA`.
fn column_name(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        letters.push(char::from(b'A' + ((n - 1) % 26) as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// The open-ended block under `rows` rows written at `range`, `width` columns wide. This is where
/// rows from a longer earlier push are left behind.
pub(crate) fn rows_below(range: &str, rows: usize, width: usize) -> Option<String> {
    let (prefix, anchor) = Anchor::parse(range)?;
    Some(format!(
        "{prefix}{}{}:{}",
        column_name(anchor.column),
        anchor.row + rows,
        column_name(anchor.column + width.max(1) - 1)
    ))
}

/// Overwrites the configured spreadsheet range with the full set of records.
pub struct RemoteMirror {
    writer: Arc<dyn SheetWriter>,
    tokens: Arc<TokenManager>,
    vault: Arc<CredentialVault>,
    connectivity: Arc<dyn Connectivity>,
    range: String,
}

impl RemoteMirror {
    pub fn new(
        writer: Arc<dyn SheetWriter>,
        tokens: Arc<TokenManager>,
        vault: Arc<CredentialVault>,
        connectivity: Arc<dyn Connectivity>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            writer,
            tokens,
            vault,
            connectivity,
            range: range.into(),
        }
    }

    /// Pushes `records` to the sheet, replacing what is there.
    ///
    /// The rows are written from the top of the range, then everything below them is cleared, so
    /// records removed since the last push disappear from the sheet too.
    ///
    /// When the device is offline this succeeds without doing anything; the next push carries the
    /// full state anyway. A rejected access token is refreshed and the whole write retried once.
    pub async fn push(&self, records: &[TransactionRecord]) -> Result<(), SyncError> {
        self.try_push(records).await.map(|_| ())
    }

    /// Like `push`, but tells whether anything was written: `false` means the device was offline.
    pub(crate) async fn try_push(&self, records: &[TransactionRecord]) -> Result<bool, SyncError> {
        if !self.connectivity.is_online().await {
            debug!("Offline, skipping push of {} records", records.len());
            return Ok(false);
        }

        let spreadsheet_id = match self.vault.get()? {
            Some(credential) if credential.is_configured() => credential.spreadsheet_id,
            _ => return Err(SyncError::NotConfigured),
        };

        let rows = to_rows(records);
        let below = rows_below(&self.range, rows.len(), HEADER.len());
        if below.is_none() {
            debug!("Range {} has no top-left cell, rows below it are not cleared", self.range);
        }

        let writer = &self.writer;
        let range = self.range.as_str();
        let sheet = spreadsheet_id.as_str();
        let rows = &rows;
        let below = below.as_deref();
        self.tokens
            .authorized(|token| async move {
                writer.replace_range(token.clone(), sheet, range, rows).await?;
                match below {
                    Some(below) => writer.clear_range(token, sheet, below).await,
                    None => Ok(()),
                }
            })
            .await?;

        info!("Pushed {} records to the spreadsheet", records.len());
        Ok(true)
    }
}
