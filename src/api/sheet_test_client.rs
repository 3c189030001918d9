//! In-process stand-ins for Google, used by `Mode::Test` and by the unit tests.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without talking to Google.

use crate::api::mirror::Anchor;
use crate::api::{IdentityProvider, Rejection, SheetWriter, TokenGrant};
use crate::error::AuthError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::debug;

/// One write received by a `TestSheet`, successful or not.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    pub access_token: String,
    pub range: String,
    pub rows: Vec<Vec<String>>,
}

/// What a test spreadsheet currently holds, and what it has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct TestSheetState {
    /// The cells as they stand after every successful write and clear, from `A1`. Trailing rows
    /// with no content are dropped.
    pub values: Vec<Vec<String>>,
    /// Every write attempt, in order.
    pub requests: Vec<RecordedWrite>,
    /// The range of every clear, in order.
    pub clears: Vec<String>,
    /// Outcomes to return, one per write, before falling back to success. Clears always succeed.
    pub script: VecDeque<Rejection>,
}

impl TestSheetState {
    fn write(&mut self, anchor: Anchor, rows: &[Vec<String>]) {
        let top = anchor.row - 1;
        if self.values.len() < top + rows.len() {
            self.values.resize(top + rows.len(), Vec::new());
        }
        for (target, row) in self.values[top..].iter_mut().zip(rows) {
            let end = anchor.column + row.len();
            if target.len() < end {
                target.resize(end, String::new());
            }
            target[anchor.column..end].clone_from_slice(row);
        }
        self.trim();
    }

    fn clear(&mut self, anchor: Anchor) {
        for row in self.values.iter_mut().skip(anchor.row - 1) {
            let end = anchor
                .last_column
                .map_or(row.len(), |last| row.len().min(last + 1));
            for cell in row.iter_mut().take(end).skip(anchor.column) {
                cell.clear();
            }
        }
        self.trim();
    }

    fn trim(&mut self) {
        while self
            .values
            .last()
            .is_some_and(|row| row.iter().all(|cell| cell.is_empty()))
        {
            self.values.pop();
        }
    }
}

/// A `SheetWriter` that keeps spreadsheets in memory. Spreadsheets are keyed by id in a
/// process-wide registry so that tests can inspect what a `RemoteMirror` wrote.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestSheet;

fn registry() -> MutexGuard<'static, HashMap<String, TestSheetState>> {
    static SHEETS: OnceLock<Mutex<HashMap<String, TestSheetState>>> = OnceLock::new();
    SHEETS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TestSheet {
    pub fn new() -> Self {
        Self
    }

    /// A copy of the current state of `spreadsheet_id`.
    pub fn state(spreadsheet_id: &str) -> TestSheetState {
        registry().get(spreadsheet_id).cloned().unwrap_or_default()
    }

    /// Makes the next calls against `spreadsheet_id` fail with `outcomes`, in order.
    pub fn script(spreadsheet_id: &str, outcomes: impl IntoIterator<Item = Rejection>) {
        registry()
            .entry(spreadsheet_id.to_string())
            .or_default()
            .script
            .extend(outcomes);
    }

    pub fn reset(spreadsheet_id: &str) {
        registry().remove(spreadsheet_id);
    }
}

#[async_trait::async_trait]
impl SheetWriter for TestSheet {
    async fn replace_range(
        &self,
        access_token: String,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), Rejection> {
        let mut sheets = registry();
        let sheet = sheets.entry(spreadsheet_id.to_string()).or_default();
        sheet.requests.push(RecordedWrite {
            access_token,
            range: range.to_string(),
            rows: rows.to_vec(),
        });
        if let Some(rejection) = sheet.script.pop_front() {
            debug!("Test sheet {spreadsheet_id} rejecting write: {rejection}");
            return Err(rejection);
        }
        let Some((_, anchor)) = Anchor::parse(range) else {
            return Err(Rejection::Failed(format!("Unable to parse range: {range}")));
        };
        debug!("Test sheet {spreadsheet_id} received {} rows", rows.len());
        sheet.write(anchor, rows);
        Ok(())
    }

    async fn clear_range(
        &self,
        _access_token: String,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<(), Rejection> {
        let mut sheets = registry();
        let sheet = sheets.entry(spreadsheet_id.to_string()).or_default();
        sheet.clears.push(range.to_string());
        let Some((_, anchor)) = Anchor::parse(range) else {
            return Err(Rejection::Failed(format!("Unable to parse range: {range}")));
        };
        debug!("Test sheet {spreadsheet_id} clearing {range}");
        sheet.clear(anchor);
        Ok(())
    }
}

/// An `IdentityProvider` that issues numbered tokens without any user interaction.
#[derive(Debug, Default)]
pub struct TestIdentity {
    issued: AtomicUsize,
    consents: AtomicUsize,
    refreshes: AtomicUsize,
    denial: Option<String>,
    refresh_fails: bool,
    rotates: bool,
}

impl TestIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consent will be declined with `detail`.
    pub fn deny_consent(mut self, detail: impl Into<String>) -> Self {
        self.denial = Some(detail.into());
        self
    }

    /// Every silent refresh will fail.
    pub fn fail_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    /// Silent refreshes will also hand out a new refresh token.
    pub fn rotate_refresh_token(mut self) -> Self {
        self.rotates = true;
        self
    }

    pub fn consents(&self) -> usize {
        self.consents.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn next(&self) -> usize {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait::async_trait]
impl IdentityProvider for TestIdentity {
    async fn consent(&self) -> Result<TokenGrant, AuthError> {
        self.consents.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.denial {
            return Err(AuthError::denied(detail.clone()));
        }
        let n = self.next();
        Ok(TokenGrant {
            access_token: format!("test-access-{n}"),
            refresh_token: Some(format!("test-refresh-{n}")),
        })
    }

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if refresh_token.is_none() {
            return Err(AuthError::refresh_failed("no refresh token is stored"));
        }
        if self.refresh_fails {
            return Err(AuthError::refresh_failed("invalid_grant: Token has been revoked"));
        }
        let n = self.next();
        Ok(TokenGrant {
            access_token: format!("test-access-{n}"),
            refresh_token: self.rotates.then(|| format!("test-refresh-{n}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_rejections_come_first() {
        let id = uuid::Uuid::new_v4().to_string();
        TestSheet::script(&id, [Rejection::Unauthorized("expired".into())]);
        let sheet = TestSheet::new();
        let rows = vec![vec!["a".to_string()]];

        let first = sheet.replace_range("t1".into(), &id, "A1", &rows).await;
        assert_eq!(first, Err(Rejection::Unauthorized("expired".into())));
        assert!(TestSheet::state(&id).values.is_empty());

        sheet.replace_range("t2".into(), &id, "A1", &rows).await.unwrap();
        let state = TestSheet::state(&id);
        assert_eq!(state.values, rows);
        assert_eq!(state.requests.len(), 2);
        assert_eq!(state.requests[1].access_token, "t2");

        TestSheet::reset(&id);
        assert!(TestSheet::state(&id).requests.is_empty());
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn writes_overlay_and_clears_blank_their_range() {
        let id = uuid::Uuid::new_v4().to_string();
        let sheet = TestSheet::new();
        let three = vec![row(&["h", "h", "note"]), row(&["1", "1"]), row(&["2", "2"])];
        sheet.replace_range("t".into(), &id, "S!A1", &three).await.unwrap();

        sheet
            .replace_range("t".into(), &id, "S!A1", &[row(&["H", "H"])])
            .await
            .unwrap();
        assert_eq!(
            TestSheet::state(&id).values,
            vec![row(&["H", "H", "note"]), row(&["1", "1"]), row(&["2", "2"])]
        );

        sheet.clear_range("t".into(), &id, "S!A2:B").await.unwrap();
        let state = TestSheet::state(&id);
        assert_eq!(state.values, vec![row(&["H", "H", "note"])]);
        assert_eq!(state.clears, vec!["S!A2:B".to_string()]);
    }

    #[tokio::test]
    async fn identity_numbers_tokens() {
        let identity = TestIdentity::new();
        let grant = identity.consent().await.unwrap();
        assert_eq!(grant.access_token, "test-access-1");
        let refreshed = identity.refresh(Some("test-refresh-1")).await.unwrap();
        assert_eq!(refreshed.access_token, "test-access-2");
        assert_eq!(refreshed.refresh_token, None);
        assert_eq!(identity.consents(), 1);
        assert_eq!(identity.refreshes(), 1);
    }

    #[tokio::test]
    async fn refresh_needs_a_refresh_token() {
        let identity = TestIdentity::new();
        assert!(matches!(
            identity.refresh(None).await,
            Err(AuthError::RefreshFailed(_))
        ));
    }
}
