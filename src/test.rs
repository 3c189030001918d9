//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::Mode;
use crate::model::{Amount, Kind, NewRecord, TransactionRecord};
use crate::{App, Config};
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

/// Test environment that sets up a fintrack home directory with a Config.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a home directory whose spreadsheet id is unique, so that tests sharing the
    /// in-process test sheets do not see each other's writes.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("fintrack");
        let secret_path = temp_dir.path().join("client_secret.json");

        let secret_content = r#"{
            "installed": {
                "client_id": "test-client-id",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"],
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;
        std::fs::write(&secret_path, secret_content).unwrap();

        let rand = Uuid::new_v4().to_string().replace('-', "");
        let sheet_url = format!("https://docs.google.com/spreadsheets/d/{rand}/edit");
        let config = Config::create(&root, &secret_path, &sheet_url)
            .await
            .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// An app in `Mode::Test` on this environment's data directory.
    pub fn app(&self) -> App {
        App::open(&self.config, Mode::Test, false).unwrap()
    }

    pub fn offline_app(&self) -> App {
        App::open(&self.config, Mode::Test, true).unwrap()
    }

    /// Adds `count` expenses and returns the resulting sequence.
    pub async fn seed(&self, app: &App, count: usize) -> Vec<TransactionRecord> {
        let mut records = Vec::new();
        for i in 1..=count {
            let new = NewRecord::now(
                format!("Expense {i}"),
                Amount::new(Decimal::new(i as i64 * 100 + 50, 2)),
                "Cash",
                Kind::Expense,
            );
            records = app.add(new).await.unwrap();
        }
        records
    }
}
