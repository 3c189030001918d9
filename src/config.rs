//! Configuration file handling for fintrack.
//!
//! The configuration file is stored at `$FINTRACK_HOME/config.json` and contains the Google Sheet
//! URL, sync tuning and the location of the OAuth client secret.

use crate::api::DEFAULT_RANGE;
use crate::sync::DEFAULT_DEBOUNCE;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "fintrack";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const DATA: &str = "data";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const CONFIG_JSON: &str = "config.json";
const HTTP_TIMEOUT_SECS: u64 = 30;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$FINTRACK_HOME` and from there it loads `$FINTRACK_HOME/config.json`. It provides
/// paths to the other items that live in the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    data: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
}

impl Config {
    /// Creates the home directory, its subdirectories and:
    /// - Creates an initial `config.json` file using `sheet_url` along with default settings
    /// - Copies `secret_file` into its default location in the home directory
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the home directory, e.g. `$HOME/fintrack`
    /// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON
    /// - `sheet_url` - The URL of the Google Sheet that receives the transactions, e.g.
    ///   https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    ///
    /// # Errors
    /// - Returns an error if the URL is not a Google Sheets URL or any file operation fails.
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: &Path,
        sheet_url: &str,
    ) -> Result<Self> {
        let spreadsheet_id = extract_spreadsheet_id(sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the fintrack home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let data = root.join(DATA);
        utils::make_dir(&data).await?;
        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;

        let secret_destination = secrets.join(CLIENT_SECRET_JSON);
        utils::copy(secret_file, &secret_destination).await?;
        utils::restrict_permissions(&secret_destination).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile {
            sheet_url: sheet_url.to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            data,
            secrets,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load the config file
    /// - create the data directory if it went missing
    /// - return the loaded configuration object
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        if !maybe_relative.is_dir() {
            bail!(
                "The fintrack home directory is missing '{}', run 'fintrack init' first",
                maybe_relative.display()
            )
        }
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let data = root.join(DATA);
        utils::make_dir(&data).await?;

        Ok(Self {
            secrets: root.join(SECRETS),
            root,
            data,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Where the record store, credential vault and payment methods are persisted.
    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn sheet_range(&self) -> &str {
        &self.config_file.sheet_range
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config_file.debounce_millis)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.http_timeout_secs)
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves it against
    /// the home directory.
    pub fn client_secret_path(&self) -> PathBuf {
        let p = self.config_file.client_secret_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "fintrack",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "sheet_range": "Transactions!A1",
///   "debounce_millis": 800,
///   "http_timeout_secs": 30,
///   "client_secret_path": ".secrets/client_secret.json"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "fintrack"
    app_name: String,

    config_version: u8,

    /// URL of the Google Sheet that mirrors the transactions
    sheet_url: String,

    /// The A1 range whose contents are replaced on every sync
    #[serde(default = "default_range")]
    sheet_range: String,

    /// Quiet period after the last change before an automatic sync
    #[serde(default = "default_debounce_millis")]
    debounce_millis: u64,

    /// Upper bound on any single HTTP request
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,

    /// Path to the OAuth 2.0 client credentials file (optional, relative to the home directory or
    /// absolute). Defaults to $FINTRACK_HOME/.secrets/client_secret.json if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,
}

fn default_range() -> String {
    DEFAULT_RANGE.to_string()
}

fn default_debounce_millis() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            sheet_range: default_range(),
            debounce_millis: default_debounce_millis(),
            http_timeout_secs: default_http_timeout_secs(),
            client_secret_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or belongs to another app.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path)
            .await
            .context("Unable to load the config file")?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            !config.sheet_range.trim().is_empty(),
            "The sheet_range in the config file must not be empty"
        );
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID, or an error if the URL format is invalid. An empty URL yields an empty ID,
/// which leaves the app without a sheet to sync to.
fn extract_spreadsheet_id(url: &str) -> Result<&str> {
    if url.is_empty() {
        return Ok(url);
    }

    // https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/edit#gid=0
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split(['?', '#'])
                .next()
                .unwrap_or(id_part);
            if id.is_empty() {
                break;
            }
            return Ok(id);
        }
    }
    bail!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str =
        "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";

    #[tokio::test]
    async fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("fintrack_home");
        let secret_source_file = dir.path().join("downloaded.json");
        utils::write(&secret_source_file, "12345").await.unwrap();

        let config = Config::create(&home_dir, &secret_source_file, URL)
            .await
            .unwrap();

        assert_eq!(URL, config.sheet_url());
        assert_eq!(
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
            config.spreadsheet_id()
        );
        assert_eq!(
            utils::read(&config.client_secret_path()).await.unwrap(),
            "12345"
        );
        // the downloaded file stays where it was
        assert!(secret_source_file.is_file());
        assert!(config.data_dir().is_dir());
        assert!(config.secrets().is_dir());
        assert_eq!(config.sheet_range(), "Transactions!A1");
        assert_eq!(config.debounce(), Duration::from_millis(800));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_config_create_rejects_bad_url() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s.json");
        utils::write(&secret, "{}").await.unwrap();
        let result =
            Config::create(dir.path().join("home"), &secret, "https://example.com/x").await;
        assert!(result.is_err());
        assert!(!dir.path().join("home").exists());
    }

    #[tokio::test]
    async fn test_config_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s.json");
        utils::write(&secret, "{}").await.unwrap();
        let created = Config::create(dir.path().join("home"), &secret, URL)
            .await
            .unwrap();
        let loaded = Config::load(created.root()).await.unwrap();
        assert_eq!(created.root(), loaded.root());
        assert_eq!(created.spreadsheet_id(), loaded.spreadsheet_id());
        assert_eq!(created.config_file, loaded.config_file);
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert!(err.to_string().contains("fintrack init"));
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "fintrack",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/minimal"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();

        assert_eq!(config.sheet_range, "Transactions!A1");
        assert_eq!(config.debounce_millis, 800);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(
            config.client_secret_path(),
            PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON)
        );
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "pocketbook",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/test"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("client_secret_path"));
        assert!(json.contains("\"debounce_millis\":800"));
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        assert_eq!(
            extract_spreadsheet_id(URL).unwrap(),
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL"
        );
        let with_query = "https://docs.google.com/spreadsheets/d/ABC123?foo=bar";
        assert_eq!(extract_spreadsheet_id(with_query).unwrap(), "ABC123");
        assert_eq!(
            extract_spreadsheet_id("https://docs.google.com/spreadsheets/d/ABC123#gid=0").unwrap(),
            "ABC123"
        );
        assert!(extract_spreadsheet_id("https://example.com/invalid").is_err());
        assert_eq!(extract_spreadsheet_id("").unwrap(), "");
        assert!(extract_spreadsheet_id("https://docs.google.com/spreadsheets/d/").is_err());
    }
}
