use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory, its subdirectories and:
/// - Creates an initial `config.json` file using `sheet_url` along with default settings
/// - Copies `secret_file` into its default location in the home directory.
///
/// # Arguments
/// - `home` - The directory that will be the root of the home directory, e.g. `$HOME/fintrack`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
///   OAuth workflow.
/// - `sheet_url` - The URL of the Google Sheet that will mirror the transactions.
///
/// # Errors
/// - Returns an error if the URL is not a Google Sheets URL or any file operation fails.
pub async fn init(home: &Path, secret_file: &Path, sheet_url: &str) -> Result<Out<()>> {
    if home.join("config.json").is_file() {
        anyhow::bail!(
            "fintrack is already initialized in '{}'. Edit its config.json instead.",
            home.display()
        );
    }
    let config = Config::create(home, secret_file, sheet_url)
        .await
        .context("Unable to create the home directory and configs")?;
    Ok(format!(
        "Initialized fintrack in '{}'. Run 'fintrack auth' to connect your Google account.",
        config.root().display()
    )
    .into())
}
