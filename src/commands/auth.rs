//! Authentication command handlers.
//!
//! - `fintrack auth` - OAuth consent flow, stores the credential and turns auto-sync on
//! - `fintrack disconnect` - forgets the credential

use crate::commands::Out;
use crate::{App, Result};
use anyhow::Context;

/// Handles the `fintrack auth` command.
///
/// This is the only command that opens the consent screen. It prints the authorization URL, waits
/// for Google to redirect back to a local callback server, then exchanges the code for tokens.
///
/// # Errors
/// Returns an error when offline, when the client secret is missing or invalid, or when consent
/// is declined.
pub async fn auth(app: &App) -> Result<Out<()>> {
    let credential = app.connect().await.context(
        "Unable to connect your Google account. Check the client secret in the .secrets \
        directory and try again",
    )?;
    Ok(format!(
        "Connected! Changes will be mirrored to spreadsheet {} automatically.",
        credential.spreadsheet_id
    )
    .into())
}

/// Handles the `fintrack disconnect` command.
pub async fn disconnect(app: &App) -> Result<Out<()>> {
    app.disconnect()?;
    Ok("Disconnected from Google. Your transactions remain on this device.".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn auth_then_disconnect() {
        let env = TestEnv::new().await;
        let app = env.app();

        auth(&app).await.unwrap();
        let status = app.status().unwrap();
        assert!(status.connected);
        assert!(status.auto_sync);
        assert_eq!(
            status.spreadsheet_id.as_deref(),
            Some(env.config().spreadsheet_id())
        );

        disconnect(&app).await.unwrap();
        assert!(!app.status().unwrap().connected);
    }

    #[tokio::test]
    async fn auth_offline_fails() {
        let env = TestEnv::new().await;
        let app = env.offline_app();
        let err = auth(&app).await.unwrap_err();
        assert!(format!("{err:#}").contains("offline"));
    }
}
