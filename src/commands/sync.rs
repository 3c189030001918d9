use crate::app::Status;
use crate::commands::Out;
use crate::{App, Result};
use chrono::Local;

/// Handles the `fintrack sync` command: pushes everything now and reports failures.
pub async fn sync(app: &App) -> Result<Out<Status>> {
    let pushed = app.sync_now().await?;
    let status = app.status()?;
    let message = if pushed {
        format!("Synced {} transactions", status.records)
    } else {
        "You are offline, nothing was synced".to_string()
    };
    Ok(Out::new(message, status))
}

pub async fn status(app: &App) -> Result<Out<Status>> {
    let status = app.status()?;
    Ok(Out::new(describe(&status), status))
}

/// Handles the `fintrack auto-sync on|off` command.
pub async fn auto_sync(app: &App, enabled: bool) -> Result<Out<()>> {
    if !app.set_auto_sync(enabled)? {
        anyhow::bail!("Not connected, run 'fintrack auth' first");
    }
    Ok(format!("Auto-sync is {}", on_off(enabled)).into())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn describe(status: &Status) -> String {
    let mut lines = vec![format!("Transactions: {}", status.records)];
    match &status.spreadsheet_id {
        Some(id) => {
            lines.push(format!("Connected to spreadsheet {id}"));
            lines.push(format!("Auto-sync: {}", on_off(status.auto_sync)));
            lines.push(match status.last_sync {
                Some(at) => format!(
                    "Last sync: {}",
                    at.with_timezone(&Local).format("%d/%m/%Y %H:%M")
                ),
                None => "Last sync: never".to_string(),
            });
        }
        None => lines.push("Not connected, run 'fintrack auth' to connect".to_string()),
    }
    if let Some(error) = &status.last_error {
        lines.push(format!("Last sync error: {error}"));
    }
    lines.join("\n")
}
