//! Handlers for the commands that read and change transactions.

use crate::args::{AddArgs, DeleteArgs, UpdateArgs};
use crate::commands::Out;
use crate::model::{NewRecord, RecordPatch, TransactionRecord};
use crate::{App, Result};
use anyhow::bail;
use tracing::warn;

/// Handles `fintrack add`.
pub async fn add(app: &App, args: AddArgs) -> Result<Out<TransactionRecord>> {
    let methods = app.payment_methods().list()?;
    if !methods
        .iter()
        .any(|m| m.eq_ignore_ascii_case(&args.payment_method))
    {
        warn!(
            "'{}' is not one of your payment methods ({}), saving it anyway",
            args.payment_method,
            methods.join(", ")
        );
    }

    let mut new = NewRecord::now(args.description, args.amount, args.payment_method, args.kind)
        .with_necessity(args.necessity);
    if let Some(date) = args.date {
        new = new.with_timestamp(date);
    }

    let records = app.add(new).await?;
    app.settle().await;
    // The store puts new records first.
    let Some(record) = records.into_iter().next() else {
        bail!("The transaction was not saved");
    };
    Ok(Out::new(format!("Added {}", line(&record)), record))
}

/// Handles `fintrack update`.
pub async fn update(app: &App, args: UpdateArgs) -> Result<Out<TransactionRecord>> {
    let patch = RecordPatch {
        timestamp: args.date,
        description: args.description,
        amount: args.amount,
        payment_method: args.payment_method,
        kind: args.kind,
        necessity: if args.clear_necessity {
            Some(None)
        } else {
            args.necessity.map(Some)
        },
    };
    if patch.is_empty() {
        bail!("Nothing to update, pass at least one field to change");
    }
    if !app.list()?.iter().any(|r| r.id() == args.id) {
        bail!("There is no transaction with id '{}'", args.id);
    }

    let records = app.update(&args.id, &patch).await?;
    app.settle().await;
    let Some(record) = records.into_iter().find(|r| r.id() == args.id) else {
        bail!("The transaction '{}' disappeared while updating it", args.id);
    };
    Ok(Out::new(format!("Updated {}", line(&record)), record))
}

/// Handles `fintrack delete`.
pub async fn delete(app: &App, args: DeleteArgs) -> Result<Out<()>> {
    if !app.list()?.iter().any(|r| r.id() == args.id) {
        bail!("There is no transaction with id '{}'", args.id);
    }
    let remaining = app.remove(&args.id).await?;
    app.settle().await;
    Ok(format!(
        "Deleted transaction '{}', {} remaining",
        args.id,
        remaining.len()
    )
    .into())
}

/// Handles `fintrack list`.
pub async fn list(app: &App) -> Result<Out<Vec<TransactionRecord>>> {
    let records = app.list()?;
    let message = if records.is_empty() {
        "No transactions yet".to_string()
    } else {
        records.iter().map(line).collect::<Vec<_>>().join("\n")
    };
    Ok(Out::new(message, records))
}

fn line(record: &TransactionRecord) -> String {
    let necessity = record
        .necessity()
        .map(|n| format!(" ({n})"))
        .unwrap_or_default();
    format!(
        "{}  {:<7}  {:>10}  {:<14}  {}{}  [{}]",
        record.timestamp().format("%d/%m/%Y"),
        record.kind(),
        record.amount(),
        record.payment_method(),
        record.description(),
        necessity,
        record.id()
    )
}
