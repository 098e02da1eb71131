//! Expense command handlers.

use crate::api::Mode;
use crate::args::{AddExpenseArgs, ListExpensesArgs, UpdateExpenseArgs};
use crate::commands::{connect, offline_note, Out};
use crate::model::{Expense, Record};
use crate::{Config, Result};
use std::fmt::Write;

/// Lists expenses matching the filter in `args`. While offline the cached expenses, including
/// pending ones, are filtered locally.
pub async fn list_expenses(
    config: Config,
    mode: Mode,
    args: ListExpensesArgs,
) -> Result<Out<Vec<Expense>>> {
    let client = connect(&config, mode).await?;
    let expenses = client.list_expenses(&args.filter()).await?;

    let mut message = format!("{} expenses{}", expenses.len(), offline_note(&client));
    for e in &expenses {
        let _ = write!(
            message,
            "\n  {}  {}  {}  {}  [{}]",
            e.id(),
            e.date()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            e.amount(),
            e.reason(),
            e.status()
        );
    }
    Ok(Out::new(message, expenses))
}

/// Adds an expense. Offline, it is stored as pending and its placeholder identifier is returned.
pub async fn add_expense(config: Config, mode: Mode, args: AddExpenseArgs) -> Result<Out<Expense>> {
    let client = connect(&config, mode).await?;
    let expense = client.create_expense(&args.new_expense()).await?;
    let message = if expense.status().is_pending() {
        format!(
            "Saved expense {} locally, it will be sent to the server when it is reachable",
            expense.id()
        )
    } else {
        format!("Added expense {}", expense.id())
    };
    Ok(Out::new(message, expense))
}

/// Changes an expense on the server.
pub async fn update_expense(
    config: Config,
    mode: Mode,
    args: UpdateExpenseArgs,
) -> Result<Out<Expense>> {
    let client = connect(&config, mode).await?;
    let expense = client.update_expense(args.id(), &args.update()).await?;
    Ok(Out::new(format!("Updated expense {}", expense.id()), expense))
}

/// Deletes an expense on the server.
pub async fn delete_expense(config: Config, mode: Mode, id: &str) -> Result<Out<String>> {
    let client = connect(&config, mode).await?;
    client.delete_expense(id).await?;
    Ok(Out::new(format!("Deleted expense {id}"), id.to_string()))
}
