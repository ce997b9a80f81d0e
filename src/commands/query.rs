//! Read commands. Each prints its view of the data as JSON.

use crate::api::Mode;
use crate::args::{BudgetsArgs, TemplatesArgs, TransactionsArgs};
use crate::commands::Out;
use crate::filters::{BudgetsView, TemplatesView};
use crate::model::Transaction;
use crate::pipeline::Pipeline;
use crate::{Config, Result};

/// Prints the transactions that pass the filters in `args`, attributed to people and, unless
/// `--no-installments` is given, with installment series expanded.
pub async fn transactions(
    config: Config,
    mode: Mode,
    args: &TransactionsArgs,
) -> Result<Out<Vec<Transaction>>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let transactions = pipeline
        .transactions(&args.query(), args.expand_installments())
        .await?;
    Ok(Out::new(
        format!("Found {} transactions", transactions.len()),
        transactions,
    ))
}

pub async fn budgets(config: Config, mode: Mode, args: &BudgetsArgs) -> Result<Out<BudgetsView>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let view = pipeline.budgets(&args.query()).await?;
    Ok(Out::new(
        format!(
            "Found {} budgets totaling {}",
            view.budgets.len(),
            view.total_budgeted
        ),
        view,
    ))
}

pub async fn templates(
    config: Config,
    mode: Mode,
    args: &TemplatesArgs,
) -> Result<Out<TemplatesView>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let view = pipeline.templates(&args.query()).await?;
    let over: Vec<&str> = view
        .valid_by_person
        .iter()
        .filter(|(_, valid)| !**valid)
        .map(|(name, _)| name.as_str())
        .collect();
    let message = if over.is_empty() {
        format!("Found {} budget templates", view.templates.len())
    } else {
        format!(
            "Found {} budget templates. Active percentages exceed 100% for: {}",
            view.templates.len(),
            over.join(", ")
        )
    };
    Ok(Out::new(message, view))
}
