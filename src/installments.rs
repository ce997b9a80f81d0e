//! Expands installment series. A purchase paid in installments shows up in the sheet as rows such
//! as `Netflix 01/12`; the expander replaces each series with its complete monthly schedule,
//! rebuilt from the first installment (the anchor).
//!
//! The expander must run once over raw rows. Its output still matches the installment pattern, so
//! running it again would expand the series a second time.

use crate::model::Transaction;
use crate::Result;
use anyhow::{bail, Context};
use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The `current/total` token, two digits each. Only the first occurrence counts.
const INSTALLMENT_PATTERN: &str = r"(\d{2})/(\d{2})";

/// What the description of one installment row says about its series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentInfo {
    /// The text before the token, trimmed.
    pub base_description: String,
    pub current_index: u32,
    pub total_count: u32,
}

#[derive(Debug, Clone)]
pub struct Expander {
    pattern: Regex,
}

impl Expander {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(INSTALLMENT_PATTERN).context("Invalid installment pattern")?;
        Ok(Self { pattern })
    }

    /// Parses the first `DD/DD` token of `description`.
    pub fn parse(&self, description: &str) -> Option<InstallmentInfo> {
        let captures = self.pattern.captures(description)?;
        let token = captures.get(0)?;
        let current_index = captures.get(1)?.as_str().parse().ok()?;
        let total_count = captures.get(2)?.as_str().parse().ok()?;
        Some(InstallmentInfo {
            base_description: description[..token.start()].trim().to_string(),
            current_index,
            total_count,
        })
    }

    /// Replaces every installment series in `transactions` with its full schedule.
    ///
    /// Rows that are not installments, and installment rows without a `DD/DD` token, come first
    /// in their original order. Series follow in the order they were first seen. A series without
    /// an anchor, or whose anchor cannot be expanded, is emitted as it was.
    pub fn expand(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let mut output = Vec::with_capacity(transactions.len());
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<(Transaction, InstallmentInfo)>> = HashMap::new();

        for transaction in transactions {
            if !is_installment(&transaction) {
                output.push(transaction);
                continue;
            }
            let Some(info) = self.parse(&transaction.description) else {
                output.push(transaction);
                continue;
            };
            let key = group_key(&transaction, &info);
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push((transaction, info));
        }
        debug!(groups = order.len(), "Grouped installment rows");

        for key in order {
            let Some(group) = groups.remove(&key) else {
                continue;
            };
            match expand_group(&group) {
                Ok(Some(schedule)) => output.extend(schedule),
                Ok(None) => {
                    debug!(group = %key, rows = group.len(), "No first installment, keeping rows");
                    output.extend(group.into_iter().map(|(t, _)| t));
                }
                Err(e) => {
                    warn!(group = %key, "Unable to expand installments, keeping rows: {e:#}");
                    output.extend(group.into_iter().map(|(t, _)| t));
                }
            }
        }
        output
    }
}

/// A row is an installment when its destination names the installments/financing category.
pub fn is_installment(transaction: &Transaction) -> bool {
    let destination = transaction.destination.to_lowercase();
    destination.contains("installments/financing")
        || (destination.contains("installments") && destination.contains("financing"))
}

/// Series identity: lower-cased base description plus origin. The amount is not part of it.
fn group_key(transaction: &Transaction, info: &InstallmentInfo) -> String {
    format!(
        "{}_{}",
        info.base_description.to_lowercase(),
        transaction.origin
    )
}

/// `Ok(None)` when the group has no anchor.
fn expand_group(group: &[(Transaction, InstallmentInfo)]) -> Result<Option<Vec<Transaction>>> {
    let Some((anchor, info)) = group.iter().find(|(_, info)| info.current_index == 1) else {
        return Ok(None);
    };
    schedule(anchor, info).map(Some)
}

/// Builds the `total_count` rows of a series from its anchor. Row 1 keeps the anchor's date; row
/// `i` is dated the first of the month `i - 1` months after the anchor's month.
fn schedule(anchor: &Transaction, info: &InstallmentInfo) -> Result<Vec<Transaction>> {
    let total = info.total_count;
    if total < 1 {
        bail!("'{}' has a total of {total} installments", anchor.description);
    }
    let anchor_date = anchor
        .parsed_date()
        .with_context(|| format!("Unable to parse the date '{}' of '{}'", anchor.date, anchor.transaction_id))?;
    let first_of_month = NaiveDate::from_ymd_opt(anchor_date.year(), anchor_date.month(), 1)
        .context("Unable to find the first of the anchor's month")?;

    let mut rows = Vec::with_capacity(total as usize);
    for index in 1..=total {
        let date = if index == 1 {
            anchor.date.clone()
        } else {
            first_of_month
                .checked_add_months(Months::new(index - 1))
                .with_context(|| format!("Installment {index} of '{}' is out of range", anchor.description))?
                .format("%Y-%m-%d")
                .to_string()
        };
        rows.push(Transaction {
            transaction_id: format!("{}_{index}_{total}", anchor.transaction_id),
            date,
            description: format!("{} {index:02}/{total:02}", info.base_description),
            ..anchor.clone()
        });
    }
    Ok(rows)
}
