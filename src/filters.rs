//! Query parameters for the read commands and the filtering and summaries applied to loaded
//! records. Filtering always runs after person attribution and installment expansion.

use crate::error::ValidationErrors;
use crate::model::{Amount, Budget, BudgetTemplate, Transaction};
use crate::person::{self, Person};
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// The value of `person` that selects everyone.
pub const ALL_PEOPLE: &str = "all";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Filters for the transactions view. Every filter is optional and they combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// A configured person or `all`.
    pub person: Option<String>,
    /// Inclusive, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Inclusive, `YYYY-MM-DD`.
    pub end_date: Option<String>,
    /// Case-insensitive substring of the description.
    pub search: Option<String>,
    /// Case-insensitive substring of the origin account.
    pub origin: Option<String>,
    /// Case-insensitive substring of the destination category.
    pub destination: Option<String>,
}

impl TransactionQuery {
    /// Checks the parameters before anything is loaded.
    pub fn validate(&self, people: &[Person]) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = non_empty(&self.person) {
            if !name.eq_ignore_ascii_case(ALL_PEOPLE) && person::find(people, name).is_none() {
                errors.push(0, "person", format!("'{name}' is not a configured person"));
            }
        }
        let start = check_date(&mut errors, "start_date", &self.start_date);
        let end = check_date(&mut errors, "end_date", &self.end_date);
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                errors.push(0, "start_date", "must be before or equal to end_date");
            }
        }
        errors.into_result()
    }

    /// Keeps the transactions that pass every filter. A transaction whose date does not parse is
    /// not excluded by the date range.
    pub fn apply(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let start = parse_date(&self.start_date);
        let end = parse_date(&self.end_date);
        let person = non_empty(&self.person).filter(|p| !p.eq_ignore_ascii_case(ALL_PEOPLE));
        let search = lower(&self.search);
        let origin = lower(&self.origin);
        let destination = lower(&self.destination);

        transactions
            .into_iter()
            .filter(|t| match person {
                Some(name) => t
                    .person
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(name)),
                None => true,
            })
            .filter(|t| match t.parsed_date() {
                Some(date) => {
                    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
                }
                None => true,
            })
            .filter(|t| contains(&t.description, &search))
            .filter(|t| contains(&t.origin, &origin))
            .filter(|t| contains(&t.destination, &destination))
            .collect()
    }
}

/// Filters for the budgets view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetQuery {
    pub person: Option<String>,
    pub category: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl BudgetQuery {
    pub fn apply(&self, budgets: Vec<Budget>) -> Vec<Budget> {
        let category = lower(&self.category);
        let person = non_empty(&self.person);
        budgets
            .into_iter()
            .filter(|b| contains(&b.category, &category))
            .filter(|b| person.map_or(true, |p| b.person.eq_ignore_ascii_case(p)))
            .filter(|b| self.month.map_or(true, |m| b.month == m))
            .filter(|b| self.year.map_or(true, |y| b.year == y))
            .collect()
    }
}

/// Filters for the budget templates view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateQuery {
    pub person: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
}

impl TemplateQuery {
    pub fn apply(&self, templates: Vec<BudgetTemplate>) -> Vec<BudgetTemplate> {
        let category = lower(&self.category);
        let person = non_empty(&self.person);
        templates
            .into_iter()
            .filter(|t| contains(&t.category, &category))
            .filter(|t| person.map_or(true, |p| t.person.eq_ignore_ascii_case(p)))
            .filter(|t| self.active.map_or(true, |a| t.active == a))
            .collect()
    }
}

/// The budgets view: newest month first, then person, then category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetsView {
    pub budgets: Vec<Budget>,
    pub total_budgeted: Amount,
    pub total_by_person: BTreeMap<String, Amount>,
    pub categories: Vec<String>,
}

impl BudgetsView {
    pub fn new(mut budgets: Vec<Budget>, people: &[Person]) -> Self {
        budgets.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then(b.month.cmp(&a.month))
                .then_with(|| a.person.cmp(&b.person))
                .then_with(|| a.category.cmp(&b.category))
        });
        let total_budgeted = budgets.iter().fold(Amount::ZERO, |sum, b| sum + b.amount);
        let total_by_person = people
            .iter()
            .map(|p| {
                let total = budgets
                    .iter()
                    .filter(|b| b.person.eq_ignore_ascii_case(&p.name))
                    .fold(Amount::ZERO, |sum, b| sum + b.amount);
                (p.name.clone(), total)
            })
            .collect();
        let mut categories: Vec<String> = budgets.iter().map(|b| b.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Self {
            budgets,
            total_budgeted,
            total_by_person,
            categories,
        }
    }
}

/// The templates view with the active percentage total of each configured person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesView {
    pub templates: Vec<BudgetTemplate>,
    pub total_by_person: BTreeMap<String, Amount>,
    /// Whether each person's active percentages stay within 100.
    pub valid_by_person: BTreeMap<String, bool>,
}

impl TemplatesView {
    pub fn new(mut templates: Vec<BudgetTemplate>, people: &[Person]) -> Self {
        templates.sort_by(|a, b| a.person.cmp(&b.person).then_with(|| a.category.cmp(&b.category)));
        let total_by_person: BTreeMap<String, Amount> = people
            .iter()
            .map(|p| (p.name.clone(), active_total(&templates, &p.name)))
            .collect();
        let hundred = Amount::from(rust_decimal::Decimal::ONE_HUNDRED);
        let valid_by_person = total_by_person
            .iter()
            .map(|(name, total)| (name.clone(), *total <= hundred))
            .collect();
        Self {
            templates,
            total_by_person,
            valid_by_person,
        }
    }
}

/// The sum of the active percentages of `person`.
pub fn active_total(templates: &[BudgetTemplate], person: &str) -> Amount {
    templates
        .iter()
        .filter(|t| t.active && t.person.eq_ignore_ascii_case(person))
        .fold(Amount::ZERO, |sum, t| sum + t.percentage)
}

/// The first and last day of `month` in `year`.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((first, next.pred_opt()?))
}

/// A `TransactionQuery` covering one person's transactions in one month.
pub fn month_query(person: &str, year: i32, month: u32) -> Option<TransactionQuery> {
    let (first, last) = month_range(year, month)?;
    Some(TransactionQuery {
        person: Some(person.to_string()),
        start_date: Some(first.format(DATE_FORMAT).to_string()),
        end_date: Some(last.format(DATE_FORMAT).to_string()),
        ..TransactionQuery::default()
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn lower(value: &Option<String>) -> Option<String> {
    non_empty(value).map(str::to_lowercase)
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(needle.as_str()),
        None => true,
    }
}

fn parse_date(value: &Option<String>) -> Option<NaiveDate> {
    non_empty(value).and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

/// Parses an optional `YYYY-MM-DD` parameter, recording a violation when it is malformed.
fn check_date(errors: &mut ValidationErrors, field: &str, value: &Option<String>) -> Option<NaiveDate> {
    let s = non_empty(value)?;
    let well_formed = s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-';
    match NaiveDate::parse_from_str(s, DATE_FORMAT) {
        Ok(date) if well_formed => Some(date),
        _ => {
            errors.push(0, field, format!("'{s}' is not a valid YYYY-MM-DD date"));
            None
        }
    }
}
