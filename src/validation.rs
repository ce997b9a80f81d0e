//! Write requests for budgets and budget templates, and the checks they must pass before anything
//! is written. Every violation is collected; a request with any violation writes nothing.

use crate::error::ValidationErrors;
use crate::model::{Amount, BudgetTemplate};
use crate::person::{self, Person};
use crate::Result;
use anyhow::Context;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// One budget to create or update. Missing fields are reported by validation, not by parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetInput {
    pub category: String,
    pub person: String,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub amount: Option<Amount>,
}

/// One budget template to create or update. `active` defaults to true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateInput {
    pub category: String,
    pub person: String,
    pub percentage: Option<Amount>,
    pub active: Option<bool>,
}

impl TemplateInput {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

/// Parses a request body that holds either one object or an array of them.
pub fn parse_request<T: DeserializeOwned>(json: &str) -> Result<Vec<T>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }
    let parsed: OneOrMany<T> =
        serde_json::from_str(json).context("The request must be a JSON object or array of objects")?;
    Ok(match parsed {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

/// Checks every budget in the request. On success the person names are replaced with the
/// configured spelling.
pub fn validate_budgets(
    inputs: Vec<BudgetInput>,
    people: &[Person],
) -> std::result::Result<Vec<BudgetInput>, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut accepted = Vec::with_capacity(inputs.len());
    for (ix, mut input) in inputs.into_iter().enumerate() {
        check_category(&mut errors, ix, &input.category);
        if let Some(name) = check_person(&mut errors, ix, &input.person, people) {
            input.person = name;
        }
        match input.month {
            Some(month) if (1..=12).contains(&month) => {}
            _ => errors.push(ix, "month", "is required and must be between 1 and 12"),
        }
        match input.year {
            Some(year) if (MIN_YEAR..=MAX_YEAR).contains(&year) => {}
            _ => errors.push(
                ix,
                "year",
                format!("is required and must be between {MIN_YEAR} and {MAX_YEAR}"),
            ),
        }
        match input.amount {
            Some(amount) if !amount.is_negative() => {}
            _ => errors.push(ix, "amount", "is required and must not be negative"),
        }
        input.category = input.category.trim().to_string();
        accepted.push(input);
    }
    errors.into_result().map(|()| accepted)
}

/// Checks every template in the request, then checks that each person's active percentages,
/// counting `existing` templates that the request does not replace, stay within 100.
pub fn validate_templates(
    inputs: Vec<TemplateInput>,
    existing: &[BudgetTemplate],
    people: &[Person],
) -> std::result::Result<Vec<TemplateInput>, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut accepted = Vec::with_capacity(inputs.len());
    let mut seen = HashSet::new();
    for (ix, mut input) in inputs.into_iter().enumerate() {
        check_category(&mut errors, ix, &input.category);
        if let Some(name) = check_person(&mut errors, ix, &input.person, people) {
            input.person = name;
        }
        match input.percentage {
            Some(pct) if !pct.is_negative() && pct.value() <= Decimal::ONE_HUNDRED => {}
            _ => errors.push(ix, "percentage", "is required and must be between 0 and 100"),
        }
        input.category = input.category.trim().to_string();
        let id = BudgetTemplate::make_id(&input.category, &input.person);
        if !seen.insert(id) {
            errors.push(
                ix,
                "category",
                format!(
                    "'{}' for '{}' appears more than once in the request",
                    input.category, input.person
                ),
            );
        }
        accepted.push(input);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    for (person, total) in totals_after_save(&accepted, existing) {
        if total.value() > Decimal::ONE_HUNDRED {
            errors.push(
                0,
                "percentage",
                format!("The active percentages of '{person}' would add up to {total}%, more than 100%"),
            );
        }
    }
    errors.into_result().map(|()| accepted)
}

/// The active percentage total of each person after `incoming` replaces the templates with the
/// same category and person.
fn totals_after_save(incoming: &[TemplateInput], existing: &[BudgetTemplate]) -> BTreeMap<String, Amount> {
    let replaced: HashSet<String> = incoming
        .iter()
        .map(|t| BudgetTemplate::make_id(&t.category, &t.person))
        .collect();
    let mut totals: BTreeMap<String, Amount> = BTreeMap::new();
    for template in existing
        .iter()
        .filter(|t| t.active && !replaced.contains(&BudgetTemplate::make_id(&t.category, &t.person)))
    {
        let total = totals.entry(template.person.clone()).or_default();
        *total = *total + template.percentage;
    }
    for input in incoming.iter().filter(|t| t.is_active()) {
        let total = totals.entry(input.person.clone()).or_default();
        *total = *total + input.percentage.unwrap_or_default();
    }
    totals
}

fn check_category(errors: &mut ValidationErrors, ix: usize, category: &str) {
    if category.trim().is_empty() {
        errors.push(ix, "category", "is required");
    }
}

/// Returns the configured spelling of `name`.
fn check_person(
    errors: &mut ValidationErrors,
    ix: usize,
    name: &str,
    people: &[Person],
) -> Option<String> {
    if name.trim().is_empty() {
        errors.push(ix, "person", "is required");
        return None;
    }
    match person::find(people, name) {
        Some(person) => Some(person.name.clone()),
        None => {
            let names: Vec<&str> = people.iter().map(|p| p.name.as_str()).collect();
            errors.push(
                ix,
                "person",
                format!("'{name}' is not one of the configured people: {}", names.join(", ")),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn people() -> Vec<Person> {
        vec![
            Person {
                name: "Alex".to_string(),
                patterns: vec!["alex".to_string()],
            },
            Person {
                name: "Sam".to_string(),
                patterns: vec!["sam".to_string()],
            },
        ]
    }

    fn amount(s: &str) -> Option<Amount> {
        Some(Amount::from_str(s).unwrap())
    }

    fn template(category: &str, person: &str, pct: &str, active: bool) -> BudgetTemplate {
        BudgetTemplate {
            id: BudgetTemplate::make_id(category, person),
            category: category.to_string(),
            person: person.to_string(),
            percentage: Amount::from_str(pct).unwrap(),
            active,
            ..BudgetTemplate::default()
        }
    }

    fn fields(errors: &ValidationErrors) -> Vec<(usize, &str)> {
        errors
            .violations()
            .iter()
            .map(|v| (v.index, v.field.as_str()))
            .collect()
    }

    #[test]
    fn test_parse_request() {
        let one: Vec<BudgetInput> =
            parse_request(r#"{"category":"Food","person":"Alex","month":1,"year":2025,"amount":10}"#).unwrap();
        assert_eq!(one.len(), 1);
        let many: Vec<TemplateInput> =
            parse_request(r#"[{"category":"Food","person":"Alex","percentage":10},{"category":"Rent"}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert!(many[0].is_active());
        assert!(parse_request::<BudgetInput>("42").is_err());
    }

    #[test]
    fn test_valid_budget() {
        let input = BudgetInput {
            category: " Groceries ".to_string(),
            person: "alex".to_string(),
            month: Some(12),
            year: Some(2025),
            amount: amount("0"),
        };
        let accepted = validate_budgets(vec![input], &people()).unwrap();
        assert_eq!(accepted[0].person, "Alex");
        assert_eq!(accepted[0].category, "Groceries");
    }

    #[test]
    fn test_budget_violations_are_collected() {
        let inputs = vec![
            BudgetInput {
                category: "Food".to_string(),
                person: "Alex".to_string(),
                month: Some(1),
                year: Some(2025),
                amount: amount("10"),
            },
            BudgetInput {
                category: "".to_string(),
                person: "Jordan".to_string(),
                month: Some(13),
                year: Some(1999),
                amount: amount("-1"),
            },
            BudgetInput::default(),
        ];
        let errors = validate_budgets(inputs, &people()).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec![
                (1, "category"),
                (1, "person"),
                (1, "month"),
                (1, "year"),
                (1, "amount"),
                (2, "category"),
                (2, "person"),
                (2, "month"),
                (2, "year"),
                (2, "amount"),
            ]
        );
    }

    #[test]
    fn test_template_percentage_range() {
        let input = |pct: &str| TemplateInput {
            category: "Savings".to_string(),
            person: "Sam".to_string(),
            percentage: amount(pct),
            active: None,
        };
        assert!(validate_templates(vec![input("100")], &[], &people()).is_ok());
        assert!(validate_templates(vec![input("0")], &[], &people()).is_ok());
        assert!(validate_templates(vec![input("100.01")], &[], &people()).is_err());
        assert!(validate_templates(vec![input("-5")], &[], &people()).is_err());
    }

    #[test]
    fn test_template_duplicates() {
        let input = TemplateInput {
            category: "Savings".to_string(),
            person: "Sam".to_string(),
            percentage: amount("10"),
            active: Some(true),
        };
        let mut second = input.clone();
        second.category = "savings".to_string();
        let errors = validate_templates(vec![input, second], &[], &people()).unwrap_err();
        assert_eq!(fields(&errors), vec![(1, "category")]);
    }

    #[test]
    fn test_template_sum_counts_existing_not_replaced() {
        let existing = vec![
            template("Rent", "Alex", "50", true),
            template("Savings", "Alex", "30", true),
            template("Fun", "Alex", "40", false),
        ];
        // Replaces Savings 30 with 50: 50 + 50 = 100 is allowed.
        let ok = TemplateInput {
            category: "Savings".to_string(),
            person: "Alex".to_string(),
            percentage: amount("50"),
            active: None,
        };
        assert!(validate_templates(vec![ok], &existing, &people()).is_ok());

        // Activating Fun pushes Alex to 120.
        let over = TemplateInput {
            category: "Fun".to_string(),
            person: "Alex".to_string(),
            percentage: amount("40"),
            active: Some(true),
        };
        let errors = validate_templates(vec![over], &existing, &people()).unwrap_err();
        assert!(errors.violations()[0].message.contains("120%"));

        // Inactive templates do not count.
        let inactive = TemplateInput {
            category: "Travel".to_string(),
            person: "Alex".to_string(),
            percentage: amount("90"),
            active: Some(false),
        };
        assert!(validate_templates(vec![inactive], &existing, &people()).is_ok());
    }
}
