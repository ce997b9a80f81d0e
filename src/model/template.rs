use crate::codec::Record;
use crate::model::columns::natural_id;
use crate::model::{Amount, Domain, SheetColumns, SheetRecord};
use serde::{Deserialize, Serialize};

/// A standing rule that allocates a percentage of a person's income to a category.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTemplate {
    pub id: String,
    pub category: String,
    pub person: String,
    pub percentage: Amount,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl BudgetTemplate {
    /// The identifier derived from the natural key `category+person`.
    pub fn make_id(category: &str, person: &str) -> String {
        natural_id(&[category, person])
    }

    /// The values written to the templates tab, in `SHEET_HEADERS` order.
    pub fn to_sheet_row(&self) -> Vec<String> {
        vec![
            self.category.clone(),
            self.person.clone(),
            self.percentage.to_string(),
            self.active.to_string(),
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }
}

const ID: &str = "ID";
const CATEGORY: &str = "Category";
const PERSON: &str = "Person";
const PERCENTAGE: &str = "Percentage";
const ACTIVE: &str = "Active";
const CREATED_AT: &str = "Created At";
const UPDATED_AT: &str = "Updated At";

fn parse_bool(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}

impl Record for BudgetTemplate {
    const DOMAIN: Domain = Domain::BudgetTemplates;
    const HEADER: &'static [&'static str] = &[
        ID, CATEGORY, PERSON, PERCENTAGE, ACTIVE, CREATED_AT, UPDATED_AT,
    ];

    fn key(&self) -> String {
        self.id.clone()
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.category.clone(),
            self.person.clone(),
            self.percentage.to_string(),
            self.active.to_string(),
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }

    fn from_row(fields: &[&str]) -> Self {
        Self {
            id: fields[0].to_string(),
            category: fields[1].to_string(),
            person: fields[2].to_string(),
            percentage: Amount::parse_or_zero(fields[3]),
            active: parse_bool(fields[4]),
            created_at: fields[5].to_string(),
            updated_at: fields[6].to_string(),
        }
    }
}

impl SheetRecord for BudgetTemplate {
    const SHEET_HEADERS: &'static [&'static str] =
        &[CATEGORY, PERSON, PERCENTAGE, ACTIVE, CREATED_AT, UPDATED_AT];

    const OPTIONAL_TAB: bool = true;

    fn from_sheet(columns: &SheetColumns, row: &[String]) -> Option<Self> {
        let category = columns.get(row, CATEGORY).to_string();
        let person = columns.get(row, PERSON).to_string();
        if category.is_empty() || person.is_empty() {
            return None;
        }
        Some(Self {
            id: Self::make_id(&category, &person),
            category,
            person,
            percentage: Amount::parse_or_zero(columns.get(row, PERCENTAGE)),
            active: parse_bool(columns.get(row, ACTIVE)),
            created_at: columns.get(row, CREATED_AT).to_string(),
            updated_at: columns.get(row, UPDATED_AT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sheet() {
        let columns = SheetColumns::resolve(
            "Budget_Templates!A1:F",
            BudgetTemplate::SHEET_HEADERS,
            BudgetTemplate::SHEET_HEADERS,
        )
        .unwrap();
        let row: Vec<String> = ["Savings", "Gabriel", "20", "TRUE", "", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let t = BudgetTemplate::from_sheet(&columns, &row).unwrap();
        assert_eq!(t.id, "savings-gabriel");
        assert!(t.active);
        assert_eq!(t.percentage.to_string(), "20");
        assert_eq!(t.to_sheet_row()[3], "true");
    }

    #[test]
    fn test_bool_coercion() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" True "));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool(""));
    }
}
