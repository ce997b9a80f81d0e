use crate::codec::Record;
use crate::model::columns::natural_id;
use crate::model::{Amount, Domain, SheetColumns, SheetRecord};
use serde::{Deserialize, Serialize};

/// A monthly spending limit for one category and person.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub category: String,
    pub person: String,
    pub month: u32,
    pub year: i32,
    pub amount: Amount,
    pub created_at: String,
    pub updated_at: String,
}

impl Budget {
    /// The identifier derived from the natural key `category+person+month+year`.
    pub fn make_id(category: &str, person: &str, month: u32, year: i32) -> String {
        natural_id(&[category, person, &month.to_string(), &year.to_string()])
    }

    /// The values written to the budgets tab, in `SHEET_HEADERS` order.
    pub fn to_sheet_row(&self) -> Vec<String> {
        vec![
            self.category.clone(),
            self.person.clone(),
            self.month.to_string(),
            self.year.to_string(),
            self.amount.to_string(),
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }
}

const ID: &str = "ID";
const CATEGORY: &str = "Category";
const PERSON: &str = "Person";
const MONTH: &str = "Month";
const YEAR: &str = "Year";
const AMOUNT: &str = "Amount";
const CREATED_AT: &str = "Created At";
const UPDATED_AT: &str = "Updated At";

impl Record for Budget {
    const DOMAIN: Domain = Domain::Budgets;
    const HEADER: &'static [&'static str] = &[
        ID, CATEGORY, PERSON, MONTH, YEAR, AMOUNT, CREATED_AT, UPDATED_AT,
    ];

    fn key(&self) -> String {
        self.id.clone()
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.category.clone(),
            self.person.clone(),
            self.month.to_string(),
            self.year.to_string(),
            self.amount.to_string(),
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }

    fn from_row(fields: &[&str]) -> Self {
        Self {
            id: fields[0].to_string(),
            category: fields[1].to_string(),
            person: fields[2].to_string(),
            month: fields[3].trim().parse().unwrap_or(0),
            year: fields[4].trim().parse().unwrap_or(0),
            amount: Amount::parse_or_zero(fields[5]),
            created_at: fields[6].to_string(),
            updated_at: fields[7].to_string(),
        }
    }
}

impl SheetRecord for Budget {
    const SHEET_HEADERS: &'static [&'static str] =
        &[CATEGORY, PERSON, MONTH, YEAR, AMOUNT, CREATED_AT, UPDATED_AT];

    const OPTIONAL_TAB: bool = true;

    fn from_sheet(columns: &SheetColumns, row: &[String]) -> Option<Self> {
        let category = columns.get(row, CATEGORY).to_string();
        let person = columns.get(row, PERSON).to_string();
        let month: u32 = columns.get(row, MONTH).trim().parse().unwrap_or(0);
        let year: i32 = columns.get(row, YEAR).trim().parse().unwrap_or(0);
        if category.is_empty() || person.is_empty() || month == 0 || year == 0 {
            return None;
        }
        Some(Self {
            id: Self::make_id(&category, &person, month, year),
            category,
            person,
            month,
            year,
            amount: Amount::parse_or_zero(columns.get(row, AMOUNT)),
            created_at: columns.get(row, CREATED_AT).to_string(),
            updated_at: columns.get(row, UPDATED_AT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> SheetColumns {
        SheetColumns::resolve("Budgets!A1:G", Budget::SHEET_HEADERS, Budget::SHEET_HEADERS).unwrap()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_sheet() {
        let b = Budget::from_sheet(
            &columns(),
            &row(&["Eating Out", "Juliana", "3", "2025", "800.00", "c", "u"]),
        )
        .unwrap();
        assert_eq!(b.id, "eating-out-juliana-3-2025");
        assert_eq!(b.month, 3);
        assert_eq!(b.year, 2025);
        assert_eq!(b.amount.to_string(), "800.00");
        assert_eq!(b.to_sheet_row()[0], "Eating Out");
    }

    #[test]
    fn test_incomplete_rows_are_skipped() {
        assert!(Budget::from_sheet(&columns(), &row(&["", "Juliana", "3", "2025"])).is_none());
        assert!(Budget::from_sheet(&columns(), &row(&["Food", "Juliana", "x", "2025"])).is_none());
        assert!(Budget::from_sheet(&columns(), &row(&["Food", "Juliana", "3"])).is_none());
    }
}
