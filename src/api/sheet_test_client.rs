//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::{Sheet, SheetRange};
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::io::Cursor;

/// The tab that a range without a `Tab!` prefix refers to.
const DEFAULT_TAB: &str = "Transactions";

/// An implementation of the `Sheet` trait that does not use Google sheets. It holds tabs in memory
/// and, by default, is seeded with transactions, budgets and budget templates.
#[derive(Debug, Clone)]
pub struct TestSheet {
    tabs: HashMap<String, Vec<Vec<String>>>,
    fail_reads: bool,
}

impl TestSheet {
    /// Create a new `TestSheet` using `tabs`. The map key is the tab name and the map value is the
    /// rows of the tab, header row first.
    pub fn new(tabs: HashMap<String, Vec<Vec<String>>>) -> Self {
        Self {
            tabs,
            fail_reads: false,
        }
    }

    /// A sheet whose reads always fail, as if Google could not be reached.
    pub fn unreachable() -> Self {
        Self {
            tabs: HashMap::new(),
            fail_reads: true,
        }
    }

    /// The rows currently held for `tab`.
    pub fn tab(&self, tab: &str) -> Option<&Vec<Vec<String>>> {
        self.tabs.get(tab)
    }
}

impl Default for TestSheet {
    /// Loads seed data from this module.
    fn default() -> Self {
        let mut tabs = HashMap::new();
        tabs.insert(DEFAULT_TAB.to_string(), load_csv(TRANSACTION_DATA));
        tabs.insert("Budgets".to_string(), load_csv(BUDGET_DATA));
        tabs.insert("Budget_Templates".to_string(), load_csv(TEMPLATE_DATA));
        Self::new(tabs)
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        if self.fail_reads {
            bail!("The test sheet is unreachable");
        }
        let a1 = A1::parse(range)?;
        let rows = self
            .tabs
            .get(a1.tab)
            .with_context(|| format!("Unable to parse range: {range}"))?;

        // Like the API: cells right of the range are cut off and trailing empty rows are dropped.
        let mut rows: Vec<Vec<String>> = rows
            .iter()
            .skip(a1.first_row.saturating_sub(1))
            .map(|row| match a1.width {
                Some(width) => row.iter().take(width).cloned().collect(),
                None => row.clone(),
            })
            .collect();
        while rows.last().is_some_and(|row| row.iter().all(|c| c.is_empty())) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn add_sheet(&mut self, title: &str) -> Result<()> {
        if self.tabs.contains_key(title) {
            bail!("A sheet with the name \"{title}\" already exists");
        }
        self.tabs.insert(title.to_string(), Vec::new());
        Ok(())
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        for sheet_range in data {
            let a1 = A1::parse(&sheet_range.range)?;
            let rows = self
                .tabs
                .get_mut(a1.tab)
                .with_context(|| format!("Unable to parse range: {}", sheet_range.range))?;
            let start = a1.first_row.saturating_sub(1);
            for (ix, values) in sheet_range.values.iter().enumerate() {
                let target = start + ix;
                if rows.len() <= target {
                    rows.resize(target + 1, Vec::new());
                }
                rows[target] = values.clone();
            }
        }
        Ok(())
    }
}

/// The parts of an A1 range that the test sheet understands, e.g. `Budgets!A1:G`.
struct A1<'a> {
    tab: &'a str,
    first_row: usize,
    width: Option<usize>,
}

impl<'a> A1<'a> {
    fn parse(range: &'a str) -> Result<Self> {
        let (tab, cells) = match range.split_once('!') {
            Some((tab, cells)) => (tab.trim_matches('\''), cells),
            None => (DEFAULT_TAB, range),
        };
        let (start, end) = cells.split_once(':').unwrap_or((cells, ""));
        if !start.starts_with('A') {
            bail!("The test sheet only supports ranges that start in column A: {range}");
        }
        let first_row = start[1..].parse::<usize>().unwrap_or(1);
        let end_column: String = end.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let width = column_number(&end_column);
        Ok(Self {
            tab,
            first_row,
            width,
        })
    }
}

/// `A` is 1, `Z` is 26, `AA` is 27. Empty input has no column.
fn column_number(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    Some(letters.chars().fold(0, |acc, c| {
        acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1)
    }))
}

/// Loads rows from a CSV-formatted string. The seed data is static, so a bad row is skipped.
fn load_csv(csv_data: &str) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));
    rdr.records()
        .filter_map(|r| r.ok())
        .map(|record| record.iter().map(|field| field.to_string()).collect())
        .collect()
}

/// Seed transaction data. Includes an installment series with its anchor, a series without one,
/// and income for both people.
const TRANSACTION_DATA: &str = r##"Transaction Id,Date,Origin,Destination,Description,Amount,Recorded at,Remote Id
tx001,2025-01-05,Checking Alex,Bank Account,Salary ACME,5000.00,2025-01-05T09:00:00Z,rm001
tx002,2025-01-06,Checking Sam,Bank Account,Salary Globex,4200.00,2025-01-06T09:00:00Z,rm002
tx003,2025-01-15,Card Alex,Installments/Financing,Netflix 01/12,-39.90,2025-01-15T10:00:00Z,rm003
tx004,2025-01-16,Card Sam,Groceries,Whole Foods Market,-87.43,2025-01-16T18:22:00Z,rm004
tx005,2025-01-18,Card Alex,Restaurants,"Dinner, Chipotle",-14.85,2025-01-18T20:41:00Z,rm005
tx006,2025-01-20,Card Sam,Installments/Financing,Laptop Store 03/10,-250.00,2025-01-20T12:00:00Z,rm006
tx007,2025-01-20,Card Sam,Installments/Financing,Laptop Store 04/10,-250.00,2025-01-20T12:00:01Z,rm007
tx008,2025-01-22,Checking Alex,Utilities,Electric Company,-142.67,2025-01-22T06:00:00Z,rm008
tx009,2025-01-25,Card Sam,Installments/Financing,Sofa 01/03,-600.00,2025-01-25T15:30:00Z,rm009
tx010,2025-01-28,Card Alex,Coffee Shops,Blue Bottle Coffee,-8.50,2025-01-28T08:12:00Z,rm010
"##;

/// Seed budget data.
const BUDGET_DATA: &str = r##"Category,Person,Month,Year,Amount,Created At,Updated At
Groceries,Sam,1,2025,600.00,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
Restaurants,Alex,1,2025,300.00,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
"##;

/// Seed budget template data.
const TEMPLATE_DATA: &str = r##"Category,Person,Percentage,Active,Created At,Updated At
Groceries,Alex,15,true,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
Restaurants,Alex,10,true,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
Savings,Alex,20,false,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
Groceries,Sam,20,true,2025-01-01T00:00:00.000Z,2025-01-01T00:00:00.000Z
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_data() {
        let mut sheet = TestSheet::default();
        let rows = sheet.get("A1:H").await.unwrap();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[5][4], "Dinner, Chipotle");
        let rows = sheet.get("Budget_Templates!A1:F").await.unwrap();
        assert_eq!(rows[0].len(), 6);
    }

    #[tokio::test]
    async fn test_range_width() {
        let mut sheet = TestSheet::default();
        let rows = sheet.get("Budgets!A1:C").await.unwrap();
        assert!(rows.iter().all(|r| r.len() <= 3));
    }

    #[tokio::test]
    async fn test_missing_tab() {
        let mut sheet = TestSheet::default();
        let err = sheet.get("Nope!A1:C").await.unwrap_err();
        assert!(err.to_string().contains("Unable to parse range"));
    }

    #[tokio::test]
    async fn test_add_sheet_then_write() {
        let mut sheet = TestSheet::new(HashMap::new());
        assert!(sheet.get("Budgets!A1:G").await.is_err());
        sheet.add_sheet("Budgets").await.unwrap();
        assert!(sheet.get("Budgets!A1:G").await.unwrap().is_empty());
        assert!(sheet.add_sheet("Budgets").await.is_err());

        sheet
            .write_ranges(&[SheetRange {
                range: "Budgets!A2".to_string(),
                values: vec![vec!["Food".to_string()]],
            }])
            .await
            .unwrap();
        let rows = sheet.get("Budgets!A1:G").await.unwrap();
        assert_eq!(rows, vec![Vec::<String>::new(), vec!["Food".to_string()]]);
    }

    #[test]
    fn test_column_number() {
        assert_eq!(column_number("A"), Some(1));
        assert_eq!(column_number("H"), Some(8));
        assert_eq!(column_number("AA"), Some(27));
        assert_eq!(column_number(""), None);
    }
}
