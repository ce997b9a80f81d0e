//! A tab read together with the position of each of its rows. Saves use it to update rows in place
//! and append new ones below the last row, so nothing that is already in the tab is cleared.

use crate::api::{Sheet, SheetRange, MISSING_TAB};
use crate::model::{SheetColumns, SheetRecord};
use crate::Result;
use anyhow::Context;

/// A record and the row it was read from.
#[derive(Debug, Clone)]
pub struct TabRow<R> {
    /// The row number in A1 notation, so the header row is 1.
    pub number: usize,
    pub cells: Vec<String>,
    pub record: R,
}

/// What one tab held when it was read.
#[derive(Debug, Clone)]
pub struct SheetTab<R> {
    range: String,
    exists: bool,
    /// `None` when the tab has no header row.
    columns: Option<SheetColumns>,
    rows: Vec<TabRow<R>>,
    /// The row below the last row that has any content.
    next_row: usize,
}

impl<R: SheetRecord> SheetTab<R> {
    /// Reads `range`, which must start at `A1`. A tab that does not exist reads as empty with
    /// `exists()` false. Rows that do not describe a usable record are skipped, but still count
    /// towards `next_row`.
    pub async fn read(sheet: &mut (dyn Sheet + Send), range: &str) -> Result<Self> {
        let rows = match sheet.get(range).await {
            Ok(rows) => rows,
            Err(e) if format!("{e:#}").contains(MISSING_TAB) => {
                return Ok(Self::empty(range, false));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to fetch {} from '{range}'", R::DOMAIN))
            }
        };

        let next_row = rows.len() + 1;
        let mut rows = rows.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Self::empty(range, true));
        };
        let columns = SheetColumns::resolve(range, &header, R::SHEET_HEADERS)?;
        let rows = rows
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
            .filter_map(|(ix, cells)| {
                let record = R::from_sheet(&columns, &cells)?;
                Some(TabRow {
                    number: ix + 2,
                    cells,
                    record,
                })
            })
            .collect();
        Ok(Self {
            range: range.to_string(),
            exists: true,
            columns: Some(columns),
            rows,
            next_row,
        })
    }

    fn empty(range: &str, exists: bool) -> Self {
        Self {
            range: range.to_string(),
            exists,
            columns: None,
            rows: Vec::new(),
            next_row: 1,
        }
    }

    pub fn range(&self) -> &str {
        &self.range
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// The tab name from the range, e.g. `Budgets` for `Budgets!A1:G`.
    pub fn title(&self) -> Option<&str> {
        self.range
            .split_once('!')
            .map(|(tab, _)| tab.trim_matches('\''))
    }

    pub fn rows(&self) -> &[TabRow<R>] {
        &self.rows
    }

    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.rows.iter().map(|row| &row.record)
    }

    pub fn into_records(self) -> Vec<R> {
        self.rows.into_iter().map(|row| row.record).collect()
    }

    /// The writes that put `records` into the tab. A record whose key matches a row is written
    /// over that row, keeping the cells of columns it does not own. The others are appended as
    /// one block below the last row. A tab without a header row gets one first.
    pub fn upsert_ranges(
        &self,
        records: &[R],
        to_row: impl Fn(&R) -> Vec<String>,
    ) -> Vec<SheetRange> {
        let mut ranges = Vec::new();
        let (columns, next_row) = match &self.columns {
            Some(columns) => (columns.clone(), self.next_row),
            None => {
                ranges.push(SheetRange {
                    range: self.row_range(1),
                    values: vec![R::SHEET_HEADERS.iter().map(|h| h.to_string()).collect()],
                });
                (SheetColumns::from_headers(R::SHEET_HEADERS), self.next_row.max(2))
            }
        };

        let mut appended = Vec::new();
        for record in records {
            let key = record.key();
            match self.rows.iter().find(|row| row.record.key() == key) {
                Some(row) => {
                    let mut cells = row.cells.clone();
                    columns.fill(&mut cells, R::SHEET_HEADERS, to_row(record));
                    ranges.push(SheetRange {
                        range: self.row_range(row.number),
                        values: vec![cells],
                    });
                }
                None => {
                    let mut cells = Vec::with_capacity(R::SHEET_HEADERS.len());
                    columns.fill(&mut cells, R::SHEET_HEADERS, to_row(record));
                    appended.push(cells);
                }
            }
        }
        if !appended.is_empty() {
            ranges.push(SheetRange {
                range: self.row_range(next_row),
                values: appended,
            });
        }
        ranges
    }

    /// `Budgets!A1:G` and 5 become `Budgets!A5`.
    fn row_range(&self, row: usize) -> String {
        match self.range.split_once('!') {
            Some((tab, _)) => format!("{tab}!A{row}"),
            None => format!("A{row}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheet;
    use crate::model::{Amount, Budget};
    use std::collections::HashMap;
    use std::str::FromStr;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn budget(category: &str, person: &str, month: u32, amount: &str) -> Budget {
        Budget {
            id: Budget::make_id(category, person, month, 2025),
            category: category.to_string(),
            person: person.to_string(),
            month,
            year: 2025,
            amount: Amount::from_str(amount).unwrap(),
            created_at: "c".to_string(),
            updated_at: "u".to_string(),
        }
    }

    async fn read(tabs: HashMap<String, Vec<Vec<String>>>) -> SheetTab<Budget> {
        let mut sheet = TestSheet::new(tabs);
        SheetTab::read(&mut sheet, "Budgets!A1:G").await.unwrap()
    }

    #[tokio::test]
    async fn test_rows_keep_their_position() {
        let mut tabs = HashMap::new();
        tabs.insert(
            "Budgets".to_string(),
            rows(&[
                Budget::SHEET_HEADERS,
                &["Food", "Sam", "1", "2025", "10", "", ""],
                &["Rent", "Alex", "2", "", "1200", "", ""],
                &[],
                &["Fun", "Sam", "1", "2025", "5", "", ""],
            ]),
        );
        let tab = read(tabs).await;
        assert!(tab.exists());
        assert_eq!(tab.title(), Some("Budgets"));
        let numbers: Vec<usize> = tab.rows().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 5]);

        let ranges = tab.upsert_ranges(
            &[budget("Fun", "Sam", 1, "7"), budget("Travel", "Sam", 3, "200")],
            Budget::to_sheet_row,
        );
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].range, "Budgets!A5");
        assert_eq!(ranges[0].values[0][4], "7");
        assert_eq!(ranges[1].range, "Budgets!A6");
        assert_eq!(ranges[1].values[0][0], "Travel");
    }

    #[tokio::test]
    async fn test_reordered_columns_are_respected() {
        let mut tabs = HashMap::new();
        tabs.insert(
            "Budgets".to_string(),
            rows(&[
                &["Person", "Category", "Month", "Year", "Amount", "Created At", "Updated At"],
                &["Sam", "Food", "1", "2025", "10", "c0", "u0"],
            ]),
        );
        let tab = read(tabs).await;
        let ranges = tab.upsert_ranges(&[budget("Food", "Sam", 1, "12")], Budget::to_sheet_row);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range, "Budgets!A2");
        assert_eq!(ranges[0].values[0][..2], ["Sam".to_string(), "Food".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_and_empty_tabs() {
        let tab = read(HashMap::new()).await;
        assert!(!tab.exists());

        let mut tabs = HashMap::new();
        tabs.insert("Budgets".to_string(), Vec::new());
        let tab = read(tabs).await;
        assert!(tab.exists());
        let ranges = tab.upsert_ranges(&[budget("Food", "Sam", 1, "10")], Budget::to_sheet_row);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].range, "Budgets!A1");
        assert_eq!(ranges[0].values[0][0], "Category");
        assert_eq!(ranges[1].range, "Budgets!A2");
    }
}
