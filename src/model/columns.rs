use crate::codec::Record;
use crate::error::SchemaError;
use std::collections::HashMap;

/// A record type that is read from a tab of the spreadsheet.
pub trait SheetRecord: Record {
    /// Headers that the tab must have. They are located by name, so the tab may order them
    /// differently or carry extra columns.
    const SHEET_HEADERS: &'static [&'static str];

    /// Whether a tab that does not exist yet is read as an empty dataset.
    const OPTIONAL_TAB: bool = false;

    /// Builds a record from a data row, or returns `None` when the row does not describe a
    /// usable record.
    fn from_sheet(columns: &SheetColumns, row: &[String]) -> Option<Self>;
}

/// Maps the header names of a sheet to their column positions. It is resolved once per fetch,
/// from the first row of the returned range.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SheetColumns {
    index: HashMap<String, usize>,
}

impl SheetColumns {
    /// Locates every header in `required` within `header_row`. Headers are compared after
    /// trimming whitespace. When the same header appears twice the first one wins.
    pub fn resolve<S: AsRef<str>>(
        range: &str,
        header_row: &[S],
        required: &[&str],
    ) -> Result<Self, SchemaError> {
        let mut index = HashMap::new();
        for (ix, header) in header_row.iter().enumerate() {
            index
                .entry(header.as_ref().trim().to_string())
                .or_insert(ix);
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|&&h| !index.contains_key(h))
            .map(|h| h.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::new(range, missing));
        }
        Ok(Self { index })
    }

    /// The columns of a tab whose header row is exactly `headers`.
    pub fn from_headers(headers: &[&str]) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(ix, h)| (h.to_string(), ix))
            .collect();
        Self { index }
    }

    /// Puts `values[i]` in the column of `headers[i]`, growing `row` when it is too short. Cells
    /// of other columns keep their content.
    pub fn fill(&self, row: &mut Vec<String>, headers: &[&str], values: Vec<String>) {
        for (header, value) in headers.iter().zip(values) {
            if let Some(&ix) = self.index.get(*header) {
                if row.len() <= ix {
                    row.resize(ix + 1, String::new());
                }
                row[ix] = value;
            }
        }
    }

    /// The value of `header` in `row`. Unknown headers and cells past the end of a short row are
    /// read as an empty string.
    pub fn get<'a>(&self, row: &'a [String], header: &str) -> &'a str {
        self.index
            .get(header)
            .and_then(|&ix| row.get(ix))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

/// Builds the natural identifier used for budgets and templates: the parts joined by `-`,
/// lower-cased, with runs of whitespace replaced by `-`.
pub(crate) fn natural_id(parts: &[&str]) -> String {
    parts
        .join("-")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_headers_are_reported() {
        let err = SheetColumns::resolve("Budgets!A1:G", &["Category", "Person"], &["Category", "Month", "Year"])
            .unwrap_err();
        assert_eq!(err.missing(), &["Month".to_string(), "Year".to_string()]);
        assert!(err.to_string().contains("Budgets!A1:G"));
    }

    #[test]
    fn test_headers_are_trimmed() {
        let columns = SheetColumns::resolve("A1:B", &[" Category ", "Person"], &["Category"]).unwrap();
        let row = vec!["Food".to_string()];
        assert_eq!(columns.get(&row, "Category"), "Food");
        assert_eq!(columns.get(&row, "Person"), "");
        assert_eq!(columns.get(&row, "Nope"), "");
    }

    #[test]
    fn test_fill_keeps_other_cells() {
        let columns =
            SheetColumns::resolve("A1:D", &["Person", "Notes", "Category"], &["Category", "Person"]).unwrap();
        let mut row = vec!["Sam".to_string(), "keep me".to_string()];
        columns.fill(&mut row, &["Category", "Person"], vec!["Food".to_string(), "Alex".to_string()]);
        assert_eq!(row, vec!["Alex", "keep me", "Food"]);

        let mut row = Vec::new();
        SheetColumns::from_headers(&["Category", "Person"]).fill(
            &mut row,
            &["Category", "Person"],
            vec!["Food".to_string(), "Alex".to_string()],
        );
        assert_eq!(row, vec!["Food", "Alex"]);
    }

    #[test]
    fn test_natural_id() {
        assert_eq!(natural_id(&["Eating Out", "Juliana", "1", "2025"]), "eating-out-juliana-1-2025");
        assert_eq!(natural_id(&["Home  Office", "Gabriel"]), "home-office-gabriel");
    }
}
