use crate::codec::Record;
use crate::model::{Amount, Domain, SheetColumns, SheetRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Represents a single row from the transactions sheet.
///
/// `person` is never read from, or written to, the sheet or the cache. It is attached after
/// loading by person attribution.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    pub date: String,
    pub origin: String,
    pub destination: String,
    pub description: String,
    pub amount: Amount,
    pub recorded_at: String,
    pub remote_id: String,
    pub person: Option<String>,
}

impl Transaction {
    /// The date as `YYYY-MM-DD`, ignoring any time part. `None` when it does not parse.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        let date = self.date.trim();
        let day = date.split(['T', ' ']).next().unwrap_or(date);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

const TRANSACTION_ID: &str = "Transaction Id";
const DATE: &str = "Date";
const ORIGIN: &str = "Origin";
const DESTINATION: &str = "Destination";
const DESCRIPTION: &str = "Description";
const AMOUNT: &str = "Amount";
const RECORDED_AT: &str = "Recorded at";
const REMOTE_ID: &str = "Remote Id";

impl Record for Transaction {
    const DOMAIN: Domain = Domain::Transactions;
    const HEADER: &'static [&'static str] = &[
        TRANSACTION_ID,
        DATE,
        ORIGIN,
        DESTINATION,
        DESCRIPTION,
        AMOUNT,
        RECORDED_AT,
        REMOTE_ID,
    ];

    fn key(&self) -> String {
        self.transaction_id.clone()
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.transaction_id.clone(),
            self.date.clone(),
            self.origin.clone(),
            self.destination.clone(),
            self.description.clone(),
            self.amount.to_string(),
            self.recorded_at.clone(),
            self.remote_id.clone(),
        ]
    }

    fn from_row(fields: &[&str]) -> Self {
        Self {
            transaction_id: fields[0].to_string(),
            date: fields[1].to_string(),
            origin: fields[2].to_string(),
            destination: fields[3].to_string(),
            description: fields[4].to_string(),
            amount: Amount::parse_or_zero(fields[5]),
            recorded_at: fields[6].to_string(),
            remote_id: fields[7].to_string(),
            person: None,
        }
    }
}

impl SheetRecord for Transaction {
    // The transactions sheet uses the same headers as the cache blob.
    const SHEET_HEADERS: &'static [&'static str] = Self::HEADER;

    fn from_sheet(columns: &SheetColumns, row: &[String]) -> Option<Self> {
        let get = |header: &str| columns.get(row, header).to_string();
        Some(Self {
            transaction_id: get(TRANSACTION_ID),
            date: get(DATE),
            origin: get(ORIGIN),
            destination: get(DESTINATION),
            description: get(DESCRIPTION),
            amount: Amount::parse_or_zero(columns.get(row, AMOUNT)),
            recorded_at: get(RECORDED_AT),
            remote_id: get(REMOTE_ID),
            person: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sheet_by_header_name() {
        // Columns in a different order than the cache blob, plus an extra one.
        let headers = vec![
            "Date",
            "Transaction Id",
            "Notes",
            "Origin",
            "Destination",
            "Description",
            "Amount",
            "Recorded at",
            "Remote Id",
        ];
        let columns = SheetColumns::resolve("A1:H", &headers, Transaction::SHEET_HEADERS).unwrap();
        let row: Vec<String> = vec!["2025-01-15", "t1", "x", "Nubank", "Food", "Lunch", "-20.5"]
            .into_iter()
            .map(String::from)
            .collect();
        let t = Transaction::from_sheet(&columns, &row).unwrap();
        assert_eq!(t.transaction_id, "t1");
        assert_eq!(t.date, "2025-01-15");
        assert_eq!(t.amount.to_string(), "-20.5");
        // Short rows read as empty strings.
        assert_eq!(t.recorded_at, "");
        assert_eq!(t.remote_id, "");
    }

    #[test]
    fn test_parsed_date() {
        let mut t = Transaction {
            date: "2025-01-15".to_string(),
            ..Transaction::default()
        };
        assert_eq!(t.parsed_date(), NaiveDate::from_ymd_opt(2025, 1, 15));
        t.date = "2025-01-15T10:00:00Z".to_string();
        assert_eq!(t.parsed_date(), NaiveDate::from_ymd_opt(2025, 1, 15));
        t.date = "15/01/2025".to_string();
        assert_eq!(t.parsed_date(), None);
    }
}
