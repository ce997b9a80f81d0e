//! Encodes records to, and decodes them from, the CSV text stored in cache blobs.
//!
//! Both directions are pure. Fields containing the delimiter, a quote or a line break are quoted
//! with internal quotes doubled, so any record survives a round trip. Decoding never fails on a
//! bad row: rows with too few columns are dropped and logged.

use crate::error::RowError;
use crate::model::Domain;
use crate::Result;
use anyhow::Context;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::fmt::Debug;
use tracing::warn;

/// A flat, typed row that can be stored in a cache blob.
pub trait Record: Clone + Debug + Send + Sync + 'static {
    /// The dataset this record type belongs to.
    const DOMAIN: Domain;

    /// The header row of the cache blob, in column order.
    const HEADER: &'static [&'static str];

    /// The natural key of the record.
    fn key(&self) -> String;

    /// The record's fields in `HEADER` order.
    fn to_row(&self) -> Vec<String>;

    /// Builds a record from `fields`, which holds at least `HEADER.len()` entries. Fields that do
    /// not parse are coerced to defaults.
    fn from_row(fields: &[&str]) -> Self;
}

/// Encodes `records` as CSV text with `R::HEADER` as the first line. Lines are separated by `\n`
/// and there is no trailing line break.
pub fn encode<R: Record>(records: &[R]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(R::HEADER)
        .context("Unable to write the header row")?;
    for record in records {
        writer
            .write_record(record.to_row())
            .with_context(|| format!("Unable to encode record '{}'", record.key()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Unable to flush the CSV writer: {e}"))?;
    let mut text = String::from_utf8(bytes).context("Encoded CSV was not valid UTF-8")?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Decodes CSV text produced by `encode`. The first line is treated as a header and skipped.
/// Empty or header-only input yields no records.
pub fn decode<R: Record>(text: &str) -> Vec<R> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (ix, result) in reader.records().enumerate() {
        match result.map_err(anyhow::Error::from).and_then(|row| {
            // Header is line 1, the first data row is line 2.
            let line = row.position().map(|p| p.line()).unwrap_or(ix as u64 + 2);
            decode_row::<R>(&row, line).map_err(anyhow::Error::from)
        }) {
            Ok(record) => records.push(record),
            Err(e) => warn!(domain = %R::DOMAIN, "Dropping malformed cache row: {e}"),
        }
    }
    records
}

fn decode_row<R: Record>(row: &StringRecord, line: u64) -> std::result::Result<R, RowError> {
    let expected = R::HEADER.len();
    if row.len() < expected {
        return Err(RowError::new(line, expected, row.len()));
    }
    let fields: Vec<&str> = row.iter().collect();
    Ok(R::from_row(&fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Budget, BudgetTemplate, Transaction};
    use std::str::FromStr;

    fn transaction(id: &str, description: &str, amount: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            date: "2025-01-15".to_string(),
            origin: "Nubank Juliana".to_string(),
            destination: "Streaming".to_string(),
            description: description.to_string(),
            amount: Amount::from_str(amount).unwrap(),
            recorded_at: "2025-01-15T10:00:00Z".to_string(),
            remote_id: format!("r-{id}"),
            person: None,
        }
    }

    #[test]
    fn test_header_is_bit_exact() {
        let text = encode::<Transaction>(&[]).unwrap();
        assert_eq!(
            text,
            "Transaction Id,Date,Origin,Destination,Description,Amount,Recorded at,Remote Id"
        );
        let text = encode::<Budget>(&[]).unwrap();
        assert_eq!(
            text,
            "ID,Category,Person,Month,Year,Amount,Created At,Updated At"
        );
        let text = encode::<BudgetTemplate>(&[]).unwrap();
        assert_eq!(
            text,
            "ID,Category,Person,Percentage,Active,Created At,Updated At"
        );
    }

    #[test]
    fn test_round_trip_with_awkward_content() {
        let records = vec![
            transaction("t1", "Netflix 01/12", "-39.90"),
            transaction("t2", "Dinner, with \"friends\"", "-120.5"),
            transaction("t3", "multi\nline\r\ndescription", "0"),
            transaction("t4", "", "1500"),
        ];
        let text = encode(&records).unwrap();
        assert!(!text.ends_with('\n'));
        let decoded: Vec<Transaction> = decode(&text);
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_budgets_and_templates_round_trip() {
        let budgets = vec![
            Budget {
                id: "eating,-out-\"sam\"-1-2025".to_string(),
                category: "Eating, out".to_string(),
                person: "\"Sam\"".to_string(),
                month: 1,
                year: 2025,
                amount: Amount::from_str("-0.005").unwrap(),
                created_at: "2025-01-01T00:00:00.000Z".to_string(),
                updated_at: String::new(),
            },
            Budget {
                id: "home-alex-12-2030".to_string(),
                category: "Home\nOffice".to_string(),
                person: "Alex".to_string(),
                month: 12,
                year: 2030,
                amount: Amount::from_str("123456789.123456789").unwrap(),
                created_at: String::new(),
                updated_at: String::new(),
            },
        ];
        let decoded: Vec<Budget> = decode(&encode(&budgets).unwrap());
        assert_eq!(decoded, budgets);

        let templates = vec![
            BudgetTemplate {
                id: "savings-alex".to_string(),
                category: "Savings, \"long term\"".to_string(),
                person: "Alex\r\nJr".to_string(),
                percentage: Amount::from_str("12.3456").unwrap(),
                active: true,
                created_at: "2025-01-01T00:00:00.000Z".to_string(),
                updated_at: "2025-02-01T00:00:00.000Z".to_string(),
            },
            BudgetTemplate {
                id: "fun-sam".to_string(),
                category: "Fun".to_string(),
                person: "Sam".to_string(),
                percentage: Amount::from_str("-5").unwrap(),
                active: false,
                created_at: String::new(),
                updated_at: String::new(),
            },
        ];
        let decoded: Vec<BudgetTemplate> = decode(&encode(&templates).unwrap());
        assert_eq!(decoded, templates);
    }

    #[test]
    fn test_quoting_rule() {
        let text = encode(&[transaction("t1", "a \"quoted\", value", "1")]).unwrap();
        assert!(text.contains("\"a \"\"quoted\"\", value\""));
    }

    #[test]
    fn test_empty_and_header_only() {
        assert!(decode::<Transaction>("").is_empty());
        assert!(decode::<Budget>("ID,Category,Person,Month,Year,Amount,Created At,Updated At").is_empty());
        assert!(decode::<Budget>("ID,Category,Person,Month,Year,Amount,Created At,Updated At\n").is_empty());
    }

    #[test]
    fn test_short_rows_are_dropped() {
        let text = "Transaction Id,Date,Origin,Destination,Description,Amount,Recorded at,Remote Id\n\
                    t1,2025-01-15,Nubank,Food,Lunch,-20,now,r1\n\
                    t2,2025-01-16,Nubank\n\
                    t3,2025-01-17,Nubank,Food,Dinner,-30,now,r3";
        let decoded: Vec<Transaction> = decode(text);
        let ids: Vec<&str> = decoded.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[test]
    fn test_unparsable_fields_use_defaults() {
        let text = "ID,Category,Person,Percentage,Active,Created At,Updated At\n\
                    food-juliana,Food,Juliana,lots,yes,,";
        let decoded: Vec<BudgetTemplate> = decode(text);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].percentage.is_zero());
        assert!(!decoded[0].active);
    }

    #[test]
    fn test_person_is_not_persisted() {
        let mut t = transaction("t1", "Lunch", "-20");
        t.person = Some("Juliana".to_string());
        let decoded: Vec<Transaction> = decode(&encode(&[t]).unwrap());
        assert_eq!(decoded[0].person, None);
    }
}
