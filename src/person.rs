//! Person attribution: decides whose account a transaction came from.

use crate::model::Transaction;
use serde::{Deserialize, Serialize};

/// A person and the substrings of an origin account that identify them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Person {
    /// Case-insensitive substring match of any pattern against `origin`. Empty patterns never match.
    pub fn matches(&self, origin: &str) -> bool {
        let origin = origin.to_lowercase();
        self.patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .any(|p| !p.is_empty() && origin.contains(&p))
    }
}

/// The first person in `people` whose patterns match `origin`.
pub fn attribute<'a>(people: &'a [Person], origin: &str) -> Option<&'a Person> {
    people.iter().find(|person| person.matches(origin))
}

/// Sets `person` on every transaction. Transactions that match nobody get `None`.
pub fn enrich(people: &[Person], transactions: &mut [Transaction]) {
    for transaction in transactions.iter_mut() {
        transaction.person = attribute(people, &transaction.origin).map(|p| p.name.clone());
    }
}

/// Finds a configured person by name, ignoring case.
pub fn find<'a>(people: &'a [Person], name: &str) -> Option<&'a Person> {
    people
        .iter()
        .find(|person| person.name.eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<Person> {
        vec![
            Person {
                name: "Alex".to_string(),
                patterns: vec!["alex".to_string(), "a. smith".to_string()],
            },
            Person {
                name: "Sam".to_string(),
                patterns: vec!["sam".to_string(), " ".to_string()],
            },
        ]
    }

    #[test]
    fn test_attribute() {
        let people = people();
        assert_eq!(attribute(&people, "Card ALEX").map(|p| p.name.as_str()), Some("Alex"));
        assert_eq!(attribute(&people, "Checking A. Smith").map(|p| p.name.as_str()), Some("Alex"));
        assert_eq!(attribute(&people, "Card Sam").map(|p| p.name.as_str()), Some("Sam"));
        assert!(attribute(&people, "Joint account").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let people = people();
        assert_eq!(attribute(&people, "Alex and Sam").map(|p| p.name.as_str()), Some("Alex"));
    }

    #[test]
    fn test_enrich() {
        let mut transactions = vec![
            Transaction {
                origin: "Card Sam".to_string(),
                ..Transaction::default()
            },
            Transaction {
                origin: "Cash".to_string(),
                person: Some("stale".to_string()),
                ..Transaction::default()
            },
        ];
        enrich(&people(), &mut transactions);
        assert_eq!(transactions[0].person.as_deref(), Some("Sam"));
        assert_eq!(transactions[1].person, None);
    }

    #[test]
    fn test_find() {
        let people = people();
        assert!(find(&people, "sam").is_some());
        assert!(find(&people, "Jordan").is_none());
    }
}
