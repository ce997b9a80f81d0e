//! Crate-wide error aliases plus the small set of typed errors that callers need to inspect.

use serde::Serialize;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies an error that escapes a public command so that the outer surface can report it
/// consistently. It is attached to an `anyhow::Error` as context and recovered with
/// `error_type`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The configuration or home directory is missing or invalid.
    Config,
    /// OAuth credentials are missing, expired or rejected.
    Auth,
    /// The spreadsheet (source of truth) could not be read or written.
    Source,
    /// A cache backend could not be read or written and no fallback was allowed.
    Cache,
    /// Input was rejected before anything was written.
    Validation,
    /// Request parameters were malformed.
    Request,
}

impl ErrorType {
    /// The HTTP-equivalent status for this class of error.
    pub fn status(&self) -> u16 {
        match self {
            ErrorType::Validation | ErrorType::Request => 400,
            ErrorType::Source => 502,
            ErrorType::Cache => 503,
            ErrorType::Config | ErrorType::Auth => 500,
        }
    }
}

serde_plain::derive_display_from_serialize!(ErrorType);

/// Attaches an `ErrorType` to a result's error.
pub trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| {
            let e: anyhow::Error = e.into();
            e.context(error_type)
        })
    }
}

/// Finds the `ErrorType` that was attached to `e`, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}

/// A row that does not have the number of columns its record type requires.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RowError {
    line: u64,
    expected: usize,
    found: usize,
}

impl RowError {
    pub fn new(line: u64, expected: usize, found: usize) -> Self {
        Self {
            line,
            expected,
            found,
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn found(&self) -> usize {
        self.found
    }
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row at line {} has {} columns but at least {} are required",
            self.line, self.found, self.expected
        )
    }
}

impl StdError for RowError {}

/// A sheet whose header row lacks a column that its record type requires.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SchemaError {
    range: String,
    missing: Vec<String>,
}

impl SchemaError {
    pub fn new(range: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            range: range.into(),
            missing,
        }
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The header row of '{}' is missing required columns: {}",
            self.range,
            self.missing.join(", ")
        )
    }
}

impl StdError for SchemaError {}

/// One rejected field of a write request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Violation {
    /// Which input record the violation belongs to, counting from zero.
    pub index: usize,
    pub field: String,
    pub message: String,
}

/// All violations found in a write request. Nothing is written when this is returned.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: usize, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            index,
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// `Ok(())` when no violations were collected, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.violations.len())?;
        for v in &self.violations {
            write!(f, "; [{}] {}: {}", v.index, v.field, v.message)?;
        }
        Ok(())
    }
}

impl StdError for ValidationErrors {}
