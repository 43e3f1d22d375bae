// ⚠️ Error Taxonomy - every failure the ledger engine can report
// Validation problems are collected and returned together; storage failures
// propagate unchanged after the surrounding transaction has rolled back.

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// FORMAT VIOLATIONS (import payload problems)
// ============================================================================

/// One problem found in an import payload.
///
/// Row numbers are 1-based line numbers of the payload after blank lines are
/// dropped, so the header is row 1 and the first data row is row 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatViolation {
    /// Payload has no data rows (fewer than 2 non-blank lines)
    NotEnoughRows,

    /// Required headers absent from the header row
    MissingHeaders(Vec<String>),

    /// Headers present that are not part of the fixed schema
    ExtraHeaders(Vec<String>),

    /// A data row has empty values for required fields
    MissingFields { row: usize, fields: Vec<String> },

    /// A value could not be parsed into its column type
    InvalidValue {
        row: usize,
        field: String,
        value: String,
    },

    /// The period date is not a calendar date (YYYY-MM-DD)
    InvalidDate(String),
}

impl fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatViolation::NotEnoughRows => {
                write!(f, "The CSV file is empty or does not contain enough data")
            }
            FormatViolation::MissingHeaders(headers) => {
                write!(f, "Missing headers: {}", headers.join(", "))
            }
            FormatViolation::ExtraHeaders(headers) => {
                write!(f, "Extra headers found: {}", headers.join(", "))
            }
            FormatViolation::MissingFields { row, fields } => {
                write!(f, "Row {}: Missing data for fields: {}", row, fields.join(", "))
            }
            FormatViolation::InvalidValue { row, field, value } => {
                write!(f, "Row {}: Invalid value for {}: '{}'", row, field, value)
            }
            FormatViolation::InvalidDate(date) => {
                write!(f, "Invalid period date '{}' (expected YYYY-MM-DD)", date)
            }
        }
    }
}

fn join_violations(violations: &[FormatViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_accounts(accounts: &[i64]) -> String {
    accounts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// LEDGER ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or incomplete import payload
    #[error("Invalid import format: {}", join_violations(.0))]
    Format(Vec<FormatViolation>),

    /// Account number already imported for this calendar date
    #[error("Account number {account_number} already exists for the {date} period")]
    Duplicate { account_number: i64, date: NaiveDate },

    /// I/O or transaction failure in SQLite
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Referenced period, account or profile does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Period is sealed
    #[error("Period {0} has already been exported")]
    AlreadyExported(i64),

    /// Export blocked by unprinted collectibles
    #[error("Period {period_id} has unprinted collectibles: {}", join_accounts(.unprinted))]
    Incomplete { period_id: i64, unprinted: Vec<i64> },

    /// Payment already recorded for this collectible
    #[error("Account {account_number} in period {period_id} has already been processed")]
    AlreadyProcessed { period_id: i64, account_number: i64 },

    /// Payment request failed its preconditions
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    /// Other caller input rejected before reaching storage
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File sink could not persist the export
    #[error("Export sink failed: {0}")]
    Sink(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audit event payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// True for problems the user can fix by correcting their input.
    pub fn is_user_fixable(&self) -> bool {
        matches!(
            self,
            LedgerError::Format(_)
                | LedgerError::Duplicate { .. }
                | LedgerError::InvalidPayment(_)
                | LedgerError::InvalidInput(_)
                | LedgerError::Incomplete { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_lists_every_violation() {
        let err = LedgerError::Format(vec![
            FormatViolation::MissingFields {
                row: 2,
                fields: vec!["name".to_string()],
            },
            FormatViolation::MissingFields {
                row: 4,
                fields: vec!["due_date".to_string(), "daily_due".to_string()],
            },
        ]);

        let message = err.to_string();
        assert!(message.contains("Row 2: Missing data for fields: name"));
        assert!(message.contains("Row 4: Missing data for fields: due_date, daily_due"));
        assert!(err.is_user_fixable());
    }

    #[test]
    fn test_incomplete_lists_accounts() {
        let err = LedgerError::Incomplete {
            period_id: 7,
            unprinted: vec![1003, 1005],
        };
        assert_eq!(
            err.to_string(),
            "Period 7 has unprinted collectibles: 1003, 1005"
        );
    }

    #[test]
    fn test_storage_error_is_not_user_fixable() {
        let err = LedgerError::Storage(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_user_fixable());
    }
}
