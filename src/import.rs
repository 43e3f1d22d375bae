// 📥 Import Pipeline - CSV batch → new period + collectibles, all or nothing
//
// The payload is parsed and validated completely before the store is
// touched. Period creation, the same-date duplicate guard and every insert
// then run inside one IMMEDIATE transaction, so a rejected batch leaves no
// period and no collectibles behind.

use crate::db::{self, Collectible, Event, PaymentType, DATE_FORMAT};
use crate::error::{FormatViolation, LedgerError, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// The fixed header set of an import file, in export column order
pub const REQUIRED_HEADERS: [&str; 9] = [
    "account_number",
    "name",
    "remaining_balance",
    "due_date",
    "payment_type",
    "cheque_number",
    "amount_paid",
    "daily_due",
    "creditors_name",
];

// ============================================================================
// IMPORT SOURCE (document picker / file collaborator)
// ============================================================================

/// Supplies the raw payload of an import.
///
/// `Ok(None)` means the user cancelled (no file chosen); the pipeline then
/// leaves the store untouched.
pub trait ImportSource {
    fn read_payload(&mut self) -> Result<Option<String>>;
}

/// Reads the payload from a file on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImportSource for FileSource {
    fn read_payload(&mut self) -> Result<Option<String>> {
        Ok(Some(std::fs::read_to_string(&self.path)?))
    }
}

/// An in-memory payload; `None` behaves like a cancelled picker.
/// The payload is handed out once.
impl ImportSource for Option<String> {
    fn read_payload(&mut self) -> Result<Option<String>> {
        Ok(self.take())
    }
}

// ============================================================================
// PARSED ROWS
// ============================================================================

/// One validated data row, not yet attached to a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    /// 1-based line number (header is line 1)
    pub row: usize,
    pub account_number: i64,
    pub name: String,
    pub remaining_balance: f64,
    pub due_date: String,
    pub payment_type: PaymentType,
    pub cheque_number: String,
    pub amount_paid: f64,
    pub daily_due: f64,
    pub creditors_name: String,
}

impl ImportRow {
    /// Attach to a period as a fresh, unprinted collectible
    pub fn into_collectible(self, period_id: i64) -> Collectible {
        Collectible {
            account_number: self.account_number,
            name: self.name,
            remaining_balance: self.remaining_balance,
            due_date: self.due_date,
            payment_type: self.payment_type,
            cheque_number: self.cheque_number,
            amount_paid: self.amount_paid,
            daily_due: self.daily_due,
            creditors_name: self.creditors_name,
            is_printed: false,
            period_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub period_id: i64,
    pub date: NaiveDate,
    pub rows: usize,
}

/// Parse a period date in `YYYY-MM-DD` form
pub fn parse_period_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| LedgerError::Format(vec![FormatViolation::InvalidDate(value.to_string())]))
}

/// Account numbers compare numerically: "0042", "42" and "42.0" are the same
/// account.
fn parse_account_number(value: &str) -> Option<i64> {
    if let Ok(n) = value.parse::<i64>() {
        return (n >= 0).then_some(n);
    }
    let n = value.parse::<f64>().ok()?;
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn parse_amount(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Trim every line and drop blank ones
fn normalize_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parse and validate an import payload.
///
/// Every problem is collected before returning, so one `Format` error lists
/// all missing headers, extra headers and incomplete or unparsable rows.
pub fn parse_payload(content: &str) -> Result<Vec<ImportRow>> {
    let lines = normalize_lines(content);
    if lines.len() < 2 {
        return Err(LedgerError::Format(vec![FormatViolation::NotEnoughRows]));
    }

    // No quoting: a comma always separates fields
    let joined = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    // ------------------------------------------------------------------------
    // Header schema: exactly the required set
    // ------------------------------------------------------------------------
    let missing: Vec<String> = REQUIRED_HEADERS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .map(|h| h.to_string())
        .collect();

    let mut extra: Vec<String> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        let known = REQUIRED_HEADERS.contains(&header.as_str());
        let repeated = headers[..idx].contains(header);
        if !known || repeated {
            extra.push(header.clone());
        }
    }

    let mut header_violations = Vec::new();
    if !missing.is_empty() {
        header_violations.push(FormatViolation::MissingHeaders(missing));
    }
    if !extra.is_empty() {
        header_violations.push(FormatViolation::ExtraHeaders(extra));
    }
    if !header_violations.is_empty() {
        return Err(LedgerError::Format(header_violations));
    }

    // Column position of each required header
    let mut positions = [0usize; REQUIRED_HEADERS.len()];
    for (slot, required) in REQUIRED_HEADERS.iter().enumerate() {
        positions[slot] = headers
            .iter()
            .position(|h| h == required)
            .unwrap_or_default();
    }

    // ------------------------------------------------------------------------
    // Data rows
    // ------------------------------------------------------------------------
    let mut violations = Vec::new();
    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 2;

        let values: Vec<&str> = positions
            .iter()
            .map(|&pos| record.get(pos).unwrap_or(""))
            .collect();

        let empty: Vec<String> = REQUIRED_HEADERS
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_empty())
            .map(|(header, _)| header.to_string())
            .collect();

        if !empty.is_empty() {
            violations.push(FormatViolation::MissingFields { row, fields: empty });
            continue;
        }

        let mut invalid = |field: &str, value: &str| {
            violations.push(FormatViolation::InvalidValue {
                row,
                field: field.to_string(),
                value: value.to_string(),
            });
        };

        let account_number = parse_account_number(values[0]);
        if account_number.is_none() {
            invalid("account_number", values[0]);
        }
        let remaining_balance = parse_amount(values[2]);
        if remaining_balance.is_none() {
            invalid("remaining_balance", values[2]);
        }
        let amount_paid = parse_amount(values[6]);
        if amount_paid.is_none() {
            invalid("amount_paid", values[6]);
        }
        let daily_due = parse_amount(values[7]);
        if daily_due.is_none() {
            invalid("daily_due", values[7]);
        }

        let payment_type = PaymentType::parse(values[4]);
        if payment_type.is_none() {
            invalid("payment_type", values[4]);
        }

        if let (
            Some(account_number),
            Some(remaining_balance),
            Some(payment_type),
            Some(amount_paid),
            Some(daily_due),
        ) = (account_number, remaining_balance, payment_type, amount_paid, daily_due)
        {
            rows.push(ImportRow {
                row,
                account_number,
                name: values[1].to_string(),
                remaining_balance,
                due_date: values[3].to_string(),
                payment_type,
                cheque_number: values[5].to_string(),
                amount_paid,
                daily_due,
                creditors_name: values[8].to_string(),
            });
        }
    }

    if !violations.is_empty() {
        return Err(LedgerError::Format(violations));
    }

    Ok(rows)
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Import a payload as a new period for `date`.
///
/// On any failure the transaction is rolled back: no period row and no
/// collectible from this attempt remain.
pub fn import_collectibles(
    conn: &mut Connection,
    date: NaiveDate,
    content: &str,
) -> Result<ImportSummary> {
    let rows = match parse_payload(content) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(%date, error = %e, "import rejected");
            return Err(e);
        }
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let period_id = db::create_period(&tx, date)?;
    let count = rows.len();

    for row in rows {
        let line = row.row;
        if let Err(e) = db::insert_collectible(&tx, &row.into_collectible(period_id)) {
            // Dropping `tx` rolls back the period and every inserted row
            warn!(%date, period_id, row = line, error = %e, "import aborted, rolling back");
            return Err(e);
        }
    }

    db::insert_event(
        &tx,
        &Event::new(
            "period_imported",
            "period",
            &period_id.to_string(),
            serde_json::json!({
                "date": date.format(DATE_FORMAT).to_string(),
                "rows": count,
            }),
            "importer",
        ),
    )?;

    tx.commit()?;
    info!(%date, period_id, rows = count, "collectibles imported");

    Ok(ImportSummary {
        period_id,
        date,
        rows: count,
    })
}

/// Pull a payload from `source` and import it. Returns `Ok(None)` when the
/// source reports a cancellation; nothing is written in that case.
pub fn import_from_source(
    conn: &mut Connection,
    date: NaiveDate,
    source: &mut dyn ImportSource,
) -> Result<Option<ImportSummary>> {
    match source.read_payload()? {
        Some(content) => import_collectibles(conn, date, &content).map(Some),
        None => {
            info!(%date, "import cancelled, store untouched");
            Ok(None)
        }
    }
}

/// Remove an open period together with its collectibles.
///
/// Used to back out an import by hand, e.g. after an export crashed between
/// saving the file and sealing the period. Sealed periods cannot be
/// discarded.
pub fn discard_period(conn: &mut Connection, period_id: i64) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let period = db::get_period(&tx, period_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("period {}", period_id)))?;
    if period.is_exported {
        return Err(LedgerError::AlreadyExported(period_id));
    }

    let removed = db::delete_period(&tx, period_id)?;
    db::insert_event(
        &tx,
        &Event::new(
            "period_discarded",
            "period",
            &period_id.to_string(),
            serde_json::json!({ "rows": removed }),
            "admin",
        ),
    )?;

    tx.commit()?;
    warn!(period_id, removed, "period discarded");
    Ok(removed)
}
