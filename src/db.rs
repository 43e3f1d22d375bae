// 🗄️ Ledger Store - periods, collectibles and the audit trail in SQLite
//
// Every function takes a `&Connection`, so callers can pass a
// `rusqlite::Transaction` (it derefs to `Connection`) and group several
// statements into one atomic unit.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Storage format of `period.date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// PAYMENT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    /// No payment recorded yet
    #[default]
    Unset,
    Cash,
    Cheque,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Unset => "",
            PaymentType::Cash => "Cash",
            PaymentType::Cheque => "Cheque",
        }
    }

    /// Parse a payment type as written by agents or spreadsheets.
    /// Returns `None` for values that name no known type.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "unset" | "none" | "n/a" | "-" => Some(PaymentType::Unset),
            "cash" => Some(PaymentType::Cash),
            "cheque" | "check" => Some(PaymentType::Cheque),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DATA MODEL
// ============================================================================

/// One dated collection batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub period_id: i64,
    pub date: NaiveDate,
    pub is_exported: bool,
}

/// One debtor account within a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    pub account_number: i64,
    pub name: String,
    pub remaining_balance: f64,
    pub due_date: String,
    pub payment_type: PaymentType,
    pub cheque_number: String,
    pub amount_paid: f64,
    pub daily_due: f64,
    pub creditors_name: String,
    pub is_printed: bool,
    pub period_id: i64,
}

/// The values a settlement writes onto a collectible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_type: PaymentType,
    pub cheque_number: String,
    pub amount_paid: f64,
    /// Agent recording the payment
    pub creditors_name: String,
}

/// Durable record of a sealed export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub period_id: i64,
    pub filename: String,
    pub row_count: i64,
    /// SHA-256 of the bytes handed to the file sink
    pub sha256: String,
    pub exported_at: DateTime<Utc>,
}

/// Event for audit trail: every state change writes one
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the ledger database and make sure the schema exists.
/// `":memory:"` opens a private in-memory database.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = if path.as_os_str() == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(path)?
    };
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery, foreign keys for period → collectible integrity
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // AUTOINCREMENT keeps period ids monotonic even after a rolled back import
    conn.execute(
        "CREATE TABLE IF NOT EXISTS period (
            period_id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            is_exported INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS collectibles (
            account_number INTEGER NOT NULL,
            name TEXT NOT NULL,
            remaining_balance REAL NOT NULL,
            due_date TEXT NOT NULL,
            payment_type TEXT NOT NULL DEFAULT '',
            cheque_number TEXT NOT NULL DEFAULT '',
            amount_paid REAL NOT NULL DEFAULT 0.0,
            daily_due REAL NOT NULL,
            creditors_name TEXT,
            is_printed INTEGER NOT NULL DEFAULT 0,
            period_id INTEGER NOT NULL REFERENCES period(period_id) ON DELETE CASCADE,
            PRIMARY KEY (account_number, period_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exports (
            period_id INTEGER PRIMARY KEY REFERENCES period(period_id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            exported_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admin_accounts (
            username TEXT PRIMARY KEY NOT NULL,
            password_hash TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS consultant (
            consultant_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            area TEXT NOT NULL
        )",
        [],
    )?;

    // Audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_date ON period(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_collectibles_period ON collectibles(period_id, is_printed)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const COLLECTIBLE_COLUMNS: &str = "c.account_number, c.name, c.remaining_balance, c.due_date,
     c.payment_type, c.cheque_number, c.amount_paid, c.daily_due,
     c.creditors_name, c.is_printed, c.period_id";

fn parse_date_column(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn period_from_row(row: &Row) -> rusqlite::Result<Period> {
    let date: String = row.get(1)?;
    Ok(Period {
        period_id: row.get(0)?,
        date: parse_date_column(1, &date)?,
        is_exported: row.get(2)?,
    })
}

fn collectible_from_row(row: &Row) -> rusqlite::Result<Collectible> {
    let payment_type: String = row.get(4)?;
    let creditors_name: Option<String> = row.get(8)?;

    Ok(Collectible {
        account_number: row.get(0)?,
        name: row.get(1)?,
        remaining_balance: row.get(2)?,
        due_date: row.get(3)?,
        payment_type: PaymentType::parse(&payment_type).unwrap_or_default(),
        cheque_number: row.get(5)?,
        amount_paid: row.get(6)?,
        daily_due: row.get(7)?,
        creditors_name: creditors_name.unwrap_or_default(),
        is_printed: row.get(9)?,
        period_id: row.get(10)?,
    })
}

fn query_collectibles<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Collectible>> {
    let mut stmt = conn.prepare(sql)?;
    let collectibles = stmt
        .query_map(params, collectible_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(collectibles)
}

// ============================================================================
// PERIODS
// ============================================================================

/// Create a new open period for `date` and return its id.
///
/// Does not check whether another period already exists for the same date;
/// that policy belongs to the caller.
pub fn create_period(conn: &Connection, date: NaiveDate) -> Result<i64> {
    conn.execute(
        "INSERT INTO period (date, is_exported) VALUES (?1, 0)",
        params![date.format(DATE_FORMAT).to_string()],
    )?;
    let period_id = conn.last_insert_rowid();
    debug!(period_id, %date, "period created");
    Ok(period_id)
}

pub fn get_period(conn: &Connection, period_id: i64) -> Result<Option<Period>> {
    let period = conn
        .query_row(
            "SELECT period_id, date, is_exported FROM period WHERE period_id = ?1",
            params![period_id],
            period_from_row,
        )
        .optional()?;
    Ok(period)
}

pub fn list_periods(conn: &Connection) -> Result<Vec<Period>> {
    let mut stmt =
        conn.prepare("SELECT period_id, date, is_exported FROM period ORDER BY period_id")?;
    let periods = stmt
        .query_map([], period_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(periods)
}

/// Most recent period opened for `date`, if any
pub fn find_period_by_date(conn: &Connection, date: NaiveDate) -> Result<Option<Period>> {
    let period = conn
        .query_row(
            "SELECT period_id, date, is_exported FROM period
             WHERE date = ?1
             ORDER BY period_id DESC
             LIMIT 1",
            params![date.format(DATE_FORMAT).to_string()],
            period_from_row,
        )
        .optional()?;
    Ok(period)
}

/// The newest period, but only while it is still open
pub fn latest_open_period(conn: &Connection) -> Result<Option<Period>> {
    let latest = conn
        .query_row(
            "SELECT period_id, date, is_exported FROM period
             ORDER BY period_id DESC
             LIMIT 1",
            [],
            period_from_row,
        )
        .optional()?;
    Ok(latest.filter(|p| !p.is_exported))
}

/// Flip `is_exported` on an open period. Returns the number of rows changed
/// (0 when the period is missing or already sealed).
pub fn mark_period_exported(conn: &Connection, period_id: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE period SET is_exported = 1 WHERE period_id = ?1 AND is_exported = 0",
        params![period_id],
    )?;
    Ok(changed)
}

/// Remove a period and every collectible that references it. Run inside the
/// caller's transaction to make the removal atomic with other writes.
pub fn delete_period(conn: &Connection, period_id: i64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM collectibles WHERE period_id = ?1",
        params![period_id],
    )?;
    conn.execute("DELETE FROM period WHERE period_id = ?1", params![period_id])?;
    debug!(period_id, removed, "period deleted");
    Ok(removed)
}

// ============================================================================
// COLLECTIBLES
// ============================================================================

/// True when `account_number` already exists under any period for `date`.
///
/// Compares the stored INTEGER column against an integer parameter, so
/// "0042" in one file and "42" in another are the same account.
pub fn account_exists_for_date(
    conn: &Connection,
    date: NaiveDate,
    account_number: i64,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM collectibles c
            JOIN period p ON c.period_id = p.period_id
            WHERE p.date = ?1 AND c.account_number = ?2
        )",
        params![date.format(DATE_FORMAT).to_string(), account_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert one collectible under an existing period.
///
/// Rejects the row with `Duplicate` when the account number is already
/// present for the period's calendar date, across every period sharing that
/// date. The composite primary key backs this up inside a single period.
pub fn insert_collectible(conn: &Connection, entry: &Collectible) -> Result<()> {
    let period = get_period(conn, entry.period_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("period {}", entry.period_id)))?;

    if account_exists_for_date(conn, period.date, entry.account_number)? {
        return Err(LedgerError::Duplicate {
            account_number: entry.account_number,
            date: period.date,
        });
    }

    let result = conn.execute(
        "INSERT INTO collectibles (
            account_number, name, remaining_balance, due_date, payment_type,
            cheque_number, amount_paid, daily_due, creditors_name, is_printed, period_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.account_number,
            entry.name,
            entry.remaining_balance,
            entry.due_date,
            entry.payment_type.as_str(),
            entry.cheque_number,
            entry.amount_paid,
            entry.daily_due,
            entry.creditors_name,
            entry.is_printed,
            entry.period_id,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(LedgerError::Duplicate {
                account_number: entry.account_number,
                date: period.date,
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_collectible(
    conn: &Connection,
    period_id: i64,
    account_number: i64,
) -> Result<Option<Collectible>> {
    let sql = format!(
        "SELECT {} FROM collectibles c WHERE c.period_id = ?1 AND c.account_number = ?2",
        COLLECTIBLE_COLUMNS
    );
    let collectible = conn
        .query_row(&sql, params![period_id, account_number], collectible_from_row)
        .optional()?;
    Ok(collectible)
}

/// Every collectible of a period, in import order
pub fn collectibles_for_period(conn: &Connection, period_id: i64) -> Result<Vec<Collectible>> {
    let sql = format!(
        "SELECT {} FROM collectibles c WHERE c.period_id = ?1 ORDER BY c.rowid",
        COLLECTIBLE_COLUMNS
    );
    query_collectibles(conn, &sql, params![period_id])
}

/// Unprinted collectibles of a period that is still open (the agent's worklist)
pub fn pending_collectibles(conn: &Connection, period_id: i64) -> Result<Vec<Collectible>> {
    let sql = format!(
        "SELECT {} FROM collectibles c
         JOIN period p ON c.period_id = p.period_id
         WHERE c.period_id = ?1 AND c.is_printed = 0 AND p.is_exported = 0
         ORDER BY c.rowid",
        COLLECTIBLE_COLUMNS
    );
    query_collectibles(conn, &sql, params![period_id])
}

/// Collectibles of every period opened for `date`
pub fn collectibles_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<Collectible>> {
    let sql = format!(
        "SELECT {} FROM collectibles c
         JOIN period p ON c.period_id = p.period_id
         WHERE p.date = ?1
         ORDER BY c.period_id, c.rowid",
        COLLECTIBLE_COLUMNS
    );
    query_collectibles(conn, &sql, params![date.format(DATE_FORMAT).to_string()])
}

/// Account numbers in a period that have not been printed yet
pub fn unprinted_accounts(conn: &Connection, period_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT account_number FROM collectibles
         WHERE period_id = ?1 AND is_printed = 0
         ORDER BY rowid",
    )?;
    let accounts = stmt
        .query_map(params![period_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(accounts)
}

pub fn count_collectibles(conn: &Connection, period_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM collectibles WHERE period_id = ?1",
        params![period_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Apply a payment to an unprinted collectible and mark it printed, in one
/// statement. Returns the number of rows changed: 0 means the row is missing
/// or was already settled.
pub fn update_collectible_payment(
    conn: &Connection,
    period_id: i64,
    account_number: i64,
    payment: &Payment,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE collectibles
         SET payment_type = ?1,
             cheque_number = ?2,
             amount_paid = ?3,
             creditors_name = ?4,
             is_printed = 1,
             remaining_balance = remaining_balance - ?3
         WHERE account_number = ?5 AND period_id = ?6 AND is_printed = 0",
        params![
            payment.payment_type.as_str(),
            payment.cheque_number,
            payment.amount_paid,
            payment.creditors_name,
            account_number,
            period_id,
        ],
    )?;
    Ok(changed)
}

/// Delete the collectible rows of a period, keeping the period row itself
pub fn purge_collectibles(conn: &Connection, period_id: i64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM collectibles WHERE period_id = ?1",
        params![period_id],
    )?;
    Ok(removed)
}

// ============================================================================
// EXPORT RECORDS
// ============================================================================

pub fn insert_export_record(conn: &Connection, record: &ExportRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO exports (period_id, filename, row_count, sha256, exported_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.period_id,
            record.filename,
            record.row_count,
            record.sha256,
            record.exported_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_export_record(conn: &Connection, period_id: i64) -> Result<Option<ExportRecord>> {
    let record = conn
        .query_row(
            "SELECT period_id, filename, row_count, sha256, exported_at
             FROM exports WHERE period_id = ?1",
            params![period_id],
            |row| {
                let exported_at: String = row.get(4)?;
                Ok(ExportRecord {
                    period_id: row.get(0)?,
                    filename: row.get(1)?,
                    row_count: row.get(2)?,
                    sha256: row.get(3)?,
                    exported_at: DateTime::parse_from_rfc3339(&exported_at)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                4,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?
                        .with_timezone(&Utc),
                })
            },
        )
        .optional()?;
    Ok(record)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
