// 📤 Export Gate - CSV snapshot of a fully settled period, then seal it
//
// OPEN (is_exported = 0) ──[every collectible printed]──▶ EXPORTED (terminal)
//
// Eligibility checks, the sink call and the seal all happen while one
// IMMEDIATE transaction is held, so no payment can slip in between the check
// and the snapshot. A cancelled or failed save rolls back with no state
// change. The only unguarded window is a crash after the sink saved the file
// but before COMMIT: the file exists while the period is still open. An
// operator removes the stale file by hand and exports again, since the sink
// never overwrites.

use crate::config::{CsvQuoting, ExportConfig, RetentionPolicy};
use crate::credentials;
use crate::db::{self, Collectible, Event, ExportRecord, Period};
use crate::error::{LedgerError, Result};
use crate::import::REQUIRED_HEADERS;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const CSV_MIME: &str = "text/csv";

// ============================================================================
// FILE SINK (save + share collaborator)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Saved,
    /// The user dismissed the save dialog
    Cancelled,
}

/// Persists (and shares) the exported bytes. All or nothing: either the file
/// is saved, or the sink reports cancellation or an error.
pub trait FileSink {
    fn save(&mut self, bytes: &[u8], filename: &str, mime_type: &str) -> Result<SinkOutcome>;
}

/// Writes exports into a directory via a temporary file and a rename
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl FileSink for DirectorySink {
    fn save(&mut self, bytes: &[u8], filename: &str, _mime_type: &str) -> Result<SinkOutcome> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(filename);
        if target.exists() {
            return Err(LedgerError::Sink(format!(
                "{} already exists, refusing to overwrite",
                target.display()
            )));
        }
        let tmp = tmp_path(&target);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &target)?;

        info!(path = %target.display(), bytes = bytes.len(), "export file written");
        Ok(SinkOutcome::Saved)
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub quoting: CsvQuoting,
    pub retention: RetentionPolicy,
    /// Leading part of the export filename (consultant name)
    pub filename_prefix: String,
}

impl ExportOptions {
    /// Options from config, naming the file after the consultant profile
    /// when one exists
    pub fn resolve(conn: &Connection, config: &ExportConfig) -> Result<Self> {
        let prefix = match credentials::consultant_profile(conn)? {
            Some(profile) => profile.name,
            None => config.default_prefix.clone(),
        };
        Ok(Self {
            quoting: config.quoting,
            retention: config.retention,
            filename_prefix: prefix,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Exported(ExportRecord),
    /// Sink cancelled; the period is still open and can be exported again
    Cancelled,
}

// ============================================================================
// CSV SNAPSHOT
// ============================================================================

/// `<prefix>_<M-D-YYYY>_p<period_id>.csv`, with path separators replaced
pub fn export_filename(prefix: &str, period_id: i64, on: NaiveDate) -> String {
    format!("{}_{}_p{}.csv", prefix, on.format("%-m-%-d-%Y"), period_id)
        .replace(['/', '\\'], "-")
}

/// Amounts are written with two decimals
fn money(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Serialize collectibles with the fixed export column order.
pub fn render_csv(collectibles: &[Collectible], quoting: CsvQuoting) -> Result<Vec<u8>> {
    let style = match quoting {
        CsvQuoting::Legacy => csv::QuoteStyle::Never,
        CsvQuoting::Quoted => csv::QuoteStyle::Necessary,
    };
    let mut writer = csv::WriterBuilder::new()
        .quote_style(style)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(REQUIRED_HEADERS)?;
    for c in collectibles {
        writer.write_record([
            c.account_number.to_string(),
            c.name.clone(),
            money(c.remaining_balance),
            c.due_date.clone(),
            c.payment_type.as_str().to_string(),
            c.cheque_number.clone(),
            money(c.amount_paid),
            money(c.daily_due),
            c.creditors_name.clone(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| LedgerError::Io(e.into_error()))
}

// ============================================================================
// GATE
// ============================================================================

/// Guard of the OPEN → EXPORTED transition: the period exists, is open and
/// has no unprinted collectible.
pub fn check_exportable(conn: &Connection, period_id: i64) -> Result<Period> {
    let period = db::get_period(conn, period_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("period {}", period_id)))?;

    if period.is_exported {
        return Err(LedgerError::AlreadyExported(period_id));
    }

    let unprinted = db::unprinted_accounts(conn, period_id)?;
    if !unprinted.is_empty() {
        return Err(LedgerError::Incomplete {
            period_id,
            unprinted,
        });
    }

    Ok(period)
}

/// Export a settled period through `sink` and seal it.
pub fn export_period(
    conn: &mut Connection,
    period_id: i64,
    sink: &mut dyn FileSink,
    options: &ExportOptions,
) -> Result<ExportOutcome> {
    export_period_on(conn, period_id, sink, options, Utc::now().date_naive())
}

/// `export_period` with an explicit date for the filename
pub fn export_period_on(
    conn: &mut Connection,
    period_id: i64,
    sink: &mut dyn FileSink,
    options: &ExportOptions,
    today: NaiveDate,
) -> Result<ExportOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let period = match check_exportable(&tx, period_id) {
        Ok(period) => period,
        Err(e) => {
            warn!(period_id, error = %e, "export refused");
            return Err(e);
        }
    };

    let collectibles = db::collectibles_for_period(&tx, period_id)?;
    let bytes = render_csv(&collectibles, options.quoting)?;
    let filename = export_filename(&options.filename_prefix, period_id, today);

    match sink.save(&bytes, &filename, CSV_MIME) {
        Ok(SinkOutcome::Saved) => {}
        Ok(SinkOutcome::Cancelled) => {
            info!(period_id, "export cancelled, period left open");
            return Ok(ExportOutcome::Cancelled);
        }
        Err(e) => {
            warn!(period_id, error = %e, "export sink failed, period left open");
            return Err(LedgerError::Sink(e.to_string()));
        }
    }

    // ------------------------------------------------------------------------
    // Seal
    // ------------------------------------------------------------------------
    if db::mark_period_exported(&tx, period_id)? != 1 {
        return Err(LedgerError::AlreadyExported(period_id));
    }

    let record = ExportRecord {
        period_id,
        filename,
        row_count: collectibles.len() as i64,
        sha256: format!("{:x}", Sha256::digest(&bytes)),
        exported_at: Utc::now(),
    };
    db::insert_export_record(&tx, &record)?;

    let purged = match options.retention {
        RetentionPolicy::Keep => 0,
        RetentionPolicy::Purge => db::purge_collectibles(&tx, period_id)?,
    };

    db::insert_event(
        &tx,
        &Event::new(
            "period_exported",
            "period",
            &period_id.to_string(),
            serde_json::json!({
                "date": period.date.to_string(),
                "filename": record.filename,
                "rows": record.row_count,
                "sha256": record.sha256,
                "purged": purged,
            }),
            "exporter",
        ),
    )?;

    if let Err(e) = tx.commit() {
        error!(
            period_id,
            filename = %record.filename,
            error = %e,
            "export file saved but period not sealed; manual reconciliation required"
        );
        return Err(e.into());
    }

    info!(
        period_id,
        filename = %record.filename,
        rows = record.row_count,
        purged,
        "period exported"
    );
    Ok(ExportOutcome::Exported(record))
}
