// 🗓️ Pending Actions - operations waiting on the collection-date picker
//
// The caller records which operation asked for a date, shows the picker,
// and once it resolves hands the chosen date back through `resolve`.

use crate::db::{self, Collectible, Period};
use crate::error::{LedgerError, Result};
use crate::import::{self, ImportSource, ImportSummary};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Import a new batch of collectibles for the chosen date
    ImportBatch,
    /// Open the worklist of the period collected on the chosen date
    StartCollection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// Date picker dismissed; nothing ran
    Dismissed,
    Imported(ImportSummary),
    /// File picker cancelled; the store is untouched
    ImportCancelled,
    CollectionStarted {
        period: Period,
        pending: Vec<Collectible>,
    },
}

impl PendingAction {
    /// Run the action with the date the picker produced (`None` when the
    /// picker was dismissed).
    pub fn resolve(
        self,
        picked: Option<NaiveDate>,
        conn: &mut Connection,
        source: &mut dyn ImportSource,
    ) -> Result<ActionResult> {
        let date = match picked {
            Some(date) => date,
            None => return Ok(ActionResult::Dismissed),
        };

        match self {
            PendingAction::ImportBatch => Ok(match import::import_from_source(conn, date, source)? {
                Some(summary) => ActionResult::Imported(summary),
                None => ActionResult::ImportCancelled,
            }),
            PendingAction::StartCollection => {
                let period = db::find_period_by_date(conn, date)?.ok_or_else(|| {
                    LedgerError::NotFound(format!("collection period for {}", date))
                })?;
                if period.is_exported {
                    return Err(LedgerError::AlreadyExported(period.period_id));
                }
                let pending = db::pending_collectibles(conn, period.period_id)?;
                info!(period_id = period.period_id, pending = pending.len(), "collection started");
                Ok(ActionResult::CollectionStarted { period, pending })
            }
        }
    }
}
