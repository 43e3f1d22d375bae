// Collection Ledger - Core Library
// Period & ledger lifecycle engine for debt-collection rounds: import a dated
// batch, settle each account once, export and seal the period.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod numerals;
pub mod payment;
pub mod receipt;
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, CsvQuoting, ExportConfig, RetentionPolicy};
pub use credentials::{
    add_consultant, consultant_profile, seed_admin, verify_admin, verify_consultant,
    ConsultantProfile,
};
pub use db::{
    Collectible, Event, ExportRecord, Payment, PaymentType, Period,
    open_database, setup_database, create_period, insert_collectible,
    update_collectible_payment, delete_period, get_period, list_periods,
    find_period_by_date, latest_open_period, get_collectible, pending_collectibles,
    collectibles_for_period, collectibles_for_date, unprinted_accounts,
    events_for_entity,
};
pub use error::{FormatViolation, LedgerError, Result};
pub use export::{
    check_exportable, export_period, render_csv, DirectorySink, ExportOptions, ExportOutcome,
    FileSink, SinkOutcome,
};
pub use import::{
    discard_period, import_collectibles, import_from_source, parse_payload, parse_period_date,
    FileSource, ImportRow, ImportSource, ImportSummary, REQUIRED_HEADERS,
};
pub use numerals::{amount_in_words, number_to_words};
pub use payment::{record_payment, settle_and_print, PrintOutcome, Settlement};
pub use receipt::{PrinterConnection, Receipt, ReceiptPrinter, StaticConnection, TextReceiptPrinter};
pub use workflow::{ActionResult, PendingAction};
