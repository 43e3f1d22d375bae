//! End-to-end lifecycle of a collection period against an on-disk database:
//! import → settle every account → export → sealed.

use chrono::NaiveDate;
use collection_ledger::{
    collectibles_for_period, events_for_entity, export_period, get_period, import_collectibles,
    list_periods, open_database, record_payment, settle_and_print, CsvQuoting, DirectorySink,
    ExportOptions, ExportOutcome, LedgerError, Payment, PaymentType, PrintOutcome,
    RetentionPolicy, StaticConnection, TextReceiptPrinter,
};
use rusqlite::Connection;
use tempfile::TempDir;

const HEADER: &str = "account_number,name,remaining_balance,due_date,payment_type,cheque_number,amount_paid,daily_due,creditors_name";

fn may_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

fn batch(rows: &[&str]) -> String {
    let mut content = HEADER.to_string();
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content
}

fn three_accounts() -> String {
    batch(&[
        "1001,Ana Cruz,5000,2024-06-01,Cash,0,0,150,Unassigned",
        "1002,Ben Reyes,3200.50,2024-06-01,Cash,0,0,100,Unassigned",
        "1003,Carla Diaz,800,2024-06-15,Cash,0,0,50,Unassigned",
    ])
}

fn open(dir: &TempDir) -> Connection {
    open_database(&dir.path().join("ledger.db")).unwrap()
}

fn cash(amount: f64) -> Payment {
    Payment {
        payment_type: PaymentType::Cash,
        cheque_number: String::new(),
        amount_paid: amount,
        creditors_name: "Maria".to_string(),
    }
}

fn options() -> ExportOptions {
    ExportOptions {
        quoting: CsvQuoting::Quoted,
        retention: RetentionPolicy::Keep,
        filename_prefix: "Maria".to_string(),
    }
}

#[test]
fn test_full_period_lifecycle() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);

    let summary = import_collectibles(&mut conn, may_first(), &three_accounts()).unwrap();
    assert_eq!(summary.rows, 3);
    let pid = summary.period_id;

    record_payment(&mut conn, pid, 1001, &cash(150.0)).unwrap();
    record_payment(&mut conn, pid, 1002, &cash(100.0)).unwrap();

    let out_dir = dir.path().join("exports");
    let mut sink = DirectorySink::new(&out_dir);

    let err = export_period(&mut conn, pid, &mut sink, &options()).unwrap_err();
    match err {
        LedgerError::Incomplete { unprinted, .. } => assert_eq!(unprinted, vec![1003]),
        other => panic!("expected Incomplete, got {other:?}"),
    }
    assert!(!out_dir.exists() || out_dir.read_dir().unwrap().next().is_none());

    record_payment(&mut conn, pid, 1003, &cash(50.0)).unwrap();

    let record = match export_period(&mut conn, pid, &mut sink, &options()).unwrap() {
        ExportOutcome::Exported(record) => record,
        ExportOutcome::Cancelled => panic!("directory sink never cancels"),
    };
    assert_eq!(record.row_count, 3);
    assert!(record.filename.starts_with("Maria_"));

    let content = std::fs::read_to_string(sink.path_for(&record.filename)).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1].starts_with("1001,Ana Cruz,4850.00,"));

    assert!(get_period(&conn, pid).unwrap().unwrap().is_exported);

    // Sealed: no further payment, no second export
    assert!(matches!(
        record_payment(&mut conn, pid, 1001, &cash(10.0)),
        Err(LedgerError::AlreadyExported(_))
    ));
    assert!(matches!(
        export_period(&mut conn, pid, &mut sink, &options()),
        Err(LedgerError::AlreadyExported(_))
    ));

    let events = events_for_entity(&conn, "period", &pid.to_string()).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["period_imported", "period_exported"]);
}

#[test]
fn test_failed_import_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);

    let bad = batch(&[
        "1001,Ana Cruz,5000,2024-06-01,Cash,0,0,150,Unassigned",
        "1002,Ben Reyes,lots,2024-06-01,Cash,0,0,100,Unassigned",
    ]);
    assert!(matches!(
        import_collectibles(&mut conn, may_first(), &bad),
        Err(LedgerError::Format(_))
    ));

    // Same account twice in one batch fails at insert time
    let repeated = batch(&[
        "1001,Ana Cruz,5000,2024-06-01,Cash,0,0,150,Unassigned",
        "1001,Ana Cruz,5000,2024-06-01,Cash,0,0,150,Unassigned",
    ]);
    assert!(matches!(
        import_collectibles(&mut conn, may_first(), &repeated),
        Err(LedgerError::Duplicate { account_number: 1001, .. })
    ));

    assert!(list_periods(&conn).unwrap().is_empty());
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM collectibles", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn test_same_date_batches_cannot_share_accounts() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);

    import_collectibles(&mut conn, may_first(), &three_accounts()).unwrap();

    let overlap = batch(&[
        "2001,Dan Lim,900,2024-06-01,Cash,0,0,30,Unassigned",
        "1002,Ben Reyes,3200.50,2024-06-01,Cash,0,0,100,Unassigned",
    ]);
    assert!(matches!(
        import_collectibles(&mut conn, may_first(), &overlap),
        Err(LedgerError::Duplicate { account_number: 1002, .. })
    ));
    assert_eq!(list_periods(&conn).unwrap().len(), 1);

    // A different date is a different collection round
    let next_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let summary = import_collectibles(&mut conn, next_day, &overlap).unwrap();
    assert_eq!(summary.rows, 2);
}

#[test]
fn test_second_payment_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);
    let pid = import_collectibles(&mut conn, may_first(), &three_accounts())
        .unwrap()
        .period_id;

    let receipt = record_payment(&mut conn, pid, 1002, &cash(200.5)).unwrap();
    assert_eq!(receipt.new_balance, 3000.0);

    let err = record_payment(&mut conn, pid, 1002, &cash(200.5)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyProcessed { account_number: 1002, .. }));

    let rows = collectibles_for_period(&conn, pid).unwrap();
    let ben = rows.iter().find(|c| c.account_number == 1002).unwrap();
    assert_eq!(ben.remaining_balance, 3000.0);
}

#[test]
fn test_settle_prints_after_commit() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);
    let pid = import_collectibles(&mut conn, may_first(), &three_accounts())
        .unwrap()
        .period_id;

    let mut printer = TextReceiptPrinter::new(Vec::new());
    let cheque = Payment {
        payment_type: PaymentType::Cheque,
        cheque_number: "CHK-778".to_string(),
        amount_paid: 800.0,
        creditors_name: "Maria".to_string(),
    };
    let settlement =
        settle_and_print(&mut conn, pid, 1003, &cheque, &mut printer, &StaticConnection(true))
            .unwrap();
    assert_eq!(settlement.print, PrintOutcome::Printed);
    assert_eq!(settlement.receipt.new_balance, 0.0);

    let text = String::from_utf8(printer.into_inner()).unwrap();
    assert!(text.contains("CHK-778"));
    assert!(text.contains("Eight Hundred"));

    // Printer gone: the payment still sticks
    let mut idle = TextReceiptPrinter::new(Vec::new());
    let settlement =
        settle_and_print(&mut conn, pid, 1001, &cash(150.0), &mut idle, &StaticConnection(false))
            .unwrap();
    assert_eq!(settlement.print, PrintOutcome::PrinterDisconnected);
    assert!(idle.into_inner().is_empty());
    assert!(collectibles_for_period(&conn, pid)
        .unwrap()
        .iter()
        .any(|c| c.account_number == 1001 && c.is_printed));
}

#[test]
fn test_purge_retention_keeps_period_marker() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);
    let pid = import_collectibles(&mut conn, may_first(), &three_accounts())
        .unwrap()
        .period_id;
    for (account, amount) in [(1001, 150.0), (1002, 100.0), (1003, 50.0)] {
        record_payment(&mut conn, pid, account, &cash(amount)).unwrap();
    }

    let mut sink = DirectorySink::new(dir.path().join("exports"));
    let purge = ExportOptions {
        retention: RetentionPolicy::Purge,
        ..options()
    };
    let outcome = export_period(&mut conn, pid, &mut sink, &purge).unwrap();
    assert!(matches!(outcome, ExportOutcome::Exported(_)));

    assert!(collectibles_for_period(&conn, pid).unwrap().is_empty());
    assert!(get_period(&conn, pid).unwrap().unwrap().is_exported);
}

#[test]
fn test_same_day_exports_keep_separate_snapshots() {
    use collection_ledger::export::export_period_on;

    let dir = TempDir::new().unwrap();
    let mut conn = open(&dir);
    let first = import_collectibles(
        &mut conn,
        may_first(),
        &batch(&["1,Ana Cruz,200,2024-06-01,Cash,0,0,10,Unassigned"]),
    )
    .unwrap()
    .period_id;
    let second = import_collectibles(
        &mut conn,
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        &batch(&["2,Ben Reyes,200,2024-06-01,Cash,0,0,10,Unassigned"]),
    )
    .unwrap()
    .period_id;
    record_payment(&mut conn, first, 1, &cash(10.0)).unwrap();
    record_payment(&mut conn, second, 2, &cash(10.0)).unwrap();

    let mut sink = DirectorySink::new(dir.path().join("exports"));
    let export_day = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
    let mut records = Vec::new();
    for pid in [first, second] {
        match export_period_on(&mut conn, pid, &mut sink, &options(), export_day).unwrap() {
            ExportOutcome::Exported(record) => records.push(record),
            ExportOutcome::Cancelled => panic!("directory sink never cancels"),
        }
    }
    assert_ne!(records[0].filename, records[1].filename);

    let first_csv = std::fs::read_to_string(sink.path_for(&records[0].filename)).unwrap();
    let second_csv = std::fs::read_to_string(sink.path_for(&records[1].filename)).unwrap();
    assert!(first_csv.contains("1,Ana Cruz,190.00,"));
    assert!(!first_csv.contains("Ben Reyes"));
    assert!(second_csv.contains("2,Ben Reyes,190.00,"));
}
