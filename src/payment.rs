// 💵 Payment Recorder - one payment per collectible, at most once
//
// The balance change, the payment details and the printed flag are written
// by one conditional UPDATE inside an IMMEDIATE transaction. The receipt is
// built from the row read back inside that transaction, and printing only
// happens after the commit.

use crate::db::{self, Event, Payment, PaymentType};
use crate::error::{LedgerError, Result};
use crate::receipt::{PrinterConnection, Receipt, ReceiptPrinter};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{info, warn};

/// Check the preconditions of a payment before any storage access
pub fn validate_payment(payment: &Payment) -> Result<()> {
    match payment.payment_type {
        PaymentType::Unset => {
            return Err(LedgerError::InvalidPayment(
                "payment type must be Cash or Cheque".to_string(),
            ))
        }
        PaymentType::Cheque if payment.cheque_number.trim().is_empty() => {
            return Err(LedgerError::InvalidPayment(
                "cheque number is required for cheque payments".to_string(),
            ))
        }
        _ => {}
    }

    if !payment.amount_paid.is_finite() || payment.amount_paid <= 0.0 {
        return Err(LedgerError::InvalidPayment(format!(
            "amount paid must be greater than zero, got {}",
            payment.amount_paid
        )));
    }

    if payment.creditors_name.trim().is_empty() {
        return Err(LedgerError::InvalidPayment(
            "collecting agent name is required".to_string(),
        ));
    }

    Ok(())
}

/// Apply `payment` to one collectible and mark it printed.
///
/// Fails with `NotFound` for an unknown period or account, `AlreadyExported`
/// when the period is sealed and `AlreadyProcessed` when the account has
/// already been settled. Nothing is written in any failure case.
pub fn record_payment(
    conn: &mut Connection,
    period_id: i64,
    account_number: i64,
    payment: &Payment,
) -> Result<Receipt> {
    validate_payment(payment)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let period = db::get_period(&tx, period_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("period {}", period_id)))?;
    if period.is_exported {
        return Err(LedgerError::AlreadyExported(period_id));
    }

    let before = db::get_collectible(&tx, period_id, account_number)?.ok_or_else(|| {
        LedgerError::NotFound(format!("account {} in period {}", account_number, period_id))
    })?;
    if before.is_printed {
        return Err(LedgerError::AlreadyProcessed {
            period_id,
            account_number,
        });
    }

    let changed = db::update_collectible_payment(&tx, period_id, account_number, payment)?;
    if changed != 1 {
        return Err(LedgerError::AlreadyProcessed {
            period_id,
            account_number,
        });
    }

    let after = db::get_collectible(&tx, period_id, account_number)?.ok_or_else(|| {
        LedgerError::NotFound(format!("account {} in period {}", account_number, period_id))
    })?;

    db::insert_event(
        &tx,
        &Event::new(
            "payment_recorded",
            "collectible",
            &format!("{}:{}", period_id, account_number),
            serde_json::json!({
                "payment_type": payment.payment_type.as_str(),
                "cheque_number": payment.cheque_number,
                "amount_paid": payment.amount_paid,
                "previous_balance": before.remaining_balance,
                "new_balance": after.remaining_balance,
            }),
            &payment.creditors_name,
        ),
    )?;

    tx.commit()?;
    info!(
        period_id,
        account_number,
        amount_paid = payment.amount_paid,
        new_balance = after.remaining_balance,
        "payment recorded"
    );

    Ok(Receipt::from_settled(&before, &after))
}

// ============================================================================
// SETTLEMENT (write, then print)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PrintOutcome {
    Printed,
    /// No printer connected; the receipt can be reprinted later
    PrinterDisconnected,
    /// The printer reported an error; the payment stays committed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub receipt: Receipt,
    pub print: PrintOutcome,
}

/// Record a payment, then print its receipt if a printer is connected.
///
/// The committed payment is the source of truth: a disconnected or failing
/// printer is reported in `Settlement::print` and never undoes the write.
pub fn settle_and_print(
    conn: &mut Connection,
    period_id: i64,
    account_number: i64,
    payment: &Payment,
    printer: &mut dyn ReceiptPrinter,
    connection: &dyn PrinterConnection,
) -> Result<Settlement> {
    let receipt = record_payment(conn, period_id, account_number, payment)?;

    let print = if !connection.is_connected() {
        warn!(period_id, account_number, "no printer connected, receipt not printed");
        PrintOutcome::PrinterDisconnected
    } else {
        match printer.print_receipt(&receipt) {
            Ok(()) => PrintOutcome::Printed,
            Err(e) => {
                warn!(period_id, account_number, error = %e, "receipt printing failed");
                PrintOutcome::Failed(e.to_string())
            }
        }
    };

    Ok(Settlement { receipt, print })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Collectible;
    use crate::receipt::StaticConnection;
    use chrono::NaiveDate;

    struct FailingPrinter;

    impl ReceiptPrinter for FailingPrinter {
        fn print_receipt(&mut self, _receipt: &Receipt) -> Result<()> {
            Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "printer went away",
            )))
        }
    }

    #[derive(Default)]
    struct RecordingPrinter {
        printed: Vec<Receipt>,
    }

    impl ReceiptPrinter for RecordingPrinter {
        fn print_receipt(&mut self, receipt: &Receipt) -> Result<()> {
            self.printed.push(receipt.clone());
            Ok(())
        }
    }

    fn setup_with_account(balance: f64) -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let period_id =
            db::create_period(&conn, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap();
        db::insert_collectible(
            &conn,
            &Collectible {
                account_number: 1001,
                name: "Ana Cruz".to_string(),
                remaining_balance: balance,
                due_date: "2024-06-01".to_string(),
                payment_type: PaymentType::Unset,
                cheque_number: "0".to_string(),
                amount_paid: 0.0,
                daily_due: 150.0,
                creditors_name: "Unassigned".to_string(),
                is_printed: false,
                period_id,
            },
        )
        .unwrap();
        (conn, period_id)
    }

    fn cash(amount: f64) -> Payment {
        Payment {
            payment_type: PaymentType::Cash,
            cheque_number: String::new(),
            amount_paid: amount,
            creditors_name: "Maria".to_string(),
        }
    }

    #[test]
    fn test_balance_arithmetic_and_printed_flag() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        let receipt = record_payment(&mut conn, period_id, 1001, &cash(1520.0)).unwrap();

        assert_eq!(receipt.previous_balance, 5000.0);
        assert_eq!(receipt.new_balance, 3480.0);
        assert_eq!(receipt.amount_in_words, "One Thousand Five Hundred Twenty");

        let row = db::get_collectible(&conn, period_id, 1001).unwrap().unwrap();
        assert_eq!(row.remaining_balance, 3480.0);
        assert!(row.is_printed);

        let events = db::events_for_entity(&conn, "collectible", &format!("{}:1001", period_id))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "Maria");
    }

    #[test]
    fn test_second_payment_is_rejected() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        record_payment(&mut conn, period_id, 1001, &cash(1000.0)).unwrap();

        let err = record_payment(&mut conn, period_id, 1001, &cash(1000.0)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyProcessed { account_number: 1001, .. }));

        let row = db::get_collectible(&conn, period_id, 1001).unwrap().unwrap();
        assert_eq!(row.remaining_balance, 4000.0, "balance must only move once");
    }

    #[test]
    fn test_payment_on_sealed_period_is_rejected() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        db::mark_period_exported(&conn, period_id).unwrap();

        let err = record_payment(&mut conn, period_id, 1001, &cash(100.0)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExported(_)));
    }

    #[test]
    fn test_unknown_account_or_period() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        assert!(matches!(
            record_payment(&mut conn, period_id, 9999, &cash(1.0)).unwrap_err(),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            record_payment(&mut conn, period_id + 1, 1001, &cash(1.0)).unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[test]
    fn test_preconditions() {
        let mut cheque = cash(100.0);
        cheque.payment_type = PaymentType::Cheque;
        assert!(matches!(
            validate_payment(&cheque).unwrap_err(),
            LedgerError::InvalidPayment(_)
        ));
        cheque.cheque_number = "CHK-1".to_string();
        assert!(validate_payment(&cheque).is_ok());

        let mut unset = cash(100.0);
        unset.payment_type = PaymentType::Unset;
        assert!(validate_payment(&unset).is_err());
        assert!(validate_payment(&cash(0.0)).is_err());
        assert!(validate_payment(&cash(f64::NAN)).is_err());

        let mut anonymous = cash(100.0);
        anonymous.creditors_name = "  ".to_string();
        assert!(validate_payment(&anonymous).is_err());
    }

    #[test]
    fn test_failed_print_keeps_payment() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        let settlement = settle_and_print(
            &mut conn,
            period_id,
            1001,
            &cash(500.0),
            &mut FailingPrinter,
            &StaticConnection(true),
        )
        .unwrap();

        assert!(matches!(settlement.print, PrintOutcome::Failed(_)));
        let row = db::get_collectible(&conn, period_id, 1001).unwrap().unwrap();
        assert!(row.is_printed);
        assert_eq!(row.remaining_balance, 4500.0);
    }

    #[test]
    fn test_disconnected_printer_skips_print_not_write() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        let mut printer = RecordingPrinter::default();
        let settlement = settle_and_print(
            &mut conn,
            period_id,
            1001,
            &cash(500.0),
            &mut printer,
            &StaticConnection(false),
        )
        .unwrap();

        assert_eq!(settlement.print, PrintOutcome::PrinterDisconnected);
        assert!(printer.printed.is_empty());
        assert!(db::unprinted_accounts(&conn, period_id).unwrap().is_empty());
    }

    #[test]
    fn test_printer_receives_committed_receipt() {
        let (mut conn, period_id) = setup_with_account(5000.0);
        let mut printer = RecordingPrinter::default();
        let settlement = settle_and_print(
            &mut conn,
            period_id,
            1001,
            &cash(500.0),
            &mut printer,
            &StaticConnection(true),
        )
        .unwrap();

        assert_eq!(settlement.print, PrintOutcome::Printed);
        assert_eq!(printer.printed, vec![settlement.receipt]);
    }
}
