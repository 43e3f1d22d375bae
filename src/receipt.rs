// 🧾 Receipts - payload assembled from a committed payment, plus the
// print and printer-connection collaborators that consume it

use crate::db::{Collectible, PaymentType};
use crate::error::Result;
use crate::numerals::amount_in_words;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Everything a printed collection receipt shows.
///
/// Only built from a collectible that was read back after the payment
/// transaction committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub period_id: i64,
    pub account_number: i64,
    pub name: String,
    /// Balance before this payment
    pub previous_balance: f64,
    /// Balance after this payment
    pub new_balance: f64,
    pub payment_type: PaymentType,
    pub cheque_number: String,
    pub amount_paid: f64,
    /// `amount_paid` in words, cents truncated
    pub amount_in_words: String,
    pub daily_due: f64,
    /// Agent who collected the payment
    pub collected_by: String,
}

impl Receipt {
    pub fn from_settled(before: &Collectible, after: &Collectible) -> Self {
        Receipt {
            period_id: after.period_id,
            account_number: after.account_number,
            name: after.name.clone(),
            previous_balance: before.remaining_balance,
            new_balance: after.remaining_balance,
            payment_type: after.payment_type,
            cheque_number: after.cheque_number.clone(),
            amount_paid: after.amount_paid,
            amount_in_words: amount_in_words(after.amount_paid).unwrap_or_default(),
            daily_due: after.daily_due,
            collected_by: after.creditors_name.clone(),
        }
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Device that turns a receipt into paper (or any other durable output)
pub trait ReceiptPrinter {
    fn print_receipt(&mut self, receipt: &Receipt) -> Result<()>;
}

/// Reports whether a printer is currently reachable.
///
/// Only the print step consults this; the payment write never depends on it.
pub trait PrinterConnection {
    fn is_connected(&self) -> bool;
}

/// Fixed connection state, for callers that already know it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticConnection(pub bool);

impl PrinterConnection for StaticConnection {
    fn is_connected(&self) -> bool {
        self.0
    }
}

// ============================================================================
// PLAIN-TEXT RECEIPT
// ============================================================================

const RECEIPT_WIDTH: usize = 32;
const LABEL_WIDTH: usize = 15;

/// Renders receipts as fixed-width text lines into any writer
pub struct TextReceiptPrinter<W: Write> {
    writer: W,
    header: Vec<String>,
}

impl<W: Write> TextReceiptPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header: vec!["EXTRA CASH".to_string(), "LENDING CORPORATION".to_string()],
        }
    }

    /// Replace the company lines printed above the receipt title
    pub fn with_header(mut self, header: Vec<String>) -> Self {
        self.header = header;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn column(&mut self, label: &str, value: &str) -> Result<()> {
        let value_width = RECEIPT_WIDTH - LABEL_WIDTH;
        writeln!(
            self.writer,
            "{:<label_w$}{:>value_w$}",
            label,
            value,
            label_w = LABEL_WIDTH,
            value_w = value_width
        )?;
        Ok(())
    }
}

impl<W: Write> ReceiptPrinter for TextReceiptPrinter<W> {
    fn print_receipt(&mut self, receipt: &Receipt) -> Result<()> {
        let rule = "-".repeat(RECEIPT_WIDTH);

        for line in &self.header {
            writeln!(self.writer, "{:^width$}", line, width = RECEIPT_WIDTH)?;
        }
        writeln!(self.writer, "{}", rule)?;
        writeln!(self.writer, "{:^width$}", "COLLECTION RECEIPT", width = RECEIPT_WIDTH)?;
        writeln!(self.writer, "{}", rule)?;
        writeln!(self.writer)?;

        self.column("Account Number", &receipt.account_number.to_string())?;
        self.column("Name", &receipt.name)?;
        self.column("Balance", &format!("{:.2}", receipt.previous_balance))?;
        self.column("Payment Type", receipt.payment_type.as_str())?;
        if receipt.payment_type == PaymentType::Cheque {
            self.column("Cheque Number", &receipt.cheque_number)?;
        }
        self.column("Amount Paid", &format!("{:.2}", receipt.amount_paid))?;
        writeln!(self.writer, "{}", receipt.amount_in_words)?;
        self.column("New Balance", &format!("{:.2}", receipt.new_balance))?;
        self.column("Collected By", &receipt.collected_by)?;

        writeln!(self.writer)?;
        writeln!(self.writer, "Signature: .....................")?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_receipt(payment_type: PaymentType) -> Receipt {
        Receipt {
            period_id: 1,
            account_number: 1001,
            name: "Ana Cruz".to_string(),
            previous_balance: 5000.0,
            new_balance: 3480.0,
            payment_type,
            cheque_number: "CHK-889".to_string(),
            amount_paid: 1520.0,
            amount_in_words: "One Thousand Five Hundred Twenty".to_string(),
            daily_due: 150.0,
            collected_by: "Maria".to_string(),
        }
    }

    #[test]
    fn test_text_receipt_layout() {
        let mut printer = TextReceiptPrinter::new(Vec::new());
        printer.print_receipt(&sample_receipt(PaymentType::Cash)).unwrap();
        let text = String::from_utf8(printer.into_inner()).unwrap();

        assert!(text.contains("COLLECTION RECEIPT"));
        assert!(text.contains("EXTRA CASH"));
        assert!(text.contains("One Thousand Five Hundred Twenty"));
        assert!(text.contains("3480.00"));
        assert!(!text.contains("Cheque Number"));

        let account_line = text
            .lines()
            .find(|l| l.starts_with("Account Number"))
            .unwrap();
        assert_eq!(account_line.len(), RECEIPT_WIDTH);
        assert!(account_line.ends_with("1001"));
    }

    #[test]
    fn test_cheque_number_only_for_cheques() {
        let mut printer =
            TextReceiptPrinter::new(Vec::new()).with_header(vec!["ACME LENDING".to_string()]);
        printer.print_receipt(&sample_receipt(PaymentType::Cheque)).unwrap();
        let text = String::from_utf8(printer.into_inner()).unwrap();

        assert!(text.contains("ACME LENDING"));
        assert!(text.contains("Cheque Number"));
        assert!(text.contains("CHK-889"));
    }
}
