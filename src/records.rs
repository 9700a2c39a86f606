// 📋 Record Types - Typed line items for both record families
// Replaces the loose field-name-to-string maps of the source exports with
// explicit structs; anything legitimately absent from a batch is an Option.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// RECORD FAMILY
// ============================================================================

/// RecordFamily - which source export a line item came from.
/// The family decides the classification rule and proc-code strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFamily {
    SalesOrder,
    Invoice,
}

impl RecordFamily {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            RecordFamily::SalesOrder => "Sales Order",
            RecordFamily::Invoice => "Invoice",
        }
    }

    /// Column label for the family's document identifier
    pub fn document_label(&self) -> &str {
        match self {
            RecordFamily::SalesOrder => "Sales Order Number",
            RecordFamily::Invoice => "Invoice Number",
        }
    }
}

// ============================================================================
// PAYER INFORMATION
// ============================================================================

/// Payer-level input to classification, one variant per family.
///
/// Sales orders expose three per-level boolean flags; invoices expose a
/// single payer-level label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayerInfo {
    Flags {
        primary: bool,
        secondary: bool,
        tertiary: bool,
    },
    Level(Option<String>),
}

// ============================================================================
// RAW FAMILY RECORDS
// ============================================================================

/// One sales-order line item as read from a source batch.
/// All fields raw text; cleaning happens in the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesOrderRecord {
    pub order_number: Option<String>,
    pub date_created: Option<String>,
    pub branch: Option<String>,
    pub status: Option<String>,
    pub discount_pct: Option<String>,
    pub patient_key: Option<String>,
    pub item_id: Option<String>,
    pub item_name: Option<String>,
    pub proc_code: Option<String>,
    pub qty: Option<String>,
    pub charge: Option<String>,
    pub allow: Option<String>,
    pub sale_type: Option<String>,
    pub item_group: Option<String>,
    pub flag_primary: Option<String>,
    pub flag_secondary: Option<String>,
    pub flag_tertiary: Option<String>,
}

/// One invoice line item as read from a source batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_number: Option<String>,
    pub so_number: Option<String>,
    pub date_created: Option<String>,
    pub date_of_service: Option<String>,
    pub branch: Option<String>,
    pub payor_level: Option<String>,
    pub payor_name: Option<String>,
    pub patient_id: Option<String>,
    pub item_id: Option<String>,
    pub item_name: Option<String>,
    pub billing_period: Option<String>,
    pub payments: Option<String>,
    pub balance: Option<String>,
    pub qty: Option<String>,
    pub proc_code: Option<String>,
    pub item_group: Option<String>,
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// NormalizedRecord - typed output of the field normalizer.
///
/// Created once per raw line item and never mutated; every field is a pure
/// function of the raw record and the injected lookup tables.
///
/// `paid` is the allowed amount for sales orders and the payment amount for
/// invoices; `charge_net`/`paid_net` carry the discount-adjusted values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub family: RecordFamily,
    /// Source period label (e.g. "2021")
    pub period: String,
    /// Order or invoice number; empty string when the column is absent
    pub document_number: String,
    /// Branch label, "Unknown" when missing - never null
    pub branch: String,
    /// Patient identifier, for unique-patient counts
    pub patient: Option<String>,
    /// Canonical date, or None for unparseable input
    pub date: Option<NaiveDate>,
    /// Canonical 5-character proc code, sentinel, or uppercased original
    pub proc_code: String,
    pub charge: f64,
    pub paid: f64,
    pub balance: f64,
    /// Discount fraction in [0, 1]
    pub discount: f64,
    pub charge_net: f64,
    pub paid_net: f64,
    pub qty: f64,
    /// 1-based billing period number; 1 when absent
    pub billing_period: u32,
    pub payer: PayerInfo,
}

impl NormalizedRecord {
    /// Gross billed amount: payments plus the absolute outstanding balance.
    /// Counts credits/overpayments as billed activity.
    pub fn gross_billed(&self) -> f64 {
        self.paid + self.balance.abs()
    }

    /// Net billed amount: payments plus only the positive balance.
    /// Excludes the effect of credits/overpayments from the denominator.
    pub fn net_billed(&self) -> f64 {
        self.paid + self.balance.max(0.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_balance(paid: f64, balance: f64) -> NormalizedRecord {
        NormalizedRecord {
            family: RecordFamily::Invoice,
            period: "2021".to_string(),
            document_number: "INV-1".to_string(),
            branch: "Dallas".to_string(),
            patient: None,
            date: None,
            proc_code: "E0601".to_string(),
            charge: 0.0,
            paid,
            balance,
            discount: 0.0,
            charge_net: 0.0,
            paid_net: paid,
            qty: 1.0,
            billing_period: 1,
            payer: PayerInfo::Level(Some("Patient".to_string())),
        }
    }

    #[test]
    fn test_family_labels() {
        assert_eq!(RecordFamily::SalesOrder.name(), "Sales Order");
        assert_eq!(RecordFamily::Invoice.document_label(), "Invoice Number");
    }

    #[test]
    fn test_gross_billed_uses_absolute_balance() {
        let rec = record_with_balance(100.0, -40.0);
        assert_eq!(rec.gross_billed(), 140.0);
    }

    #[test]
    fn test_net_billed_ignores_credit_balances() {
        let rec = record_with_balance(100.0, -40.0);
        assert_eq!(rec.net_billed(), 100.0);

        let rec = record_with_balance(100.0, 40.0);
        assert_eq!(rec.net_billed(), 140.0);
    }
}
