// 🧹 Field Normalizer - Raw text → typed values
// Every cleaner resolves malformed input to a documented default.
// Nothing in this module returns an error or panics on bad data.

use chrono::{NaiveDate, NaiveDateTime};

use crate::proc_code::{ProcCodeOverride, ProcCodeStrategy};
use crate::records::{InvoiceRecord, NormalizedRecord, PayerInfo, RecordFamily, SalesOrderRecord};

/// Branch label used when the source field is missing or blank
pub const UNKNOWN_BRANCH: &str = "Unknown";

// ============================================================================
// FIELD CLEANERS
// ============================================================================

/// Clean a currency string to f64.
///
/// Handles: `$1,234.56`, `(100.00)` accounting negatives, empty strings,
/// missing values. Unparseable input yields 0.0.
pub fn clean_currency(value: Option<&str>) -> f64 {
    let raw = match value {
        Some(v) => v,
        None => return 0.0,
    };

    let mut s: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect::<String>()
        .trim()
        .to_string();

    if s.is_empty() {
        return 0.0;
    }

    // Accounting format negatives: (123.45) → -123.45
    if s.starts_with('(') && s.ends_with(')') {
        s = format!("-{}", &s[1..s.len() - 1]);
    }

    s.parse::<f64>().unwrap_or(0.0)
}

/// Convert a discount percentage to a decimal fraction.
///
/// Input: 100 = 100%, 10 = 10%, etc.
/// Output: 1.0, 0.1, etc. Missing or unparsable → 0.0.
///
/// Callers compute the discounted amount as `amount * (1 - fraction)`.
pub fn clean_discount_pct(value: Option<&str>) -> f64 {
    let raw = match value {
        Some(v) => v.trim(),
        None => return 0.0,
    };
    if raw.is_empty() {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(pct) => (pct / 100.0).clamp(0.0, 1.0),
        Err(_) => 0.0,
    }
}

/// Explicit date formats tried in order before the lenient fallbacks.
/// Matches the source systems: M/D/YYYY with optional time-of-day, and ISO.
const DATETIME_FORMATS: [&str; 3] = [
    "%m/%d/%Y %I:%M:%S %p", // 9/29/2020 3:06:15 AM
    "%m/%d/%Y %H:%M:%S",    // 9/29/2020 15:06:15
    "%Y-%m-%d %H:%M:%S",    // 2020-09-29 15:06:15
];

const DATE_FORMATS: [&str; 2] = [
    "%m/%d/%Y", // 9/29/2020
    "%Y-%m-%d", // 2020-09-29
];

/// Best-effort formats tried only after the explicit list is exhausted.
const FALLBACK_DATE_FORMATS: [&str; 4] = ["%m-%d-%Y", "%Y/%m/%d", "%m/%d/%y", "%d-%b-%Y"];

/// Parse a free-form date string.
///
/// Tries the explicit format list, then a lenient fallback list.
/// Unparseable input yields `None` - never an epoch or zero date.
pub fn clean_date(value: Option<&str>) -> Option<NaiveDate> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS.iter().chain(FALLBACK_DATE_FORMATS.iter()) {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }

    None
}

/// Clean a quantity field. Missing or non-numeric → 0.
pub fn clean_quantity(value: Option<&str>) -> f64 {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Clean a branch identifier. Missing or blank → "Unknown" (never null).
pub fn clean_branch(value: Option<&str>) -> String {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_BRANCH.to_string(),
    }
}

/// Parse a 1-based billing period number. Missing or unparsable → 1.
pub fn clean_billing_period(value: Option<&str>) -> u32 {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| {
            // Source exports sometimes carry the period as "3.0"
            v.parse::<u32>()
                .ok()
                .or_else(|| v.parse::<f64>().ok().map(|f| f as u32))
        })
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

/// Convert a raw flag value to boolean, treating missing/empty as false.
pub fn safe_bool(value: Option<&str>) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None => false,
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Normalizer - turns raw family records into NormalizedRecords.
///
/// The procedure-code strategy is constructor-injected and immutable for the
/// run. Proc-code overrides are collected for the audit output.
pub struct Normalizer {
    proc_codes: ProcCodeStrategy,
    audit: Vec<ProcCodeOverride>,
}

impl Normalizer {
    pub fn new(proc_codes: ProcCodeStrategy) -> Self {
        Normalizer {
            proc_codes,
            audit: Vec::new(),
        }
    }

    /// Proc-code overrides recorded so far (row, original, corrected, reason)
    pub fn audit(&self) -> &[ProcCodeOverride] {
        &self.audit
    }

    /// Consume the normalizer and return the full audit trail
    pub fn into_audit(self) -> Vec<ProcCodeOverride> {
        self.audit
    }

    /// Normalize a sales-order line item.
    ///
    /// Charge and allow carry the discount-adjusted amounts in
    /// `charge_net` / `paid_net`. Sales orders have no balance column.
    pub fn normalize_sales_order(
        &mut self,
        row: usize,
        period: &str,
        rec: &SalesOrderRecord,
    ) -> NormalizedRecord {
        let charge = clean_currency(rec.charge.as_deref());
        let paid = clean_currency(rec.allow.as_deref());
        let discount = clean_discount_pct(rec.discount_pct.as_deref());

        let (proc_code, over) = self.proc_codes.clean(row, rec.proc_code.as_deref());
        if let Some(o) = over {
            self.audit.push(o);
        }

        NormalizedRecord {
            family: RecordFamily::SalesOrder,
            period: period.to_string(),
            document_number: rec.order_number.clone().unwrap_or_default(),
            branch: clean_branch(rec.branch.as_deref()),
            patient: rec.patient_key.clone(),
            date: clean_date(rec.date_created.as_deref()),
            proc_code,
            charge,
            paid,
            balance: 0.0,
            discount,
            charge_net: charge * (1.0 - discount),
            paid_net: paid * (1.0 - discount),
            qty: clean_quantity(rec.qty.as_deref()),
            billing_period: 1,
            payer: PayerInfo::Flags {
                primary: safe_bool(rec.flag_primary.as_deref()),
                secondary: safe_bool(rec.flag_secondary.as_deref()),
                tertiary: safe_bool(rec.flag_tertiary.as_deref()),
            },
        }
    }

    /// Normalize an invoice line item.
    ///
    /// Invoices carry payments/balance instead of charge/allow and have no
    /// discount column, so net amounts equal the gross ones. Undated rows are
    /// kept and merely flagged by `date == None`.
    pub fn normalize_invoice(
        &mut self,
        row: usize,
        period: &str,
        rec: &InvoiceRecord,
    ) -> NormalizedRecord {
        let paid = clean_currency(rec.payments.as_deref());
        let balance = clean_currency(rec.balance.as_deref());

        let (proc_code, over) = self.proc_codes.clean(row, rec.proc_code.as_deref());
        if let Some(o) = over {
            self.audit.push(o);
        }

        NormalizedRecord {
            family: RecordFamily::Invoice,
            period: period.to_string(),
            document_number: rec.invoice_number.clone().unwrap_or_default(),
            branch: clean_branch(rec.branch.as_deref()),
            patient: rec.patient_id.clone(),
            date: clean_date(rec.date_of_service.as_deref())
                .or_else(|| clean_date(rec.date_created.as_deref())),
            proc_code,
            charge: 0.0,
            paid,
            balance,
            discount: 0.0,
            charge_net: 0.0,
            paid_net: paid,
            qty: clean_quantity(rec.qty.as_deref()),
            billing_period: clean_billing_period(rec.billing_period.as_deref()),
            payer: PayerInfo::Level(rec.payor_level.clone()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_currency_symbols_and_separators() {
        assert_eq!(clean_currency(Some("$1,234.56")), 1234.56);
        assert_eq!(clean_currency(Some("45.99")), 45.99);
        assert_eq!(clean_currency(Some(" $2,000 ")), 2000.0);
    }

    #[test]
    fn test_clean_currency_accounting_negative() {
        assert_eq!(clean_currency(Some("(100.00)")), -100.00);
        assert_eq!(clean_currency(Some("($1,500.25)")), -1500.25);
    }

    #[test]
    fn test_clean_currency_defaults() {
        assert_eq!(clean_currency(None), 0.0);
        assert_eq!(clean_currency(Some("")), 0.0);
        assert_eq!(clean_currency(Some("   ")), 0.0);
        assert_eq!(clean_currency(Some("abc")), 0.0);
    }

    #[test]
    fn test_clean_discount_pct() {
        assert_eq!(clean_discount_pct(Some("100")), 1.0);
        assert_eq!(clean_discount_pct(Some("10")), 0.1);
        assert_eq!(clean_discount_pct(None), 0.0);
        assert_eq!(clean_discount_pct(Some("abc")), 0.0);
    }

    #[test]
    fn test_clean_discount_pct_clamped_to_unit_interval() {
        assert_eq!(clean_discount_pct(Some("150")), 1.0);
        assert_eq!(clean_discount_pct(Some("-5")), 0.0);
    }

    #[test]
    fn test_clean_date_explicit_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 9, 29).unwrap();
        assert_eq!(clean_date(Some("9/29/2020 3:06:15 AM")), Some(expected));
        assert_eq!(clean_date(Some("9/29/2020 15:06:15")), Some(expected));
        assert_eq!(clean_date(Some("9/29/2020")), Some(expected));
        assert_eq!(clean_date(Some("2020-09-29 15:06:15")), Some(expected));
        assert_eq!(clean_date(Some("2020-09-29")), Some(expected));
    }

    #[test]
    fn test_clean_date_fallback_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        assert_eq!(clean_date(Some("03-05-2021")), Some(expected));
        assert_eq!(clean_date(Some("2021/03/05")), Some(expected));
    }

    #[test]
    fn test_clean_date_unparseable_is_none() {
        assert_eq!(clean_date(None), None);
        assert_eq!(clean_date(Some("")), None);
        assert_eq!(clean_date(Some("not a date")), None);
        assert_eq!(clean_date(Some("13/45/2020")), None);
    }

    #[test]
    fn test_clean_quantity() {
        assert_eq!(clean_quantity(Some("3")), 3.0);
        assert_eq!(clean_quantity(Some("2.5")), 2.5);
        assert_eq!(clean_quantity(None), 0.0);
        assert_eq!(clean_quantity(Some("n/a")), 0.0);
    }

    #[test]
    fn test_clean_branch_unknown_default() {
        assert_eq!(clean_branch(Some(" Dallas ")), "Dallas");
        assert_eq!(clean_branch(Some("")), UNKNOWN_BRANCH);
        assert_eq!(clean_branch(None), UNKNOWN_BRANCH);
    }

    #[test]
    fn test_clean_billing_period() {
        assert_eq!(clean_billing_period(Some("3")), 3);
        assert_eq!(clean_billing_period(Some("12.0")), 12);
        assert_eq!(clean_billing_period(Some("0")), 1);
        assert_eq!(clean_billing_period(None), 1);
        assert_eq!(clean_billing_period(Some("abc")), 1);
    }

    #[test]
    fn test_safe_bool() {
        assert!(safe_bool(Some("true")));
        assert!(safe_bool(Some(" TRUE ")));
        assert!(!safe_bool(Some("false")));
        assert!(!safe_bool(Some("")));
        assert!(!safe_bool(None));
    }
}
