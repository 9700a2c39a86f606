// 📊 Aggregator - Period, branch, and billing-period roll-ups
// Folds classified line items into the three output tables: period summary
// (plus a synthetic TOTAL row), branch breakdown, and billing-period
// bucket distribution. Every ratio guards the zero-denominator case.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::classify::ClassifiedRecord;
use crate::records::{NormalizedRecord, PayerInfo};

/// Period label of the synthetic roll-up row
pub const TOTAL_LABEL: &str = "TOTAL";

// ============================================================================
// COLLECTION-RATE POLICY
// ============================================================================

/// What a collection rate means when nothing was billed.
///
/// The two source report paths disagree: the summary path defaults
/// zero-billed populations to 100%, the benchmarking path refuses to call
/// them fully collected and reports N/A. Both are preserved as an explicit
/// choice - there is no hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroBilledPolicy {
    /// Zero billed → 100% (legacy summary-report behavior)
    ZeroAsFullyCollected,
    /// Zero billed → None / N/A (benchmarking behavior)
    ZeroAsUndefined,
}

impl ZeroBilledPolicy {
    /// Collection rate in percent, or None under `ZeroAsUndefined` when
    /// nothing was billed.
    pub fn rate(&self, payments: f64, billed: f64) -> Option<f64> {
        if billed > 0.0 {
            Some(payments / billed * 100.0)
        } else {
            match self {
                ZeroBilledPolicy::ZeroAsFullyCollected => Some(100.0),
                ZeroBilledPolicy::ZeroAsUndefined => None,
            }
        }
    }
}

/// Which billed-amount definition feeds the collection-rate denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BilledBasis {
    /// payments + |balance| - counts credits/overpayments as billed
    Gross,
    /// payments + max(balance, 0) - excludes credit balances
    Net,
}

impl BilledBasis {
    pub fn billed(&self, record: &NormalizedRecord) -> f64 {
        match self {
            BilledBasis::Gross => record.gross_billed(),
            BilledBasis::Net => record.net_billed(),
        }
    }
}

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// One summary row per source period, plus the TOTAL row.
///
/// "Allowed" columns carry the discount-adjusted paid amounts; for the
/// invoice family (no discount column) they equal the payment sums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    #[serde(rename = "Year")]
    pub period: String,
    #[serde(rename = "Total Line Items")]
    pub total_line_items: u64,
    #[serde(rename = "Unique Documents")]
    pub unique_documents: u64,
    #[serde(rename = "Unique Patients")]
    pub unique_patients: u64,
    #[serde(rename = "Retail Items")]
    pub retail_items: u64,
    #[serde(rename = "Insurance Items")]
    pub insurance_items: u64,
    #[serde(rename = "Unclassified Items")]
    pub unclassified_items: u64,
    #[serde(rename = "Retail %")]
    pub retail_pct: f64,
    #[serde(rename = "Insurance %")]
    pub insurance_pct: f64,
    #[serde(rename = "Primary Billing")]
    pub primary_billing: u64,
    #[serde(rename = "Secondary Billing")]
    pub secondary_billing: u64,
    #[serde(rename = "Tertiary Billing")]
    pub tertiary_billing: u64,
    #[serde(rename = "Multi-Payor Items")]
    pub multi_payer_items: u64,
    #[serde(rename = "Total Quantity")]
    pub total_qty: f64,
    #[serde(rename = "Gross Charges")]
    pub gross_charges: f64,
    #[serde(rename = "Gross Allowed")]
    pub gross_paid: f64,
    #[serde(rename = "Total Discount")]
    pub total_discount: f64,
    #[serde(rename = "Total Revenue")]
    pub net_charges: f64,
    #[serde(rename = "Total Allowed")]
    pub net_paid: f64,
    #[serde(rename = "Retail Allowed")]
    pub retail_net_paid: f64,
    #[serde(rename = "Insurance Allowed")]
    pub insurance_net_paid: f64,
    #[serde(rename = "Total Balance")]
    pub total_balance: f64,
    #[serde(rename = "Total Billed")]
    pub total_billed: f64,
    #[serde(rename = "Collection Rate %")]
    pub collection_rate: Option<f64>,
    #[serde(rename = "New Items (Period 1)")]
    pub new_items: u64,
    #[serde(rename = "Recurring Items (Period 2+)")]
    pub recurring_items: u64,
    #[serde(rename = "Recurring %")]
    pub recurring_pct: f64,
    #[serde(rename = "Avg Billing Period")]
    pub avg_billing_period: f64,
    #[serde(rename = "Max Billing Period")]
    pub max_billing_period: u32,
}

/// Branch breakdown row: same shape as the period summary, grouped by
/// branch within a period. Missing branches land in the "Unknown" bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSummary {
    #[serde(rename = "Year")]
    pub period: String,
    #[serde(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Total Items")]
    pub total_items: u64,
    #[serde(rename = "Retail Items")]
    pub retail_items: u64,
    #[serde(rename = "Insurance Items")]
    pub insurance_items: u64,
    #[serde(rename = "Retail %")]
    pub retail_pct: f64,
    #[serde(rename = "Insurance %")]
    pub insurance_pct: f64,
    #[serde(rename = "Unique Documents")]
    pub unique_documents: u64,
    #[serde(rename = "Total Payments")]
    pub payments: f64,
    #[serde(rename = "Total Allowed")]
    pub net_paid: f64,
    #[serde(rename = "Retail Allowed")]
    pub retail_net_paid: f64,
    #[serde(rename = "Insurance Allowed")]
    pub insurance_net_paid: f64,
    #[serde(rename = "Total Balance")]
    pub total_balance: f64,
    #[serde(rename = "Collection Rate %")]
    pub collection_rate: Option<f64>,
    #[serde(rename = "Recurring Items")]
    pub recurring_items: u64,
    #[serde(rename = "Recurring %")]
    pub recurring_pct: f64,
    #[serde(rename = "Avg Billing Period")]
    pub avg_billing_period: f64,
}

/// One row per billing-period bucket within a period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingBucketRow {
    #[serde(rename = "Year")]
    pub period: String,
    #[serde(rename = "Billing Period Bucket")]
    pub bucket: String,
    #[serde(rename = "Period Start")]
    pub period_start: u32,
    #[serde(rename = "Period End")]
    pub period_end: u32,
    #[serde(rename = "Item Count")]
    pub item_count: u64,
    #[serde(rename = "Item %")]
    pub item_pct: f64,
    #[serde(rename = "Total Payments")]
    pub payments: f64,
    #[serde(rename = "Payment %")]
    pub payment_pct: f64,
    #[serde(rename = "Retail Items")]
    pub retail_items: u64,
    #[serde(rename = "Insurance Items")]
    pub insurance_items: u64,
    #[serde(rename = "Avg Payment")]
    pub avg_payment: f64,
}

// ============================================================================
// BILLING-PERIOD BUCKETS
// ============================================================================

/// Fixed integer ranges for the rental billing-period distribution.
/// `end == None` means unbounded (Period 37+).
pub struct BillingBucket {
    pub start: u32,
    pub end: Option<u32>,
    pub label: &'static str,
}

impl BillingBucket {
    pub fn contains(&self, billing_period: u32) -> bool {
        billing_period >= self.start && self.end.map_or(true, |e| billing_period <= e)
    }

    /// Upper bound for report columns (999 stands in for unbounded)
    pub fn display_end(&self) -> u32 {
        self.end.unwrap_or(999)
    }
}

pub const BILLING_BUCKETS: [BillingBucket; 7] = [
    BillingBucket { start: 1, end: Some(1), label: "Period 1 (New)" },
    BillingBucket { start: 2, end: Some(3), label: "Period 2-3" },
    BillingBucket { start: 4, end: Some(6), label: "Period 4-6" },
    BillingBucket { start: 7, end: Some(12), label: "Period 7-12" },
    BillingBucket { start: 13, end: Some(24), label: "Period 13-24" },
    BillingBucket { start: 25, end: Some(36), label: "Period 25-36" },
    BillingBucket { start: 37, end: None, label: "Period 37+" },
];

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Round to 2 decimals for money/percent report columns
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn pct(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        round2(numerator / denominator * 100.0)
    } else {
        0.0
    }
}

/// Aggregator - folds classified records into the output tables.
///
/// The zero-billed policy and billed basis are explicit constructor
/// parameters so each call site names which variant it wants.
pub struct Aggregator {
    pub zero_billed: ZeroBilledPolicy,
    pub billed_basis: BilledBasis,
}

impl Aggregator {
    pub fn new(zero_billed: ZeroBilledPolicy, billed_basis: BilledBasis) -> Self {
        Aggregator {
            zero_billed,
            billed_basis,
        }
    }

    /// Summarize one period's records. Returns None for an empty batch.
    pub fn summarize_period(
        &self,
        period: &str,
        records: &[ClassifiedRecord],
    ) -> Option<PeriodSummary> {
        if records.is_empty() {
            return None;
        }
        let total = records.len() as u64;

        let mut documents: HashSet<&str> = HashSet::new();
        let mut patients: HashSet<&str> = HashSet::new();
        let mut retail_items = 0u64;
        let mut insurance_items = 0u64;
        let mut unclassified_items = 0u64;
        let mut primary = 0u64;
        let mut secondary = 0u64;
        let mut tertiary = 0u64;
        let mut multi_payer = 0u64;
        let mut new_items = 0u64;
        let mut recurring_items = 0u64;
        let mut total_qty = 0.0;
        let mut gross_charges = 0.0;
        let mut gross_paid = 0.0;
        let mut net_charges = 0.0;
        let mut net_paid = 0.0;
        let mut retail_net_paid = 0.0;
        let mut insurance_net_paid = 0.0;
        let mut total_balance = 0.0;
        let mut total_billed = 0.0;
        let mut payments = 0.0;
        let mut period_sum = 0u64;
        let mut period_max = 0u32;

        for rec in records {
            let r = &rec.record;
            if !r.document_number.is_empty() {
                documents.insert(r.document_number.as_str());
            }
            if let Some(p) = r.patient.as_deref() {
                patients.insert(p);
            }
            match rec.payer_class {
                crate::classify::PayerClass::Retail => {
                    retail_items += 1;
                    retail_net_paid += r.paid_net;
                }
                crate::classify::PayerClass::Insurance => {
                    insurance_items += 1;
                    insurance_net_paid += r.paid_net;
                }
                crate::classify::PayerClass::Unclassified => unclassified_items += 1,
            }
            match &r.payer {
                PayerInfo::Flags {
                    primary: p,
                    secondary: s,
                    tertiary: t,
                } => {
                    primary += *p as u64;
                    secondary += *s as u64;
                    tertiary += *t as u64;
                }
                PayerInfo::Level(label) => {
                    match label.as_deref().map(|l| l.trim().to_lowercase()).as_deref() {
                        Some("primary") => primary += 1,
                        Some("secondary") => secondary += 1,
                        Some("tertiary") => tertiary += 1,
                        _ => {}
                    }
                }
            }
            if rec.billing_level_count > 1 {
                multi_payer += 1;
            }
            if rec.is_recurring {
                recurring_items += 1;
            } else {
                new_items += 1;
            }
            total_qty += r.qty;
            gross_charges += r.charge;
            gross_paid += r.paid;
            net_charges += r.charge_net;
            net_paid += r.paid_net;
            total_balance += r.balance;
            total_billed += self.billed_basis.billed(r);
            payments += r.paid;
            period_sum += r.billing_period as u64;
            period_max = period_max.max(r.billing_period);
        }

        Some(PeriodSummary {
            period: period.to_string(),
            total_line_items: total,
            unique_documents: documents.len() as u64,
            unique_patients: patients.len() as u64,
            retail_items,
            insurance_items,
            unclassified_items,
            retail_pct: pct(retail_items as f64, total as f64),
            insurance_pct: pct(insurance_items as f64, total as f64),
            primary_billing: primary,
            secondary_billing: secondary,
            tertiary_billing: tertiary,
            multi_payer_items: multi_payer,
            total_qty: round2(total_qty),
            gross_charges: round2(gross_charges),
            gross_paid: round2(gross_paid),
            total_discount: round2(gross_paid - net_paid),
            net_charges: round2(net_charges),
            net_paid: round2(net_paid),
            retail_net_paid: round2(retail_net_paid),
            insurance_net_paid: round2(insurance_net_paid),
            total_balance: round2(total_balance),
            total_billed: round2(total_billed),
            collection_rate: self.zero_billed.rate(payments, total_billed).map(round2),
            new_items,
            recurring_items,
            recurring_pct: pct(recurring_items as f64, total as f64),
            avg_billing_period: round2(period_sum as f64 / total as f64),
            max_billing_period: period_max,
        })
    }

    /// Build the synthetic TOTAL row by summing the numeric columns across
    /// period rows and re-deriving every percentage and rate from the
    /// summed numerators/denominators. Percentages are never averaged.
    pub fn total_row(&self, rows: &[PeriodSummary]) -> PeriodSummary {
        let mut total = PeriodSummary {
            period: TOTAL_LABEL.to_string(),
            total_line_items: 0,
            unique_documents: 0,
            unique_patients: 0,
            retail_items: 0,
            insurance_items: 0,
            unclassified_items: 0,
            retail_pct: 0.0,
            insurance_pct: 0.0,
            primary_billing: 0,
            secondary_billing: 0,
            tertiary_billing: 0,
            multi_payer_items: 0,
            total_qty: 0.0,
            gross_charges: 0.0,
            gross_paid: 0.0,
            total_discount: 0.0,
            net_charges: 0.0,
            net_paid: 0.0,
            retail_net_paid: 0.0,
            insurance_net_paid: 0.0,
            total_balance: 0.0,
            total_billed: 0.0,
            collection_rate: None,
            new_items: 0,
            recurring_items: 0,
            recurring_pct: 0.0,
            avg_billing_period: 0.0,
            max_billing_period: 0,
        };

        for row in rows {
            total.total_line_items += row.total_line_items;
            total.unique_documents += row.unique_documents;
            total.unique_patients += row.unique_patients;
            total.retail_items += row.retail_items;
            total.insurance_items += row.insurance_items;
            total.unclassified_items += row.unclassified_items;
            total.primary_billing += row.primary_billing;
            total.secondary_billing += row.secondary_billing;
            total.tertiary_billing += row.tertiary_billing;
            total.multi_payer_items += row.multi_payer_items;
            total.total_qty += row.total_qty;
            total.gross_charges += row.gross_charges;
            total.gross_paid += row.gross_paid;
            total.total_discount += row.total_discount;
            total.net_charges += row.net_charges;
            total.net_paid += row.net_paid;
            total.retail_net_paid += row.retail_net_paid;
            total.insurance_net_paid += row.insurance_net_paid;
            total.total_balance += row.total_balance;
            total.total_billed += row.total_billed;
            total.new_items += row.new_items;
            total.recurring_items += row.recurring_items;
            total.avg_billing_period += row.avg_billing_period;
            total.max_billing_period = total.max_billing_period.max(row.max_billing_period);
        }

        total.retail_pct = pct(total.retail_items as f64, total.total_line_items as f64);
        total.insurance_pct = pct(total.insurance_items as f64, total.total_line_items as f64);
        total.recurring_pct = pct(total.recurring_items as f64, total.total_line_items as f64);
        total.collection_rate = self
            .zero_billed
            .rate(total.gross_paid, total.total_billed)
            .map(round2);
        // Average of per-period averages, matching the source reports
        if !rows.is_empty() {
            total.avg_billing_period = round2(total.avg_billing_period / rows.len() as f64);
        }
        total.total_qty = round2(total.total_qty);
        total.gross_charges = round2(total.gross_charges);
        total.gross_paid = round2(total.gross_paid);
        total.total_discount = round2(total.total_discount);
        total.net_charges = round2(total.net_charges);
        total.net_paid = round2(total.net_paid);
        total.retail_net_paid = round2(total.retail_net_paid);
        total.insurance_net_paid = round2(total.insurance_net_paid);
        total.total_balance = round2(total.total_balance);
        total.total_billed = round2(total.total_billed);

        total
    }

    /// Branch breakdown within one period. Records with a missing branch
    /// were normalized to "Unknown" and group there. Rows sorted by branch.
    pub fn summarize_branches(
        &self,
        period: &str,
        records: &[ClassifiedRecord],
    ) -> Vec<BranchSummary> {
        let mut by_branch: BTreeMap<&str, Vec<&ClassifiedRecord>> = BTreeMap::new();
        for rec in records {
            by_branch.entry(rec.record.branch.as_str()).or_default().push(rec);
        }

        let mut rows = Vec::with_capacity(by_branch.len());
        for (branch, group) in by_branch {
            let total = group.len() as u64;
            let mut documents: HashSet<&str> = HashSet::new();
            let mut retail_items = 0u64;
            let mut insurance_items = 0u64;
            let mut retail_net_paid = 0.0;
            let mut insurance_net_paid = 0.0;
            let mut payments = 0.0;
            let mut net_paid = 0.0;
            let mut total_balance = 0.0;
            let mut total_billed = 0.0;
            let mut recurring_items = 0u64;
            let mut period_sum = 0u64;

            for rec in &group {
                let r = &rec.record;
                if !r.document_number.is_empty() {
                    documents.insert(r.document_number.as_str());
                }
                if rec.is_retail() {
                    retail_items += 1;
                    retail_net_paid += r.paid_net;
                } else if rec.is_insurance() {
                    insurance_items += 1;
                    insurance_net_paid += r.paid_net;
                }
                if rec.is_recurring {
                    recurring_items += 1;
                }
                payments += r.paid;
                net_paid += r.paid_net;
                total_balance += r.balance;
                total_billed += self.billed_basis.billed(r);
                period_sum += r.billing_period as u64;
            }

            rows.push(BranchSummary {
                period: period.to_string(),
                branch: branch.to_string(),
                total_items: total,
                retail_items,
                insurance_items,
                retail_pct: pct(retail_items as f64, total as f64),
                insurance_pct: pct(insurance_items as f64, total as f64),
                unique_documents: documents.len() as u64,
                payments: round2(payments),
                net_paid: round2(net_paid),
                retail_net_paid: round2(retail_net_paid),
                insurance_net_paid: round2(insurance_net_paid),
                total_balance: round2(total_balance),
                collection_rate: self.zero_billed.rate(payments, total_billed).map(round2),
                recurring_items,
                recurring_pct: pct(recurring_items as f64, total as f64),
                avg_billing_period: round2(period_sum as f64 / total as f64),
            });
        }
        rows
    }

    /// Billing-period bucket distribution for one period's records.
    /// Empty buckets are omitted; item/payment shares sum to 100% across
    /// the emitted buckets (subject to rounding).
    pub fn billing_buckets(
        &self,
        period: &str,
        records: &[ClassifiedRecord],
    ) -> Vec<BillingBucketRow> {
        if records.is_empty() {
            return Vec::new();
        }
        let total_items = records.len() as f64;
        let total_payments: f64 = records.iter().map(|r| r.record.paid).sum();

        let mut rows = Vec::new();
        for bucket in &BILLING_BUCKETS {
            let members: Vec<&ClassifiedRecord> = records
                .iter()
                .filter(|r| bucket.contains(r.record.billing_period))
                .collect();
            if members.is_empty() {
                continue;
            }

            let count = members.len() as u64;
            let payments: f64 = members.iter().map(|r| r.record.paid).sum();
            let retail_items = members.iter().filter(|r| r.is_retail()).count() as u64;
            let insurance_items = members.iter().filter(|r| r.is_insurance()).count() as u64;

            rows.push(BillingBucketRow {
                period: period.to_string(),
                bucket: bucket.label.to_string(),
                period_start: bucket.start,
                period_end: bucket.display_end(),
                item_count: count,
                item_pct: pct(count as f64, total_items),
                payments: round2(payments),
                payment_pct: pct(payments, total_payments),
                retail_items,
                insurance_items,
                avg_payment: round2(payments / count as f64),
            });
        }
        rows
    }
}

// ============================================================================
// PASS-THROUGH OUTPUTS
// ============================================================================

/// One exported retail line item: a flat projection of the normalized
/// record, written as-is to the filtered retail export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailLineItemRow {
    #[serde(rename = "Year")]
    pub period: String,
    #[serde(rename = "Document Number")]
    pub document_number: String,
    #[serde(rename = "Date")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Patient")]
    pub patient: Option<String>,
    #[serde(rename = "Proc Code")]
    pub proc_code: String,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "Charge")]
    pub charge: f64,
    #[serde(rename = "Allowed")]
    pub paid: f64,
    #[serde(rename = "Balance")]
    pub balance: f64,
    #[serde(rename = "Discount")]
    pub discount: f64,
    #[serde(rename = "Net Charge")]
    pub charge_net: f64,
    #[serde(rename = "Net Allowed")]
    pub paid_net: f64,
    #[serde(rename = "Billing Period")]
    pub billing_period: u32,
}

impl RetailLineItemRow {
    fn from_record(r: &NormalizedRecord) -> Self {
        RetailLineItemRow {
            period: r.period.clone(),
            document_number: r.document_number.clone(),
            date: r.date,
            branch: r.branch.clone(),
            patient: r.patient.clone(),
            proc_code: r.proc_code.clone(),
            qty: r.qty,
            charge: r.charge,
            paid: r.paid,
            balance: r.balance,
            discount: r.discount,
            charge_net: r.charge_net,
            paid_net: r.paid_net,
            billing_period: r.billing_period,
        }
    }
}

/// Retail-only line items as flat export rows, in input order.
pub fn retail_line_items(records: &[ClassifiedRecord]) -> Vec<RetailLineItemRow> {
    records
        .iter()
        .filter(|r| r.is_retail())
        .map(|r| RetailLineItemRow::from_record(&r.record))
        .collect()
}

/// Sorted unique document numbers containing at least one retail item.
pub fn retail_document_numbers(records: &[ClassifiedRecord]) -> Vec<String> {
    let set: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.is_retail())
        .map(|r| r.record.document_number.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    set.into_iter().map(str::to_string).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::records::{NormalizedRecord, PayerInfo, RecordFamily};

    fn invoice_item(
        doc: &str,
        branch: &str,
        payor: &str,
        paid: f64,
        balance: f64,
        billing_period: u32,
    ) -> ClassifiedRecord {
        classify(NormalizedRecord {
            family: RecordFamily::Invoice,
            period: "2021".to_string(),
            document_number: doc.to_string(),
            branch: branch.to_string(),
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
            billing_period,
            payer: PayerInfo::Level(Some(payor.to_string())),
        })
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(ZeroBilledPolicy::ZeroAsUndefined, BilledBasis::Gross)
    }

    #[test]
    fn test_empty_batch_yields_no_summary() {
        assert!(aggregator().summarize_period("2021", &[]).is_none());
    }

    #[test]
    fn test_period_summary_counts_and_percentages() {
        let records = vec![
            invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("B", "Dallas", "Primary", 200.0, 50.0, 2),
            invoice_item("B", "Austin", "Secondary", 50.0, 0.0, 3),
            invoice_item("C", "Austin", "COD", 25.0, 0.0, 1),
        ];
        let summary = aggregator().summarize_period("2021", &records).unwrap();

        assert_eq!(summary.total_line_items, 4);
        assert_eq!(summary.unique_documents, 3);
        assert_eq!(summary.retail_items, 1);
        assert_eq!(summary.insurance_items, 2);
        assert_eq!(summary.unclassified_items, 1);
        assert_eq!(summary.retail_pct, 25.0);
        assert_eq!(summary.insurance_pct, 50.0);
        assert_eq!(summary.primary_billing, 1);
        assert_eq!(summary.secondary_billing, 1);
        assert_eq!(summary.new_items, 2);
        assert_eq!(summary.recurring_items, 2);
        assert_eq!(summary.max_billing_period, 3);
    }

    #[test]
    fn test_collection_rate_policies() {
        assert_eq!(
            ZeroBilledPolicy::ZeroAsFullyCollected.rate(0.0, 0.0),
            Some(100.0)
        );
        assert_eq!(ZeroBilledPolicy::ZeroAsUndefined.rate(0.0, 0.0), None);
        assert_eq!(ZeroBilledPolicy::ZeroAsUndefined.rate(50.0, 100.0), Some(50.0));
    }

    #[test]
    fn test_zero_billed_branch_rate_is_none_not_100() {
        let records = vec![invoice_item("A", "Dallas", "Patient", 0.0, 0.0, 1)];
        let summary = aggregator().summarize_period("2021", &records).unwrap();
        assert_eq!(summary.collection_rate, None);
    }

    #[test]
    fn test_total_row_sums_not_averages() {
        let agg = aggregator();
        let year1 = vec![
            invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("B", "Dallas", "Primary", 100.0, 0.0, 1),
        ];
        let year2 = vec![
            invoice_item("C", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("D", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("E", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("F", "Dallas", "Primary", 100.0, 0.0, 1),
        ];
        let rows = vec![
            agg.summarize_period("2020", &year1).unwrap(),
            agg.summarize_period("2021", &year2).unwrap(),
        ];
        let total = agg.total_row(&rows);

        assert_eq!(total.period, TOTAL_LABEL);
        assert_eq!(
            total.total_line_items,
            rows.iter().map(|r| r.total_line_items).sum::<u64>()
        );
        // Retail %: 4 of 6 = 66.67, not the mean of 50% and 75% (62.5)
        assert_eq!(total.retail_pct, 66.67);
        assert_eq!(total.retail_items, 4);
    }

    #[test]
    fn test_branch_breakdown_with_unknown_bucket() {
        let records = vec![
            invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("B", "Unknown", "Primary", 50.0, 0.0, 1),
        ];
        let rows = aggregator().summarize_branches("2021", &records);
        assert_eq!(rows.len(), 2);
        let unknown = rows.iter().find(|r| r.branch == "Unknown").unwrap();
        assert_eq!(unknown.total_items, 1);
        assert_eq!(unknown.insurance_items, 1);
    }

    #[test]
    fn test_billing_bucket_shares_sum_to_100() {
        let records = vec![
            invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("B", "Dallas", "Patient", 100.0, 0.0, 2),
            invoice_item("C", "Dallas", "Patient", 100.0, 0.0, 5),
            invoice_item("D", "Dallas", "Patient", 100.0, 0.0, 40),
        ];
        let rows = aggregator().billing_buckets("2021", &records);
        assert_eq!(rows.len(), 4);

        let item_share: f64 = rows.iter().map(|r| r.item_pct).sum();
        let payment_share: f64 = rows.iter().map(|r| r.payment_pct).sum();
        assert!((item_share - 100.0).abs() < 0.05);
        assert!((payment_share - 100.0).abs() < 0.05);

        let last = rows.last().unwrap();
        assert_eq!(last.bucket, "Period 37+");
        assert_eq!(last.period_end, 999);
    }

    #[test]
    fn test_retail_pass_through_outputs() {
        let records = vec![
            invoice_item("B", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1),
            invoice_item("A", "Dallas", "Primary", 100.0, 0.0, 1),
            invoice_item("C", "Dallas", "Primary", 100.0, 0.0, 1),
        ];
        let items = retail_line_items(&records);
        assert_eq!(items.len(), 2);
        // Input order preserved, values projected flat
        assert_eq!(items[0].document_number, "B");
        assert_eq!(items[1].document_number, "A");
        assert_eq!(items[0].branch, "Dallas");
        assert_eq!(items[0].paid, 100.0);

        // Sorted, unique, and only documents with at least one retail item
        let docs = retail_document_numbers(&records);
        assert_eq!(docs, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_unique_patients_counted_and_summed_into_total() {
        fn with_patient(mut rec: ClassifiedRecord, id: &str) -> ClassifiedRecord {
            rec.record.patient = Some(id.to_string());
            rec
        }

        let agg = aggregator();
        let year1 = vec![
            with_patient(invoice_item("A", "Dallas", "Patient", 100.0, 0.0, 1), "P1"),
            with_patient(invoice_item("B", "Dallas", "Patient", 100.0, 0.0, 1), "P1"),
            with_patient(invoice_item("C", "Dallas", "Primary", 100.0, 0.0, 1), "P2"),
            invoice_item("D", "Dallas", "Patient", 100.0, 0.0, 1),
        ];
        let year2 = vec![
            with_patient(invoice_item("E", "Dallas", "Patient", 100.0, 0.0, 1), "P3"),
        ];

        let rows = vec![
            agg.summarize_period("2020", &year1).unwrap(),
            agg.summarize_period("2021", &year2).unwrap(),
        ];
        // P1 deduplicated within the period; the missing id is not counted
        assert_eq!(rows[0].unique_patients, 2);
        assert_eq!(rows[1].unique_patients, 1);

        let total = agg.total_row(&rows);
        assert_eq!(total.unique_patients, 3);
    }

    #[test]
    fn test_gross_vs_net_billed_diverge_on_credits() {
        let records = vec![invoice_item("A", "Dallas", "Patient", 100.0, -40.0, 1)];

        let gross = Aggregator::new(ZeroBilledPolicy::ZeroAsUndefined, BilledBasis::Gross)
            .summarize_period("2021", &records)
            .unwrap();
        let net = Aggregator::new(ZeroBilledPolicy::ZeroAsUndefined, BilledBasis::Net)
            .summarize_period("2021", &records)
            .unwrap();

        assert_eq!(gross.total_billed, 140.0);
        assert_eq!(net.total_billed, 100.0);
        assert_eq!(gross.collection_rate, Some(71.43));
        assert_eq!(net.collection_rate, Some(100.0));
    }
}
