// 🏷️ Classifier - Retail vs Insurance decision rules
// Two mutually exclusive rules exist in the source domain:
//   - Three-flag rule (sales orders): retail iff all three payer-level
//     flags are false.
//   - Single-label rule (invoices): retail iff the payer level is
//     "Patient"; insurance iff Primary/Secondary/Tertiary; anything else
//     is a literal third state, not an error.
// Classification is a pure function of the payer info and billing period.

use serde::{Deserialize, Serialize};

use crate::records::{NormalizedRecord, PayerInfo};

/// Self-pay payer-level label (single-label rule)
const RETAIL_LABEL: &str = "patient";

/// Insurance-tier payer-level labels (single-label rule)
const INSURANCE_LABELS: [&str; 3] = ["primary", "secondary", "tertiary"];

// ============================================================================
// PAYER CLASS
// ============================================================================

/// Payer category for a line item.
///
/// `Unclassified` is the single-label rule's third state: a label matching
/// neither the self-pay label nor any insurance tier (e.g. "COD"). It is
/// surfaced as-is; callers decide how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayerClass {
    Retail,
    Insurance,
    Unclassified,
}

impl PayerClass {
    pub fn is_retail(&self) -> bool {
        matches!(self, PayerClass::Retail)
    }

    pub fn is_insurance(&self) -> bool {
        matches!(self, PayerClass::Insurance)
    }
}

// ============================================================================
// CLASSIFIED RECORD
// ============================================================================

/// A NormalizedRecord plus its classification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub record: NormalizedRecord,
    pub payer_class: PayerClass,
    /// How many payer levels bill this item (0-3); >1 means multi-payer
    pub billing_level_count: u8,
    /// Billing period > 1
    pub is_recurring: bool,
}

impl ClassifiedRecord {
    pub fn is_retail(&self) -> bool {
        self.payer_class.is_retail()
    }

    pub fn is_insurance(&self) -> bool {
        self.payer_class.is_insurance()
    }

    /// Billing period 1 = new (first) charge
    pub fn is_new(&self) -> bool {
        !self.is_recurring
    }
}

// ============================================================================
// CLASSIFICATION RULES
// ============================================================================

/// Classify payer info into (class, billing level count).
///
/// Three-flag rule: retail iff no flag is set; count = number of set flags.
/// Single-label rule: count is 1 for an insurance tier, otherwise 0.
pub fn classify_payer(payer: &PayerInfo) -> (PayerClass, u8) {
    match payer {
        PayerInfo::Flags {
            primary,
            secondary,
            tertiary,
        } => {
            let count = *primary as u8 + *secondary as u8 + *tertiary as u8;
            let class = if count == 0 {
                PayerClass::Retail
            } else {
                PayerClass::Insurance
            };
            (class, count)
        }
        PayerInfo::Level(label) => {
            let folded = label
                .as_deref()
                .map(|l| l.trim().to_lowercase())
                .unwrap_or_default();
            if folded == RETAIL_LABEL {
                (PayerClass::Retail, 0)
            } else if INSURANCE_LABELS.contains(&folded.as_str()) {
                (PayerClass::Insurance, 1)
            } else {
                (PayerClass::Unclassified, 0)
            }
        }
    }
}

/// Classify a normalized record. Pure and idempotent: re-classifying the
/// same record always produces the same outcome.
pub fn classify(record: NormalizedRecord) -> ClassifiedRecord {
    let (payer_class, billing_level_count) = classify_payer(&record.payer);
    let is_recurring = record.billing_period > 1;
    ClassifiedRecord {
        record,
        payer_class,
        billing_level_count,
        is_recurring,
    }
}

// ============================================================================
// TESTS
// ============================================================================
