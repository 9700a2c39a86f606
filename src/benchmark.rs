// 🏆 Benchmarking Engine - Branch peer ranking
// Computes per-branch percentile ranks for four metrics against the peer
// set of all branches, with a deterministic secondary tie-break, and folds
// them into a weighted composite performance score.
//
// Never fatal: degenerate peer sets fall back to the neutral rank (50.0)
// and are reported as structured warnings for the caller to surface.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::aggregate::{BilledBasis, ZeroBilledPolicy};
use crate::classify::ClassifiedRecord;

/// Peer-set size below which percentile analysis is reported as unreliable
pub const MIN_PEER_SAMPLE: usize = 5;

/// Composite score weights: collection 40%, payments 30%, volume 20%,
/// retail mix 10%.
const WEIGHT_COLLECTION: f64 = 0.40;
const WEIGHT_PAYMENTS: f64 = 0.30;
const WEIGHT_VOLUME: f64 = 0.20;
const WEIGHT_RETAIL_MIX: f64 = 0.10;

/// Neutral rank substituted where no meaningful rank exists
const NEUTRAL_RANK: f64 = 50.0;

// ============================================================================
// PERCENTILE RANK
// ============================================================================

/// Percentile rank of `value` within `peers` by linear interpolation:
/// `(count of peers strictly less) / (n - 1) * 100`, clamped to [0, 100].
/// A peer set of one (or none) yields the neutral 50.0.
///
/// When two or more peers tie exactly on `value`, the secondary metric
/// breaks the tie: normalized to [0, 1] over the peer set's min/max (0 if
/// the range is zero) and scaled by `0.5 / n`, nudging ties apart by at
/// most half a percentile point. The adjustment formula is preserved
/// exactly from the source system for output compatibility.
pub fn percentile_rank(value: f64, peers: &[f64], secondary: Option<(f64, &[f64])>) -> f64 {
    let n = peers.len();
    if n <= 1 {
        return NEUTRAL_RANK;
    }

    let count_less = peers.iter().filter(|p| **p < value).count();
    let count_equal = peers.iter().filter(|p| **p == value).count();

    let mut tiebreaker_adjustment = 0.0;
    if count_equal > 1 {
        if let Some((sec_value, sec_peers)) = secondary {
            let sec_min = sec_peers.iter().cloned().fold(f64::INFINITY, f64::min);
            let sec_max = sec_peers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sec_range = sec_max - sec_min;
            if sec_range > 0.0 {
                let sec_normalized = (sec_value - sec_min) / sec_range;
                tiebreaker_adjustment = sec_normalized * 0.5 / n as f64;
            }
        }
    }

    let percentile = (count_less as f64 / (n - 1) as f64) * 100.0 + tiebreaker_adjustment;
    percentile.clamp(0.0, 100.0)
}

// ============================================================================
// BRANCH METRICS
// ============================================================================

/// One benchmarking row per branch: aggregates, the four percentile ranks,
/// and the composite performance score.
///
/// `collection_rate` / `collection_rank` stay None for zero-billed branches
/// under `ZeroAsUndefined`; the neutral 50.0 substitutes in the weighted
/// score only, never for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchMetrics {
    #[serde(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Total Payments")]
    pub payments: f64,
    #[serde(rename = "Total Billed")]
    pub total_billed: f64,
    #[serde(rename = "Net Billed")]
    pub net_billed: f64,
    #[serde(rename = "Retail Items")]
    pub retail_items: u64,
    #[serde(rename = "Insurance Items")]
    pub insurance_items: u64,
    #[serde(rename = "Total Items")]
    pub total_items: u64,
    #[serde(rename = "Documents")]
    pub documents: u64,
    #[serde(rename = "Retail Mix %")]
    pub retail_mix: f64,
    #[serde(rename = "Collection Rate %")]
    pub collection_rate: Option<f64>,
    #[serde(rename = "Payments Percentile")]
    pub payments_rank: f64,
    #[serde(rename = "Collection Rate Percentile")]
    pub collection_rank: Option<f64>,
    #[serde(rename = "Retail Mix Percentile")]
    pub retail_mix_rank: f64,
    #[serde(rename = "Volume Percentile")]
    pub volume_rank: f64,
    #[serde(rename = "Performance Score")]
    pub performance_score: f64,
}

// ============================================================================
// WARNINGS
// ============================================================================

/// Non-fatal benchmarking conditions surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkWarning {
    /// Fewer than 2 branches: every rank is the neutral 50.0
    EmptyPeerSet { branches: usize },
    /// Fewer than MIN_PEER_SAMPLE branches: ranks computed but unreliable
    InsufficientPeerSample { branches: usize, minimum: usize },
}

impl BenchmarkWarning {
    pub fn message(&self) -> String {
        match self {
            BenchmarkWarning::EmptyPeerSet { branches } => format!(
                "No peer set for percentile analysis: only {} branch(es); all ranks neutral",
                branches
            ),
            BenchmarkWarning::InsufficientPeerSample { branches, minimum } => format!(
                "Insufficient data for percentile analysis: only {} branches (minimum {} for meaningful comparison)",
                branches, minimum
            ),
        }
    }
}

/// Benchmarking output: one row per branch plus any warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub branches: Vec<BranchMetrics>,
    pub warnings: Vec<BenchmarkWarning>,
}

// ============================================================================
// BENCHMARK ENGINE
// ============================================================================

/// Per-branch accumulator before ranking
struct BranchAccumulator {
    payments: f64,
    total_billed: f64,
    net_billed: f64,
    retail_items: u64,
    insurance_items: u64,
    documents: HashSet<String>,
}

/// BenchmarkEngine - ranks branches against each other.
///
/// The zero-billed policy and billed basis are explicit so the caller names
/// which collection-rate variant it wants (the benchmarking path uses
/// `ZeroAsUndefined`; the legacy summary path used `ZeroAsFullyCollected`).
pub struct BenchmarkEngine {
    pub zero_billed: ZeroBilledPolicy,
    pub billed_basis: BilledBasis,
}

impl BenchmarkEngine {
    pub fn new(zero_billed: ZeroBilledPolicy, billed_basis: BilledBasis) -> Self {
        BenchmarkEngine {
            zero_billed,
            billed_basis,
        }
    }

    /// Rank every branch in the record set against its peers.
    pub fn run(&self, records: &[ClassifiedRecord]) -> BenchmarkReport {
        let mut by_branch: BTreeMap<String, BranchAccumulator> = BTreeMap::new();

        for rec in records {
            let r = &rec.record;
            let acc = by_branch
                .entry(r.branch.clone())
                .or_insert_with(|| BranchAccumulator {
                    payments: 0.0,
                    total_billed: 0.0,
                    net_billed: 0.0,
                    retail_items: 0,
                    insurance_items: 0,
                    documents: HashSet::new(),
                });
            acc.payments += r.paid;
            acc.total_billed += r.gross_billed();
            acc.net_billed += r.net_billed();
            if rec.is_retail() {
                acc.retail_items += 1;
            } else if rec.is_insurance() {
                acc.insurance_items += 1;
            }
            if !r.document_number.is_empty() {
                acc.documents.insert(r.document_number.clone());
            }
        }

        let branch_count = by_branch.len();
        let mut warnings = Vec::new();
        if branch_count < 2 {
            warnings.push(BenchmarkWarning::EmptyPeerSet {
                branches: branch_count,
            });
        } else if branch_count < MIN_PEER_SAMPLE {
            warnings.push(BenchmarkWarning::InsufficientPeerSample {
                branches: branch_count,
                minimum: MIN_PEER_SAMPLE,
            });
        }

        // Base metrics per branch, in stable branch order
        struct Base {
            branch: String,
            payments: f64,
            total_billed: f64,
            net_billed: f64,
            retail_items: u64,
            insurance_items: u64,
            total_items: u64,
            documents: u64,
            retail_mix: f64,
            collection_rate: Option<f64>,
        }

        let bases: Vec<Base> = by_branch
            .into_iter()
            .map(|(branch, acc)| {
                let total_items = acc.retail_items + acc.insurance_items;
                let retail_mix = if total_items > 0 {
                    acc.retail_items as f64 / total_items as f64 * 100.0
                } else {
                    0.0
                };
                let billed_for_rate = match self.billed_basis {
                    BilledBasis::Gross => acc.total_billed,
                    BilledBasis::Net => acc.net_billed,
                };
                Base {
                    branch,
                    payments: acc.payments,
                    total_billed: acc.total_billed,
                    net_billed: acc.net_billed,
                    retail_items: acc.retail_items,
                    insurance_items: acc.insurance_items,
                    total_items,
                    documents: acc.documents.len() as u64,
                    retail_mix,
                    collection_rate: self.zero_billed.rate(acc.payments, billed_for_rate),
                }
            })
            .collect();

        // Peer-set vectors for each metric
        let payments: Vec<f64> = bases.iter().map(|b| b.payments).collect();
        let documents: Vec<f64> = bases.iter().map(|b| b.documents as f64).collect();
        let retail_mix: Vec<f64> = bases.iter().map(|b| b.retail_mix).collect();
        let total_items: Vec<f64> = bases.iter().map(|b| b.total_items as f64).collect();
        // Branches with no collection rate are excluded from the peer set
        // used to rank the others, and receive no rank themselves.
        let valid_collection: Vec<f64> =
            bases.iter().filter_map(|b| b.collection_rate).collect();

        let branches = bases
            .into_iter()
            .map(|b| {
                let payments_rank =
                    percentile_rank(b.payments, &payments, Some((b.documents as f64, &documents)));
                let collection_rank = b.collection_rate.map(|rate| {
                    percentile_rank(rate, &valid_collection, Some((b.payments, &payments)))
                });
                let retail_mix_rank = percentile_rank(
                    b.retail_mix,
                    &retail_mix,
                    Some((b.total_items as f64, &total_items)),
                );
                let volume_rank = percentile_rank(
                    b.documents as f64,
                    &documents,
                    Some((b.payments, &payments)),
                );

                // Null collection rank scores as the neutral median; the
                // None is preserved for display.
                let performance_score = collection_rank.unwrap_or(NEUTRAL_RANK)
                    * WEIGHT_COLLECTION
                    + payments_rank * WEIGHT_PAYMENTS
                    + volume_rank * WEIGHT_VOLUME
                    + retail_mix_rank * WEIGHT_RETAIL_MIX;

                BranchMetrics {
                    branch: b.branch,
                    payments: b.payments,
                    total_billed: b.total_billed,
                    net_billed: b.net_billed,
                    retail_items: b.retail_items,
                    insurance_items: b.insurance_items,
                    total_items: b.total_items,
                    documents: b.documents,
                    retail_mix: b.retail_mix,
                    collection_rate: b.collection_rate,
                    payments_rank,
                    collection_rank,
                    retail_mix_rank,
                    volume_rank,
                    performance_score,
                }
            })
            .collect();

        BenchmarkReport { branches, warnings }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::records::{NormalizedRecord, PayerInfo, RecordFamily};

    fn item(doc: &str, branch: &str, payor: &str, paid: f64, balance: f64) -> ClassifiedRecord {
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
            billing_period: 1,
            payer: PayerInfo::Level(Some(payor.to_string())),
        })
    }

    fn engine() -> BenchmarkEngine {
        BenchmarkEngine::new(ZeroBilledPolicy::ZeroAsUndefined, BilledBasis::Gross)
    }

    #[test]
    fn test_percentile_rank_linear_interpolation() {
        let peers = [10.0, 20.0, 30.0, 40.0];
        let rank = percentile_rank(30.0, &peers, None);
        assert!((rank - 66.666_666).abs() < 0.01, "rank was {}", rank);
    }

    #[test]
    fn test_percentile_rank_extremes() {
        let peers = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_rank(5.0, &peers, None), 0.0);
        assert_eq!(percentile_rank(100.0, &peers, None), 100.0);
    }

    #[test]
    fn test_percentile_rank_singleton_is_neutral() {
        assert_eq!(percentile_rank(42.0, &[42.0], None), 50.0);
        assert_eq!(percentile_rank(42.0, &[], None), 50.0);
    }

    #[test]
    fn test_tiebreak_orders_by_secondary() {
        let peers = [100.0, 100.0, 50.0];
        let secondary = [5.0, 20.0, 1.0];

        let low = percentile_rank(100.0, &peers, Some((5.0, &secondary)));
        let high = percentile_rank(100.0, &peers, Some((20.0, &secondary)));
        assert!(high > low, "higher secondary should rank higher: {} vs {}", high, low);
        // Adjustment bounded by half a percentile point
        assert!(high - low <= 0.5 / peers.len() as f64 + 1e-9);
    }

    #[test]
    fn test_tiebreak_no_adjustment_without_ties() {
        let peers = [10.0, 20.0, 30.0];
        let secondary = [1.0, 2.0, 3.0];
        let with_sec = percentile_rank(20.0, &peers, Some((2.0, &secondary)));
        let without = percentile_rank(20.0, &peers, None);
        assert_eq!(with_sec, without);
    }

    #[test]
    fn test_tiebreak_zero_secondary_range() {
        let peers = [100.0, 100.0];
        let secondary = [7.0, 7.0];
        let rank = percentile_rank(100.0, &peers, Some((7.0, &secondary)));
        assert_eq!(rank, 0.0);
    }

    #[test]
    fn test_run_ranks_branches() {
        let mut records = Vec::new();
        for (i, (branch, paid)) in [
            ("Austin", 100.0),
            ("Dallas", 200.0),
            ("Houston", 300.0),
            ("Plano", 400.0),
            ("Waco", 500.0),
        ]
        .iter()
        .enumerate()
        {
            records.push(item(&format!("D{}", i), branch, "Patient", *paid, 0.0));
        }

        let report = engine().run(&records);
        assert!(report.warnings.is_empty());
        assert_eq!(report.branches.len(), 5);

        let waco = report.branches.iter().find(|b| b.branch == "Waco").unwrap();
        let austin = report.branches.iter().find(|b| b.branch == "Austin").unwrap();
        assert_eq!(waco.payments_rank, 100.0);
        assert_eq!(austin.payments_rank, 0.0);
    }

    #[test]
    fn test_payment_ties_broken_by_document_volume() {
        let records = vec![
            item("D1", "Austin", "Patient", 100.0, 0.0),
            item("D2", "Dallas", "Patient", 50.0, 0.0),
            item("D3", "Dallas", "Patient", 50.0, 0.0),
            item("D4", "Houston", "Patient", 10.0, 0.0),
        ];
        // Austin and Dallas both have payments 100; Dallas has 2 documents
        let report = engine().run(&records);
        let austin = report.branches.iter().find(|b| b.branch == "Austin").unwrap();
        let dallas = report.branches.iter().find(|b| b.branch == "Dallas").unwrap();
        assert_eq!(austin.payments, dallas.payments);
        assert!(dallas.payments_rank > austin.payments_rank);
    }

    #[test]
    fn test_zero_billed_branch_has_no_collection_rank() {
        let records = vec![
            item("D1", "Austin", "Patient", 100.0, 50.0),
            item("D2", "Dallas", "Patient", 200.0, 10.0),
            item("D3", "Houston", "Patient", 0.0, 0.0),
        ];
        let report = engine().run(&records);

        let houston = report.branches.iter().find(|b| b.branch == "Houston").unwrap();
        assert_eq!(houston.collection_rate, None);
        assert_eq!(houston.collection_rank, None);

        // Excluded from the peer set: the other two rank against n=2
        let austin = report.branches.iter().find(|b| b.branch == "Austin").unwrap();
        let dallas = report.branches.iter().find(|b| b.branch == "Dallas").unwrap();
        assert!(austin.collection_rank.is_some());
        assert!(dallas.collection_rank.unwrap() > austin.collection_rank.unwrap());
    }

    #[test]
    fn test_null_collection_rank_scores_as_neutral() {
        let records = vec![
            item("D1", "Austin", "Patient", 0.0, 0.0),
            item("D2", "Dallas", "Patient", 200.0, 10.0),
        ];
        let report = engine().run(&records);
        let austin = report.branches.iter().find(|b| b.branch == "Austin").unwrap();
        assert_eq!(austin.collection_rank, None);

        let expected = 50.0 * WEIGHT_COLLECTION
            + austin.payments_rank * WEIGHT_PAYMENTS
            + austin.volume_rank * WEIGHT_VOLUME
            + austin.retail_mix_rank * WEIGHT_RETAIL_MIX;
        assert!((austin.performance_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_single_branch_is_empty_peer_set() {
        let records = vec![item("D1", "Austin", "Patient", 100.0, 0.0)];
        let report = engine().run(&records);
        assert_eq!(
            report.warnings,
            vec![BenchmarkWarning::EmptyPeerSet { branches: 1 }]
        );
        let austin = &report.branches[0];
        assert_eq!(austin.payments_rank, 50.0);
        assert_eq!(austin.volume_rank, 50.0);
    }

    #[test]
    fn test_small_peer_set_warns_but_computes() {
        let records = vec![
            item("D1", "Austin", "Patient", 100.0, 0.0),
            item("D2", "Dallas", "Patient", 200.0, 0.0),
        ];
        let report = engine().run(&records);
        assert_eq!(
            report.warnings,
            vec![BenchmarkWarning::InsufficientPeerSample {
                branches: 2,
                minimum: MIN_PEER_SAMPLE
            }]
        );
        assert_eq!(report.branches.len(), 2);
    }

    #[test]
    fn test_performance_score_weights() {
        let records = vec![
            item("D1", "Austin", "Patient", 100.0, 10.0),
            item("D2", "Dallas", "Primary", 200.0, 20.0),
            item("D3", "Houston", "Patient", 300.0, 5.0),
        ];
        let report = engine().run(&records);
        for b in &report.branches {
            let expected = b.collection_rank.unwrap_or(50.0) * 0.40
                + b.payments_rank * 0.30
                + b.volume_rank * 0.20
                + b.retail_mix_rank * 0.10;
            assert!((b.performance_score - expected).abs() < 1e-9);
        }
    }
}
