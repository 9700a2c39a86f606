// 🏷️ Procedure Code Cleaning - Two strategies
// Rule-based normalization (sales-order pipeline) forces every result to a
// valid 5-character code or the XZERO sentinel and records an audit entry
// for every correction. Lookup-table normalization (invoice pipeline)
// tolerates unmapped codes and keeps them unchanged.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Sentinel standing in for "no valid procedure code found"
pub const NO_CODE: &str = "XZERO";

/// Placeholder returned by the lookup strategy for null/blank input
pub const UNMAPPED: &str = "UNKNOWN";

// ============================================================================
// OVERRIDE AUDIT
// ============================================================================

/// Why a proc code was rewritten during rule-based cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideReason {
    SentinelCollapse,
    BaseCodeCollapse,
    ManualOverride,
    InvalidLength,
    NullValue,
}

impl OverrideReason {
    /// Human-readable label for audit reports
    pub fn label(&self) -> &str {
        match self {
            OverrideReason::SentinelCollapse => "sentinel-collapse",
            OverrideReason::BaseCodeCollapse => "base-code-collapse",
            OverrideReason::ManualOverride => "manual-override",
            OverrideReason::InvalidLength => "invalid-length",
            OverrideReason::NullValue => "null-value",
        }
    }
}

/// One recorded proc-code correction, for the audit output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcCodeOverride {
    /// Row index within the source batch
    pub row: usize,
    pub original: String,
    pub corrected: String,
    pub reason: OverrideReason,
}

// ============================================================================
// RULE-BASED CLEANER
// ============================================================================

/// A single manual correction loaded from the overrides file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOverride {
    pub original: String,
    pub corrected: String,
}

/// Rule-based proc-code normalization.
///
/// Applied in order: manual-override map, sentinel collapse, base-code
/// collapse, then the 5-character length check. Anything that survives no
/// rule but is not exactly 5 characters becomes the XZERO sentinel.
pub struct RuleBasedCleaner {
    manual_overrides: HashMap<String, String>,
    sentinel_literals: HashSet<String>,
    base_codes: Vec<String>,
}

impl RuleBasedCleaner {
    /// Built-in rule set observed in the source exports.
    ///
    /// Manual overrides fix known one-off typos (stray quotes, stray leading
    /// digits). Sentinel literals are the "no code" placeholder variants.
    pub fn new() -> Self {
        let manual_overrides: HashMap<String, String> = [
            ("E0184'", "E0184"),  // trailing quote
            ("E0601'", "E0601"),  // trailing quote
            ("1E1390", "E1390"),  // stray leading digit
            ("0A4604", "A4604"),  // stray leading digit
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let sentinel_literals: HashSet<String> = [
            "XERO", "NONE", "NO CODE", "NOCODE", "N/A", "NA", "WARRANTY", "WARR", "XXXX",
            "XXXXX", "9999", "99999",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        RuleBasedCleaner {
            manual_overrides,
            sentinel_literals,
            base_codes: vec!["E1399".to_string()],
        }
    }

    /// Load additional manual overrides from a JSON file
    /// (array of `{ "original": ..., "corrected": ... }`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read overrides file: {:?}", path.as_ref()))?;

        let overrides: Vec<ManualOverride> =
            serde_json::from_str(&content).context("Failed to parse overrides JSON")?;

        let mut cleaner = RuleBasedCleaner::new();
        for o in overrides {
            cleaner.add_override(&o.original, &o.corrected);
        }
        Ok(cleaner)
    }

    /// Register a single manual override (matched after uppercase+trim)
    pub fn add_override(&mut self, original: &str, corrected: &str) {
        self.manual_overrides.insert(
            original.trim().to_uppercase(),
            corrected.trim().to_uppercase(),
        );
    }

    pub fn override_count(&self) -> usize {
        self.manual_overrides.len()
    }

    /// Clean one proc code. Returns the canonical code plus the audit entry
    /// when a rule rewrote the value. Case folding alone is not an override.
    pub fn clean(&self, row: usize, raw: Option<&str>) -> (String, Option<ProcCodeOverride>) {
        let original = match raw.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => {
                return (
                    NO_CODE.to_string(),
                    Some(ProcCodeOverride {
                        row,
                        original: String::new(),
                        corrected: NO_CODE.to_string(),
                        reason: OverrideReason::NullValue,
                    }),
                );
            }
        };

        let upper = original.to_uppercase();

        if let Some(corrected) = self.manual_overrides.get(&upper) {
            return (
                corrected.clone(),
                Some(ProcCodeOverride {
                    row,
                    original,
                    corrected: corrected.clone(),
                    reason: OverrideReason::ManualOverride,
                }),
            );
        }

        if self.sentinel_literals.contains(&upper) {
            return (
                NO_CODE.to_string(),
                Some(ProcCodeOverride {
                    row,
                    original,
                    corrected: NO_CODE.to_string(),
                    reason: OverrideReason::SentinelCollapse,
                }),
            );
        }

        // Codes with trailing noise after a known base code collapse to it
        for base in &self.base_codes {
            if upper.len() > base.len() && upper.starts_with(base.as_str()) {
                return (
                    base.clone(),
                    Some(ProcCodeOverride {
                        row,
                        original,
                        corrected: base.clone(),
                        reason: OverrideReason::BaseCodeCollapse,
                    }),
                );
            }
        }

        if upper.len() != 5 {
            return (
                NO_CODE.to_string(),
                Some(ProcCodeOverride {
                    row,
                    original,
                    corrected: NO_CODE.to_string(),
                    reason: OverrideReason::InvalidLength,
                }),
            );
        }

        (upper, None)
    }
}

impl Default for RuleBasedCleaner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LOOKUP-TABLE MAP
// ============================================================================

/// Many-to-one proc-code mapping loaded once at start-up and injected into
/// the normalizer (no lazy globals). Exact match wins, then case-insensitive,
/// then the uppercased original is kept unchanged.
pub struct ProcCodeMap {
    exact: HashMap<String, String>,
    folded: HashMap<String, String>,
}

impl ProcCodeMap {
    pub fn new() -> Self {
        ProcCodeMap {
            exact: HashMap::new(),
            folded: HashMap::new(),
        }
    }

    /// Register one canonical code with its pipe-delimited original variants
    pub fn insert(&mut self, canonical: &str, originals_pipe: &str) {
        let final5 = canonical.trim().to_uppercase();
        for orig in originals_pipe.split('|') {
            let orig = orig.trim();
            if orig.is_empty() {
                continue;
            }
            self.exact.insert(orig.to_string(), final5.clone());
            self.folded.insert(orig.to_uppercase(), final5.clone());
        }
    }

    /// Load the mapping from a CSV file with `final5` and `originals_pipe`
    /// columns.
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path.as_ref())
            .with_context(|| format!("Failed to open mapping file: {:?}", path.as_ref()))?;

        let headers = reader.headers().context("Mapping file has no header")?.clone();
        let final5_idx = headers
            .iter()
            .position(|h| h == "final5")
            .context("Mapping file missing 'final5' column")?;
        let originals_idx = headers
            .iter()
            .position(|h| h == "originals_pipe")
            .context("Mapping file missing 'originals_pipe' column")?;

        let mut map = ProcCodeMap::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("Failed to parse mapping line {}", line + 2))?;
            let final5 = record.get(final5_idx).unwrap_or("");
            let originals = record.get(originals_idx).unwrap_or("");
            if !final5.trim().is_empty() {
                map.insert(final5, originals);
            }
        }
        Ok(map)
    }

    /// Number of original-code variants mapped
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Map a raw code to its canonical form. Unmapped codes are kept as the
    /// uppercased original rather than discarded.
    pub fn lookup(&self, raw: Option<&str>) -> String {
        let orig = match raw.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return UNMAPPED.to_string(),
        };

        if let Some(final5) = self.exact.get(orig) {
            return final5.clone();
        }
        let upper = orig.to_uppercase();
        if let Some(final5) = self.folded.get(&upper) {
            return final5.clone();
        }
        upper
    }
}

impl Default for ProcCodeMap {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// STRATEGY SELECTION
// ============================================================================

/// Proc-code cleaning strategy, selected per pipeline family.
/// Sales orders use the strict rule-based cleaner; invoices use the
/// tolerant lookup table.
pub enum ProcCodeStrategy {
    RuleBased(RuleBasedCleaner),
    Lookup(ProcCodeMap),
}

impl ProcCodeStrategy {
    pub fn clean(&self, row: usize, raw: Option<&str>) -> (String, Option<ProcCodeOverride>) {
        match self {
            ProcCodeStrategy::RuleBased(cleaner) => cleaner.clean(row, raw),
            ProcCodeStrategy::Lookup(map) => (map.lookup(raw), None),
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
    fn test_manual_override_trailing_quote() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(7, Some("e0184'"));
        assert_eq!(code, "E0184");
        let over = over.unwrap();
        assert_eq!(over.row, 7);
        assert_eq!(over.original, "e0184'");
        assert_eq!(over.reason, OverrideReason::ManualOverride);
    }

    #[test]
    fn test_sentinel_collapse() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(0, Some("XERO"));
        assert_eq!(code, NO_CODE);
        assert_eq!(over.unwrap().reason, OverrideReason::SentinelCollapse);

        let (code, _) = cleaner.clean(0, Some("warranty"));
        assert_eq!(code, NO_CODE);
    }

    #[test]
    fn test_base_code_collapse() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(3, Some("E1399RR"));
        assert_eq!(code, "E1399");
        assert_eq!(over.unwrap().reason, OverrideReason::BaseCodeCollapse);
    }

    #[test]
    fn test_invalid_length_forced_to_sentinel() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(0, Some("A123456"));
        assert_eq!(code, NO_CODE);
        assert_eq!(over.unwrap().reason, OverrideReason::InvalidLength);
    }

    #[test]
    fn test_null_value() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(0, None);
        assert_eq!(code, NO_CODE);
        assert_eq!(over.unwrap().reason, OverrideReason::NullValue);

        let (code, over) = cleaner.clean(0, Some("   "));
        assert_eq!(code, NO_CODE);
        assert_eq!(over.unwrap().reason, OverrideReason::NullValue);
    }

    #[test]
    fn test_valid_code_passes_without_override() {
        let cleaner = RuleBasedCleaner::new();
        let (code, over) = cleaner.clean(0, Some("E0601"));
        assert_eq!(code, "E0601");
        assert!(over.is_none());

        // Case folding alone is not an override
        let (code, over) = cleaner.clean(0, Some("e0601"));
        assert_eq!(code, "E0601");
        assert!(over.is_none());
    }

    #[test]
    fn test_lookup_exact_and_case_insensitive() {
        let mut map = ProcCodeMap::new();
        map.insert("E0601", "e0601|E0601-NU|0601");

        assert_eq!(map.lookup(Some("e0601")), "E0601");
        assert_eq!(map.lookup(Some("E0601-NU")), "E0601");
        assert_eq!(map.lookup(Some("e0601-nu")), "E0601");
    }

    #[test]
    fn test_lookup_unmapped_kept_unchanged() {
        let map = ProcCodeMap::new();
        assert_eq!(map.lookup(Some("a9999rr")), "A9999RR");
        assert_eq!(map.lookup(None), UNMAPPED);
        assert_eq!(map.lookup(Some("")), UNMAPPED);
    }

    #[test]
    fn test_strategy_dispatch() {
        let strategy = ProcCodeStrategy::RuleBased(RuleBasedCleaner::new());
        let (code, over) = strategy.clean(0, Some("E1399RR"));
        assert_eq!(code, "E1399");
        assert!(over.is_some());

        let strategy = ProcCodeStrategy::Lookup(ProcCodeMap::new());
        let (code, over) = strategy.clean(0, Some("E1399RR"));
        assert_eq!(code, "E1399RR");
        assert!(over.is_none());
    }

    #[test]
    fn test_added_override_wins_over_length_check() {
        let mut cleaner = RuleBasedCleaner::new();
        cleaner.add_override("E1390XX", "E1390");
        let (code, over) = cleaner.clean(0, Some("e1390xx"));
        assert_eq!(code, "E1390");
        assert_eq!(over.unwrap().reason, OverrideReason::ManualOverride);
    }
}
