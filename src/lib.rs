// Retail Analytics Engine - Core Library
// Exposes all modules for use in the CLI and tests

pub mod aggregate;
pub mod benchmark;
pub mod classify;
pub mod loader;
pub mod normalize;
pub mod proc_code;
pub mod records;

// Re-export commonly used types
pub use aggregate::{
    retail_document_numbers, retail_line_items, Aggregator, BilledBasis,
    BillingBucket, BillingBucketRow, BranchSummary, PeriodSummary,
    RetailLineItemRow, ZeroBilledPolicy, BILLING_BUCKETS, TOTAL_LABEL,
};
pub use benchmark::{
    percentile_rank, BenchmarkEngine, BenchmarkReport, BenchmarkWarning,
    BranchMetrics, MIN_PEER_SAMPLE,
};
pub use classify::{classify, classify_payer, ClassifiedRecord, PayerClass};
pub use loader::{
    load_invoices, load_sales_orders, split_sales_by_year, write_document_list,
    write_override_audit, write_report,
};
pub use normalize::{
    clean_billing_period, clean_branch, clean_currency, clean_date,
    clean_discount_pct, clean_quantity, safe_bool, Normalizer, UNKNOWN_BRANCH,
};
pub use proc_code::{
    OverrideReason, ProcCodeMap, ProcCodeOverride, ProcCodeStrategy,
    RuleBasedCleaner, NO_CODE, UNMAPPED,
};
pub use records::{
    InvoiceRecord, NormalizedRecord, PayerInfo, RecordFamily, SalesOrderRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
