// 📊 Retail Analytics CLI - Batch analysis runner
// Modes:
//   split    - split a multi-year sales export into per-year batches
//   sales    - analyze per-year sales-order exports
//   invoices - analyze per-year invoice exports + branch benchmarks

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use retail_analytics::{
    classify, load_invoices, load_sales_orders, retail_document_numbers,
    retail_line_items, split_sales_by_year, write_document_list,
    write_override_audit, write_report, Aggregator, BenchmarkEngine, BilledBasis,
    ClassifiedRecord, Normalizer, ProcCodeMap, ProcCodeStrategy, RecordFamily,
    RuleBasedCleaner, ZeroBilledPolicy, VERSION,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("split") if args.len() >= 4 => {
            run_split(Path::new(&args[2]), Path::new(&args[3]))
        }
        Some("sales") if args.len() >= 4 => {
            run_sales(Path::new(&args[2]), &args[3..])
        }
        Some("invoices") if args.len() >= 4 => {
            run_invoices(Path::new(&args[2]), &args[3..])
        }
        _ => {
            eprintln!("Usage:");
            eprintln!("  retail-analytics split <input.csv> <output_dir>");
            eprintln!("  retail-analytics sales <output_dir> <year_csv>...");
            eprintln!("  retail-analytics invoices <output_dir> [--map <mapping.csv>] <year_csv>...");
            std::process::exit(1);
        }
    }
}

/// Period label from a batch filename, e.g. "2021_SalesOrders.csv" -> "2021"
fn period_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.split('_').next().unwrap_or(stem).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn run_split(input: &Path, output_dir: &Path) -> Result<()> {
    println!("📅 Splitting sales orders by year");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let written = split_sales_by_year(input, output_dir)?;
    for path in &written {
        println!("✓ Wrote {}", path.display());
    }
    println!("\n🎉 Split complete: {} year file(s)", written.len());
    Ok(())
}

fn run_sales(output_dir: &Path, inputs: &[String]) -> Result<()> {
    println!("📊 Sales Order Analysis - Retail vs Insurance (v{})", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    let mut normalizer = Normalizer::new(ProcCodeStrategy::RuleBased(RuleBasedCleaner::new()));
    let aggregator = Aggregator::new(ZeroBilledPolicy::ZeroAsFullyCollected, BilledBasis::Gross);

    let mut summaries = Vec::new();
    let mut branch_rows = Vec::new();
    let mut all_records: Vec<ClassifiedRecord> = Vec::new();

    // 1. Load, normalize, classify each year batch
    for input in inputs {
        let path = PathBuf::from(input);
        let period = period_label(&path);

        println!("\n📂 Loading {} ({})...", path.display(), period);
        let raw = load_sales_orders(&path)?;
        println!("✓ Loaded {} line items", raw.len());

        let records: Vec<ClassifiedRecord> = raw
            .iter()
            .enumerate()
            .map(|(row, rec)| classify(normalizer.normalize_sales_order(row, &period, rec)))
            .collect();

        if let Some(summary) = aggregator.summarize_period(&period, &records) {
            summaries.push(summary);
        }
        branch_rows.extend(aggregator.summarize_branches(&period, &records));
        all_records.extend(records);
    }

    // 2. Combined TOTAL row
    println!("\n🧮 Building combined summary...");
    if !summaries.is_empty() {
        let total = aggregator.total_row(&summaries);
        summaries.push(total);
    }

    // 3. Write reports
    println!("\n💾 Writing reports...");
    write_report(&output_dir.join("insurance_analysis_summary.csv"), &summaries)?;
    write_report(&output_dir.join("branch_analysis.csv"), &branch_rows)?;

    let retail_orders = retail_document_numbers(&all_records);
    write_document_list(
        &output_dir.join("retail_order_numbers.csv"),
        RecordFamily::SalesOrder.document_label(),
        &retail_orders,
    )?;

    let retail_items = retail_line_items(&all_records);
    write_report(&output_dir.join("retail_line_items.csv"), &retail_items)?;

    let audit = normalizer.into_audit();
    if !audit.is_empty() {
        write_override_audit(&output_dir.join("proc_code_overrides.csv"), &audit)?;
        println!("✓ {} proc code override(s) recorded", audit.len());
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Sales analysis COMPLETE!");
    println!("✅ {} line items across {} period(s)", all_records.len(), inputs.len());
    println!("✅ {} retail order(s), {} retail line item(s)", retail_orders.len(), retail_items.len());
    Ok(())
}

fn run_invoices(output_dir: &Path, inputs: &[String]) -> Result<()> {
    println!("🧾 Invoice Analysis - Retail vs Insurance + Benchmarks (v{})", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    // Optional proc-code mapping table: --map <mapping.csv>
    let (strategy, inputs) = match inputs {
        [flag, map_path, rest @ ..] if flag.as_str() == "--map" => {
            println!("\n🔧 Loading proc code mapping...");
            let map = ProcCodeMap::from_csv_file(map_path)?;
            println!("✓ {} canonical code(s) mapped", map.len());
            (ProcCodeStrategy::Lookup(map), rest)
        }
        rest => (ProcCodeStrategy::Lookup(ProcCodeMap::new()), rest),
    };

    let mut normalizer = Normalizer::new(strategy);
    let aggregator = Aggregator::new(ZeroBilledPolicy::ZeroAsFullyCollected, BilledBasis::Gross);

    let mut summaries = Vec::new();
    let mut branch_rows = Vec::new();
    let mut bucket_rows = Vec::new();
    let mut all_records: Vec<ClassifiedRecord> = Vec::new();

    // 1. Load, normalize, classify each year batch
    for input in inputs {
        let path = PathBuf::from(input);
        let period = period_label(&path);

        println!("\n📂 Loading {} ({})...", path.display(), period);
        let raw = load_invoices(&path)?;
        println!("✓ Loaded {} line items", raw.len());

        let records: Vec<ClassifiedRecord> = raw
            .iter()
            .enumerate()
            .map(|(row, rec)| classify(normalizer.normalize_invoice(row, &period, rec)))
            .collect();

        if let Some(summary) = aggregator.summarize_period(&period, &records) {
            summaries.push(summary);
        }
        branch_rows.extend(aggregator.summarize_branches(&period, &records));
        bucket_rows.extend(aggregator.billing_buckets(&period, &records));
        all_records.extend(records);
    }

    // 2. Combined TOTAL row
    println!("\n🧮 Building combined summary...");
    if !summaries.is_empty() {
        let total = aggregator.total_row(&summaries);
        summaries.push(total);
    }

    // 3. Branch benchmarks over the combined record set
    println!("\n🏆 Benchmarking branches...");
    let engine = BenchmarkEngine::new(ZeroBilledPolicy::ZeroAsUndefined, BilledBasis::Gross);
    let report = engine.run(&all_records);
    for warning in &report.warnings {
        println!("⚠️  {}", warning.message());
    }
    println!("✓ {} branch(es) ranked", report.branches.len());

    // 4. Write reports
    println!("\n💾 Writing reports...");
    write_report(&output_dir.join("invoice_analysis_summary.csv"), &summaries)?;
    write_report(&output_dir.join("branch_analysis.csv"), &branch_rows)?;
    write_report(&output_dir.join("billing_period_analysis.csv"), &bucket_rows)?;
    write_report(&output_dir.join("branch_benchmarks.csv"), &report.branches)?;

    let retail_invoices = retail_document_numbers(&all_records);
    write_document_list(
        &output_dir.join("retail_invoice_numbers.csv"),
        RecordFamily::Invoice.document_label(),
        &retail_invoices,
    )?;

    let retail_items = retail_line_items(&all_records);
    write_report(&output_dir.join("retail_invoice_items.csv"), &retail_items)?;

    let audit = normalizer.into_audit();
    if !audit.is_empty() {
        write_override_audit(&output_dir.join("proc_code_overrides.csv"), &audit)?;
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Invoice analysis COMPLETE!");
    println!("✅ {} line items across {} period(s)", all_records.len(), inputs.len());
    println!("✅ {} retail invoice(s), {} retail line item(s)", retail_invoices.len(), retail_items.len());
    Ok(())
}
