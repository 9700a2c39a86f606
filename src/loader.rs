// 📂 CSV Loader - Source batch ingestion and report output
// Reads the two source export formats into raw records by header-name
// lookup (a missing column yields None for every row, never an error),
// splits multi-year sales exports into per-year batches, and writes the
// report tables back out as CSV.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::normalize::clean_date;
use crate::proc_code::ProcCodeOverride;
use crate::records::{InvoiceRecord, SalesOrderRecord};

// ============================================================================
// SOURCE COLUMN NAMES
// ============================================================================

// Sales-order export columns
const SO_NUMBER: &str = "Sales Order Number";
const SO_DATE_CREATED: &str = "Sales Order Date Created (YYYY-MM-DD)";
const SO_DATE_CREATED_RAW: &str = "Sales Order Date Created";
const SO_BRANCH: &str = "Sales Order Branch Office";
const SO_STATUS: &str = "Sales Order Status";
const SO_DISCOUNT_PCT: &str = "Sales Order Discount Pct";
const SO_PATIENT_KEY: &str = "Patient Key";
const SO_ITEM_ID: &str = "Sales Order Detail Item Id";
const SO_ITEM_NAME: &str = "Sales Order Detail Item Name";
const SO_PROC_CODE: &str = "Sales Order Detail Proc Code";
const SO_QTY: &str = "Sales Order Detail Qty";
const SO_CHARGE: &str = "Sales Order Detail Charge";
const SO_ALLOW: &str = "Sales Order Detail Allow";
const SO_SALE_TYPE: &str = "Sales Order Detail Sale Type";
const SO_ITEM_GROUP: &str = "Sales Order Detail Item Group";
const SO_FLAG_PRIMARY: &str = "Insurance Flags Primary";
const SO_FLAG_SECONDARY: &str = "Insurance Flags Secondary";
const SO_FLAG_TERTIARY: &str = "Insurance Flags Tertiary";

// Invoice export columns
const INV_NUMBER: &str = "Invoice Number";
const INV_SO_NUMBER: &str = "Invoice Sales Order Number";
const INV_DATE_CREATED: &str = "Invoice Date Created";
const INV_DATE_OF_SERVICE: &str = "Invoice Date of Service";
const INV_BRANCH: &str = "Invoice Branch";
const INV_PAYOR_LEVEL: &str = "Policy Payor Level";
const INV_PAYOR_NAME: &str = "Policy Payor Name";
const INV_PATIENT_ID: &str = "Patient ID";
const INV_ITEM_ID: &str = "Invoice Detail Item ID";
const INV_ITEM_NAME: &str = "Invoice Detail Item Name";
const INV_BILLING_PERIOD: &str = "Invoice Detail Billing Period";
const INV_PAYMENTS: &str = "Invoice Detail Payments";
const INV_BALANCE: &str = "Invoice Detail Balance";
const INV_QTY: &str = "Invoice Detail Qty";
const INV_PROC_CODE: &str = "Invoice Detail Proc Code";
const INV_ITEM_GROUP: &str = "Invoice Detail Item Group";

// ============================================================================
// HEADER LOOKUP
// ============================================================================

/// Header-name to column-index map for one CSV file.
/// Exports vary between periods; columns are looked up by name and a
/// missing column reads as None for every row.
struct HeaderMap {
    indices: HashMap<String, usize>,
}

impl HeaderMap {
    fn new(headers: &StringRecord) -> Self {
        let indices = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        HeaderMap { indices }
    }

    /// Field value for a named column; None when the column is absent or
    /// the cell is empty.
    fn get(&self, record: &StringRecord, column: &str) -> Option<String> {
        let idx = *self.indices.get(column)?;
        let value = record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

// ============================================================================
// BATCH LOADERS
// ============================================================================

/// Load one sales-order export into raw records.
pub fn load_sales_orders(path: &Path) -> Result<Vec<SalesOrderRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers from {}", path.display()))?
        .clone();
    let map = HeaderMap::new(&headers);

    let mut records = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
        })?;

        records.push(SalesOrderRecord {
            order_number: map.get(&record, SO_NUMBER),
            date_created: map
                .get(&record, SO_DATE_CREATED)
                .or_else(|| map.get(&record, SO_DATE_CREATED_RAW)),
            branch: map.get(&record, SO_BRANCH),
            status: map.get(&record, SO_STATUS),
            discount_pct: map.get(&record, SO_DISCOUNT_PCT),
            patient_key: map.get(&record, SO_PATIENT_KEY),
            item_id: map.get(&record, SO_ITEM_ID),
            item_name: map.get(&record, SO_ITEM_NAME),
            proc_code: map.get(&record, SO_PROC_CODE),
            qty: map.get(&record, SO_QTY),
            charge: map.get(&record, SO_CHARGE),
            allow: map.get(&record, SO_ALLOW),
            sale_type: map.get(&record, SO_SALE_TYPE),
            item_group: map.get(&record, SO_ITEM_GROUP),
            flag_primary: map.get(&record, SO_FLAG_PRIMARY),
            flag_secondary: map.get(&record, SO_FLAG_SECONDARY),
            flag_tertiary: map.get(&record, SO_FLAG_TERTIARY),
        });
    }

    Ok(records)
}

/// Load one invoice export into raw records.
pub fn load_invoices(path: &Path) -> Result<Vec<InvoiceRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers from {}", path.display()))?
        .clone();
    let map = HeaderMap::new(&headers);

    let mut records = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
        })?;

        records.push(InvoiceRecord {
            invoice_number: map.get(&record, INV_NUMBER),
            so_number: map.get(&record, INV_SO_NUMBER),
            date_created: map.get(&record, INV_DATE_CREATED),
            date_of_service: map.get(&record, INV_DATE_OF_SERVICE),
            branch: map.get(&record, INV_BRANCH),
            payor_level: map.get(&record, INV_PAYOR_LEVEL),
            payor_name: map.get(&record, INV_PAYOR_NAME),
            patient_id: map.get(&record, INV_PATIENT_ID),
            item_id: map.get(&record, INV_ITEM_ID),
            item_name: map.get(&record, INV_ITEM_NAME),
            billing_period: map.get(&record, INV_BILLING_PERIOD),
            payments: map.get(&record, INV_PAYMENTS),
            balance: map.get(&record, INV_BALANCE),
            qty: map.get(&record, INV_QTY),
            proc_code: map.get(&record, INV_PROC_CODE),
            item_group: map.get(&record, INV_ITEM_GROUP),
        });
    }

    Ok(records)
}

// ============================================================================
// YEAR SPLITTER
// ============================================================================

/// Split a multi-year sales-order export into one file per calendar year.
///
/// A standardized `Sales Order Date Created (YYYY-MM-DD)` column is
/// inserted right after the first column; rows whose creation date cannot
/// be parsed are dropped. Returns the paths written, in year order.
pub fn split_sales_by_year(input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open file: {}", input.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers from {}", input.display()))?
        .clone();
    let map = HeaderMap::new(&headers);

    let mut out_headers = StringRecord::new();
    for (i, name) in headers.iter().enumerate() {
        out_headers.push_field(name);
        if i == 0 {
            out_headers.push_field(SO_DATE_CREATED);
        }
    }

    let mut by_year: BTreeMap<i32, Vec<StringRecord>> = BTreeMap::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, input.display())
        })?;

        let raw_date = map.get(&record, SO_DATE_CREATED_RAW);
        let date = match clean_date(raw_date.as_deref()) {
            Some(d) => d,
            None => continue, // undated rows are dropped, not defaulted
        };

        let mut out = StringRecord::new();
        for (i, field) in record.iter().enumerate() {
            out.push_field(field);
            if i == 0 {
                out.push_field(&date.format("%Y-%m-%d").to_string());
            }
        }
        by_year.entry(chrono::Datelike::year(&date)).or_default().push(out);
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    let mut written = Vec::new();
    for (year, rows) in by_year {
        let path = output_dir.join(format!("{}_SalesOrders.csv", year));
        let mut wtr = Writer::from_path(&path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        wtr.write_record(&out_headers)?;
        for row in &rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}

// ============================================================================
// REPORT WRITERS
// ============================================================================

/// Write one report table as CSV. Column names come from the row type's
/// serde renames.
pub fn write_report<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(())
}

/// Write the retail document-number list as a one-column CSV.
pub fn write_document_list(path: &Path, column: &str, documents: &[String]) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    wtr.write_record([column])?;
    for doc in documents {
        wtr.write_record([doc.as_str()])?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(())
}

/// Write the proc-code override audit trail.
pub fn write_override_audit(path: &Path, audit: &[ProcCodeOverride]) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    wtr.write_record(["Row", "Original", "Corrected", "Reason"])?;
    for entry in audit {
        wtr.write_record([
            entry.row.to_string().as_str(),
            entry.original.as_str(),
            &entry.corrected,
            entry.reason.label(),
        ])?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
