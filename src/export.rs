// 📤 Spreadsheet export
// One row per filtered record plus a trailing total row

use crate::db::{display_date, ExpenseRecord};
use crate::query::{total_for, TaxYearFilter};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ExportRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Merchant")]
    merchant: String,
    #[serde(rename = "Item Name")]
    item_name: String,
    #[serde(rename = "Price")]
    price: String,
    #[serde(rename = "Tax")]
    tax: String,
    #[serde(rename = "Total Price")]
    total_price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    /// Data rows + the total row (header excluded)
    pub rows_written: usize,
    pub total: f64,
}

pub fn export_filename(tax_year: TaxYearFilter) -> String {
    format!("HSA_Expenses_{}.csv", tax_year.label())
}

pub fn write_export<W: Write>(records: &[ExpenseRecord], writer: W) -> Result<ExportSummary> {
    let mut wtr = csv::Writer::from_writer(writer);

    for record in records {
        wtr.serialize(ExportRow {
            date: display_date(record.date),
            merchant: record.merchant.clone(),
            item_name: record.item_name.clone(),
            price: format!("{:.2}", record.price),
            tax: format!("{:.2}", record.tax),
            total_price: format!("{:.2}", record.total_price),
        })
        .context("Failed to write export row")?;
    }

    let total = total_for(records);
    wtr.serialize(ExportRow {
        date: String::new(),
        merchant: String::new(),
        item_name: "Total".to_string(),
        price: "0.00".to_string(),
        tax: "0.00".to_string(),
        total_price: format!("{:.2}", total),
    })
    .context("Failed to write total row")?;

    wtr.flush().context("Failed to flush export")?;

    Ok(ExportSummary {
        rows_written: records.len() + 1,
        total,
    })
}

/// Export to a file on disk
pub fn export_to_file(records: &[ExpenseRecord], path: &Path) -> Result<ExportSummary> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create export file {:?}", path))?;
    write_export(records, file)
}
