// 📒 Ledger Writer - receipt analysis → expense records
//
// One record per eligible line item, tax apportioned from the receipt's
// single rate. The whole receipt is written in one transaction: a failure
// anywhere leaves the ledger untouched.

use crate::analyzer::{ReceiptAnalyzer, ReceiptImage};
use crate::db::{parse_expense_date, ExpenseRecord, NewExpense};
use crate::error::{ExtractionError, LedgerError};
use crate::normalizer::{parse_receipt_text, ReceiptAnalysis};
use crate::store::ExpenseStore;
use crate::tax::{apportion, round_cents};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const RECEIPT_ACTOR: &str = "receipt_writer";
pub const MANUAL_SOURCE: &str = "manual";

/// Turn a parsed receipt into records to insert
pub fn plan_receipt_records(
    analysis: &ReceiptAnalysis,
    source: &str,
) -> Result<Vec<NewExpense>, ExtractionError> {
    let eligible: Vec<_> = analysis.eligible_items().collect();
    if eligible.is_empty() {
        return Err(ExtractionError::NoEligibleItems);
    }

    let date = analysis
        .date
        .as_deref()
        .and_then(parse_expense_date)
        .ok_or_else(|| {
            ExtractionError::InvalidFormat(format!(
                "unreadable receipt date {:?}",
                analysis.date
            ))
        })?;

    eligible
        .into_iter()
        .map(|item| {
            let price = item.price.ok_or_else(|| {
                ExtractionError::InvalidFormat(format!("item '{}' has no readable price", item.name))
            })?;
            if price < 0.0 {
                return Err(ExtractionError::InvalidFormat(format!(
                    "item '{}' has a negative price",
                    item.name
                )));
            }

            let split = apportion(price, analysis.tax_rate);
            Ok(NewExpense {
                date,
                merchant: analysis.merchant.clone(),
                item_name: item.name.clone(),
                price: split.price,
                tax: split.tax,
                total_price: split.total,
                hsa_eligible: item.hsa_eligible,
                reimbursed: false,
                source: source.to_string(),
            })
        })
        .collect()
}

/// Hand-entered expense (the "Add" form)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualExpense {
    pub date: String,
    pub merchant: String,
    pub item_name: String,
    pub price: f64,
    #[serde(default)]
    pub tax: f64,
    /// Defaults to price + tax
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default = "default_eligible")]
    pub hsa_eligible: bool,
    #[serde(default)]
    pub reimbursed: bool,
}

fn default_eligible() -> bool {
    true
}

impl ManualExpense {
    pub fn into_new_expense(self) -> Result<NewExpense, LedgerError> {
        let date = parse_expense_date(&self.date).ok_or_else(|| {
            LedgerError::InvalidRequest(format!("Unrecognized date '{}'", self.date))
        })?;
        let total_price = self
            .total_price
            .unwrap_or_else(|| round_cents(self.price + self.tax));

        Ok(NewExpense {
            date,
            merchant: self.merchant.trim().to_string(),
            item_name: self.item_name.trim().to_string(),
            price: round_cents(self.price),
            tax: round_cents(self.tax),
            total_price: round_cents(total_price),
            hsa_eligible: self.hsa_eligible,
            reimbursed: self.reimbursed,
            source: MANUAL_SOURCE.to_string(),
        })
    }
}

/// What a receipt produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptOutcome {
    pub merchant: String,
    pub tax_rate_percent: f64,
    pub items_on_receipt: usize,
    pub records: Vec<ExpenseRecord>,
    pub total: f64,
}

impl ReceiptOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} of {} items HSA-eligible, ${:.2} at {:.2}% tax",
            self.merchant,
            self.records.len(),
            self.items_on_receipt,
            self.total,
            self.tax_rate_percent
        )
    }
}

/// Normalize analysis text and write the eligible items
pub fn record_receipt(
    store: &ExpenseStore,
    owner_id: &str,
    text: &str,
    source: &str,
) -> Result<ReceiptOutcome, LedgerError> {
    let analysis = parse_receipt_text(text)?;
    let planned = plan_receipt_records(&analysis, source)?;
    let records = store.add_expenses(owner_id, &planned, RECEIPT_ACTOR)?;

    let outcome = ReceiptOutcome {
        merchant: analysis.merchant.clone(),
        tax_rate_percent: analysis.tax_rate.percent(),
        items_on_receipt: analysis.items.len(),
        total: round_cents(records.iter().map(|r| r.total_price).sum()),
        records,
    };
    info!("Recorded receipt for {}: {}", owner_id, outcome.summary());

    Ok(outcome)
}

/// Full flow: analysis request, normalization, write
pub async fn analyze_and_record(
    analyzer: &dyn ReceiptAnalyzer,
    store: &ExpenseStore,
    owner_id: &str,
    image: &ReceiptImage,
) -> Result<ReceiptOutcome, LedgerError> {
    let text = analyzer.analyze(image).await?;
    record_receipt(store, owner_id, &text, &image.source_tag()).map_err(|e| {
        warn!("Receipt {} not recorded: {}", image.source_tag(), e);
        e
    })
}
