// 📊 Chart series for the dashboard
// Data only; rendering belongs to the front end.

use crate::db::ExpenseRecord;
use crate::tax::round_cents;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotal {
    pub month: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantTotal {
    pub merchant: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementSplit {
    pub reimbursed: f64,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub total: f64,
    pub count: usize,
    pub monthly: Vec<MonthTotal>,
    pub by_merchant: Vec<MerchantTotal>,
    pub reimbursement: ReimbursementSplit,
}

/// Twelve buckets, January first, across every year in `records`
pub fn monthly_totals(records: &[ExpenseRecord]) -> Vec<MonthTotal> {
    let mut buckets = [(0.0_f64, 0_usize); 12];
    for record in records {
        let bucket = &mut buckets[record.date.month0() as usize];
        bucket.0 += record.total_price;
        bucket.1 += 1;
    }

    MONTHS
        .iter()
        .zip(buckets.iter())
        .map(|(month, (total, count))| MonthTotal {
            month: month.to_string(),
            total: round_cents(*total),
            count: *count,
        })
        .collect()
}

/// Largest spend first; ties broken by name
pub fn merchant_totals(records: &[ExpenseRecord]) -> Vec<MerchantTotal> {
    let mut by_merchant: HashMap<&str, (f64, usize)> = HashMap::new();
    for record in records {
        let entry = by_merchant.entry(record.merchant.as_str()).or_insert((0.0, 0));
        entry.0 += record.total_price;
        entry.1 += 1;
    }

    let mut result: Vec<MerchantTotal> = by_merchant
        .into_iter()
        .map(|(merchant, (total, count))| MerchantTotal {
            merchant: merchant.to_string(),
            total: round_cents(total),
            count,
        })
        .collect();

    result.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });
    result
}

pub fn reimbursement_split(records: &[ExpenseRecord]) -> ReimbursementSplit {
    let (reimbursed, outstanding) = records.iter().fold((0.0, 0.0), |(done, open), r| {
        if r.reimbursed {
            (done + r.total_price, open)
        } else {
            (done, open + r.total_price)
        }
    });
    ReimbursementSplit {
        reimbursed: round_cents(reimbursed),
        outstanding: round_cents(outstanding),
    }
}

pub fn summarize(records: &[ExpenseRecord]) -> LedgerSummary {
    LedgerSummary {
        total: round_cents(records.iter().map(|r| r.total_price).sum()),
        count: records.len(),
        monthly: monthly_totals(records),
        by_merchant: merchant_totals(records),
        reimbursement: reimbursement_split(records),
    }
}
