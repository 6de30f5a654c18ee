// 🔎 Ledger View queries - client-side filter, search, paginate
// Operates on a snapshot; nothing here touches the database.

use crate::db::{display_date, ExpenseRecord};
use crate::tax::round_cents;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: usize = 25;
pub const MAX_PER_PAGE: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxYearFilter {
    #[default]
    All,
    Year(i32),
}

impl TaxYearFilter {
    /// "" / "all" → All; "2024" → Year(2024); anything else → None
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Some(TaxYearFilter::All);
        }
        trimmed.parse().ok().map(TaxYearFilter::Year)
    }

    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        match self {
            TaxYearFilter::All => true,
            TaxYearFilter::Year(year) => record.date.year() == *year,
        }
    }

    pub fn label(&self) -> String {
        match self {
            TaxYearFilter::All => "All Years".to_string(),
            TaxYearFilter::Year(year) => year.to_string(),
        }
    }

    /// Cycle All → newest year → … → oldest year → All
    pub fn next(&self, years: &[i32]) -> Self {
        match self {
            TaxYearFilter::All => years.first().map(|y| TaxYearFilter::Year(*y)).unwrap_or_default(),
            TaxYearFilter::Year(current) => years
                .iter()
                .position(|y| y == current)
                .and_then(|i| years.get(i + 1))
                .map(|y| TaxYearFilter::Year(*y))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseQuery {
    pub search: String,
    pub tax_year: TaxYearFilter,
}

impl ExpenseQuery {
    pub fn new(search: &str, tax_year: TaxYearFilter) -> Self {
        Self {
            search: search.to_string(),
            tax_year,
        }
    }

    /// Merchant or item name (case-insensitive), or either date form
    pub fn matches_search(&self, record: &ExpenseRecord) -> bool {
        let needle = self.search.trim();
        if needle.is_empty() {
            return true;
        }
        let lowered = needle.to_lowercase();

        record.merchant.to_lowercase().contains(&lowered)
            || record.item_name.to_lowercase().contains(&lowered)
            || record.date.format("%Y-%m-%d").to_string().contains(needle)
            || display_date(record.date).contains(needle)
    }

    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        self.tax_year.matches(record) && self.matches_search(record)
    }
}

pub fn filter_expenses(records: &[ExpenseRecord], query: &ExpenseQuery) -> Vec<ExpenseRecord> {
    records.iter().filter(|r| query.matches(r)).cloned().collect()
}

/// Distinct tax years, newest first
pub fn tax_years(records: &[ExpenseRecord]) -> Vec<i32> {
    let mut years: Vec<i32> = records.iter().map(|r| r.date.year()).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

pub fn total_for(records: &[ExpenseRecord]) -> f64 {
    round_cents(records.iter().map(|r| r.total_price).sum())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// 1-based pagination; pages past the end are empty
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let page = page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page);

    let start = (page - 1).saturating_mul(per_page);
    let slice = if start < total_items {
        let end = (start + per_page).min(total_items);
        items[start..end].to_vec()
    } else {
        Vec::new()
    };

    Page {
        items: slice,
        page,
        per_page,
        total_items,
        total_pages,
    }
}
