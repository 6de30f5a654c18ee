// HSA Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod tax;
pub mod normalizer;
pub mod db;
pub mod store;
pub mod auth;
pub mod config;
pub mod analyzer;
pub mod ledger;
pub mod query;
pub mod export;
pub mod summary;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ErrorCategory, ExtractionError, LedgerError};
pub use tax::{apportion, round_cents, Apportioned, TaxRate};
pub use normalizer::{
    clean_json_text, parse_lenient_json, parse_receipt_text, ReceiptAnalysis, ReceiptItem,
};
pub use db::{
    display_date, parse_expense_date, open_database, setup_database,
    ExpenseRecord, ExpenseUpdate, NewExpense, Event,
    insert_expenses, get_expense, get_expenses_for_owner, update_expense, delete_expense,
    count_expenses, insert_event, get_events_for_entity,
};
pub use store::{ChangeKind, ExpenseStore, LedgerChange, Subscription};
pub use auth::{bearer_token, Identity, StaticTokenVerifier, TokenEntry, TokenVerifier};
pub use config::{AnalyzerConfig, AppConfig};
pub use analyzer::{prepare_analysis_text, GeminiAnalyzer, ReceiptAnalyzer, ReceiptImage};
pub use ledger::{
    analyze_and_record, plan_receipt_records, record_receipt, ManualExpense, ReceiptOutcome,
};
pub use query::{filter_expenses, paginate, tax_years, total_for, ExpenseQuery, Page, TaxYearFilter};
pub use export::{export_filename, export_to_file, write_export, ExportSummary};
pub use summary::{merchant_totals, monthly_totals, summarize, LedgerSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
