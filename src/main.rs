// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hsa_ledger::{
    analyze_and_record, export_filename, export_to_file, filter_expenses, prepare_analysis_text,
    tax_years, total_for, AppConfig, ExpenseQuery, ExpenseStore, GeminiAnalyzer, ManualExpense,
    ReceiptAnalyzer, ReceiptImage, TaxYearFilter,
};
use chrono::Datelike;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "hsa-ledger", version, about = "HSA receipt ledger")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true, env = "HSA_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Ledger owner the command acts for
    #[arg(long, global = true, env = "HSA_LEDGER_OWNER", default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Terminal ledger view (default)
    Ui {
        /// Where exports are written
        #[arg(long, default_value = ".")]
        export_dir: PathBuf,
    },
    /// Analyze a receipt image and record its HSA-eligible items
    Analyze {
        image: PathBuf,
        /// Print the analysis text without recording anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Record an expense by hand
    Add {
        /// Purchase date, e.g. 2024-03-01
        #[arg(long)]
        date: String,
        #[arg(long)]
        merchant: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value_t = 0.0)]
        tax: f64,
        /// Defaults to price + tax
        #[arg(long)]
        total: Option<f64>,
        #[arg(long)]
        not_eligible: bool,
        #[arg(long)]
        reimbursed: bool,
    },
    /// Write the filtered ledger to CSV
    Export {
        /// Tax year, or "all"
        #[arg(long, default_value = "all")]
        year: String,
        #[arg(long, default_value = "")]
        search: String,
        /// Output file; defaults to HSA_Expenses_<year>.csv
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List tax years with totals
    Years,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Ui {
        export_dir: PathBuf::from("."),
    });

    // The terminal belongs to the UI; everything else logs to stderr
    if !matches!(command, Command::Ui { .. }) {
        init_logging();
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    let store = ExpenseStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    match command {
        Command::Ui { export_dir } => run_ui_mode(store, &cli.owner, export_dir),
        Command::Analyze { image, dry_run } => run_analyze(&config, &store, &cli.owner, &image, dry_run),
        Command::Add {
            date,
            merchant,
            item,
            price,
            tax,
            total,
            not_eligible,
            reimbursed,
        } => {
            let manual = ManualExpense {
                date,
                merchant,
                item_name: item,
                price,
                tax,
                total_price: total,
                hsa_eligible: !not_eligible,
                reimbursed,
            };
            let record = store.add_expense(&cli.owner, manual.into_new_expense()?)?;
            println!(
                "✓ Added {} / {} on {}: ${:.2}",
                record.merchant, record.item_name, record.date, record.total_price
            );
            Ok(())
        }
        Command::Export { year, search, out } => run_export(&store, &cli.owner, &year, &search, out),
        Command::Years => run_years(&store, &cli.owner),
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hsa_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_analyze(
    config: &AppConfig,
    store: &ExpenseStore,
    owner: &str,
    image_path: &Path,
    dry_run: bool,
) -> Result<()> {
    let analyzer = GeminiAnalyzer::new(config.analyzer.clone())?;
    if !analyzer.is_configured() {
        anyhow::bail!("Gemini API key not configured (set GEMINI_API_KEY)");
    }
    let image = ReceiptImage::from_file(image_path)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    println!("🔍 Analyzing {:?}...", image_path);
    if dry_run {
        let raw = runtime.block_on(analyzer.analyze(&image))?;
        println!("{}", prepare_analysis_text(&raw));
        return Ok(());
    }

    match runtime.block_on(analyze_and_record(&analyzer, store, owner, &image)) {
        Ok(outcome) => {
            println!("✓ {}", outcome.summary());
            for record in &outcome.records {
                println!(
                    "   {:<32} {:>8.2} + {:>6.2} = {:>8.2}",
                    record.item_name, record.price, record.tax, record.total_price
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {}", e.user_message());
            Err(e.into())
        }
    }
}

fn parse_year(year: &str) -> Result<TaxYearFilter> {
    TaxYearFilter::parse(year).with_context(|| format!("Invalid tax year '{}'", year))
}

fn run_export(
    store: &ExpenseStore,
    owner: &str,
    year: &str,
    search: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let query = ExpenseQuery::new(search, parse_year(year)?);
    let records = store.list(owner)?;
    let filtered = filter_expenses(&records, &query);

    let path = out.unwrap_or_else(|| PathBuf::from(export_filename(query.tax_year)));
    let summary = export_to_file(&filtered, &path)?;

    println!(
        "✓ Exported {} rows to {:?} (total ${:.2})",
        summary.rows_written, path, summary.total
    );
    Ok(())
}

fn run_years(store: &ExpenseStore, owner: &str) -> Result<()> {
    let records = store.list(owner)?;
    let years = tax_years(&records);

    if years.is_empty() {
        println!("No expenses recorded yet");
        return Ok(());
    }

    println!("{:<10} {:>6} {:>12}", "Tax Year", "Items", "Total");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for year in years {
        let in_year: Vec<_> = records
            .iter()
            .filter(|r| r.date.year() == year)
            .cloned()
            .collect();
        println!("{:<10} {:>6} {:>12.2}", year, in_year.len(), total_for(&in_year));
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{:<10} {:>6} {:>12.2}", "All", records.len(), total_for(&records));

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(store: ExpenseStore, owner: &str, export_dir: PathBuf) -> Result<()> {
    println!("🖥️  Loading HSA ledger for {}...\n", owner);

    let mut app = ui::App::new(store, owner, export_dir);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_store: ExpenseStore, _owner: &str, _export_dir: PathBuf) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run the API server: cargo run --bin hsa-server --features server");
    std::process::exit(1);
}
