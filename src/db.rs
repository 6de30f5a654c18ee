use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

/// Date formats accepted on input, most specific first.
/// `%Y` also reads "24" as year 24, so four-digit forms are tried before
/// the two-digit ones and every result must pass `is_plausible_year`.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%B %d, %y",
    "%b %d, %y",
];

const EARLIEST_YEAR: i32 = 1900;

fn is_plausible_year(date: &NaiveDate) -> bool {
    (EARLIEST_YEAR..=Utc::now().year() + 1).contains(&date.year())
}

fn parse_with_formats(input: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .find(is_plausible_year)
}

/// Parse an expense date in any of the accepted formats
///
/// Two-digit years follow chrono's pivot (00-68 → 20xx). Years before 1900
/// or after next year are rejected.
pub fn parse_expense_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    // ISO timestamps ("2024-03-01T00:00:00Z") keep only the date part
    let candidate = input.split('T').next().unwrap_or(input);
    parse_with_formats(candidate).or_else(|| parse_with_formats(input))
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| {
            parse_expense_date(&raw).ok_or_else(|| {
                serde::de::Error::custom(format!("unrecognized date '{}'", raw))
            })
        })
        .transpose()
}

/// Long display form used by the ledger and export ("March 1, 2024")
pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// One row of the `expenses` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    /// Store-generated identity (UUID v4)
    pub id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub item_name: String,
    pub price: f64,
    pub tax: f64,
    pub total_price: f64,
    pub hsa_eligible: bool,
    /// Already paid back from the HSA
    pub reimbursed: bool,
    pub owner_id: String,
    /// "manual" or "receipt:<fingerprint>"
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExpenseRecord {
    /// totalPrice ≈ price + tax, within half a cent
    pub fn is_consistent(&self) -> bool {
        (self.total_price - (self.price + self.tax)).abs() < 0.005
    }
}

/// Record to be created (identity and timestamps assigned on insert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub date: NaiveDate,
    pub merchant: String,
    pub item_name: String,
    pub price: f64,
    pub tax: f64,
    pub total_price: f64,
    pub hsa_eligible: bool,
    #[serde(default)]
    pub reimbursed: bool,
    pub source: String,
}

impl NewExpense {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.merchant.trim().is_empty() {
            return Err("merchant is required".to_string());
        }
        if self.item_name.trim().is_empty() {
            return Err("item name is required".to_string());
        }
        for (field, value) in [
            ("price", self.price),
            ("tax", self.tax),
            ("totalPrice", self.total_price),
        ] {
            if !value.is_finite() {
                return Err(format!("{} must be a number", field));
            }
        }
        Ok(())
    }
}

/// Inline edit: only the provided fields change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    /// Any format `parse_expense_date` accepts
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub date: Option<NaiveDate>,
    pub merchant: Option<String>,
    pub item_name: Option<String>,
    pub price: Option<f64>,
    pub tax: Option<f64>,
    pub total_price: Option<f64>,
    pub hsa_eligible: Option<bool>,
    pub reimbursed: Option<bool>,
}

impl ExpenseUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ExpenseUpdate::default()
    }

    pub fn apply(&self, record: &ExpenseRecord) -> ExpenseRecord {
        let mut updated = record.clone();
        if let Some(date) = self.date {
            updated.date = date;
        }
        if let Some(merchant) = &self.merchant {
            updated.merchant = merchant.clone();
        }
        if let Some(item_name) = &self.item_name {
            updated.item_name = item_name.clone();
        }
        if let Some(price) = self.price {
            updated.price = price;
        }
        if let Some(tax) = self.tax {
            updated.tax = tax;
        }
        if let Some(total_price) = self.total_price {
            updated.total_price = total_price;
        }
        if let Some(hsa_eligible) = self.hsa_eligible {
            updated.hsa_eligible = hsa_eligible;
        }
        if let Some(reimbursed) = self.reimbursed {
            updated.reimbursed = reimbursed;
        }
        updated
    }
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            date TEXT NOT NULL,
            merchant TEXT NOT NULL,
            item_name TEXT NOT NULL,
            price REAL NOT NULL,
            tax REAL NOT NULL,
            total_price REAL NOT NULL,
            hsa_eligible INTEGER NOT NULL DEFAULT 0,
            reimbursed INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT 'manual',
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_owner ON expenses(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Open (or create) the ledger database at `path`
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    setup_database(&conn).context("Failed to initialize database schema")?;
    info!("Database opened: {:?}", path);
    Ok(conn)
}

const EXPENSE_COLUMNS: &str = "id, owner_id, date, merchant, item_name, price, tax, total_price,
    hsa_eligible, reimbursed, source, created_at, updated_at";

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_expense(row: &Row) -> rusqlite::Result<ExpenseRecord> {
    let date_str: String = row.get(2)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: Option<String> = row.get(12)?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(ExpenseRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        date,
        merchant: row.get(3)?,
        item_name: row.get(4)?,
        price: row.get(5)?,
        tax: row.get(6)?,
        total_price: row.get(7)?,
        hsa_eligible: row.get(8)?,
        reimbursed: row.get(9)?,
        source: row.get(10)?,
        created_at: parse_timestamp(11, &created_at_str)?,
        updated_at: updated_at_str
            .map(|s| parse_timestamp(12, &s))
            .transpose()?,
    })
}

/// Insert a batch of expenses in one SQLite transaction
///
/// Either every record is written or none is.
pub fn insert_expenses(
    conn: &mut Connection,
    owner_id: &str,
    expenses: &[NewExpense],
    actor: &str,
) -> Result<Vec<ExpenseRecord>> {
    let tx = conn.transaction().context("Failed to begin transaction")?;
    let mut inserted = Vec::with_capacity(expenses.len());

    for expense in expenses {
        let record = ExpenseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            date: expense.date,
            merchant: expense.merchant.clone(),
            item_name: expense.item_name.clone(),
            price: expense.price,
            tax: expense.tax,
            total_price: expense.total_price,
            hsa_eligible: expense.hsa_eligible,
            reimbursed: expense.reimbursed,
            owner_id: owner_id.to_string(),
            source: expense.source.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };

        tx.execute(
            "INSERT INTO expenses (
                id, owner_id, date, merchant, item_name, price, tax, total_price,
                hsa_eligible, reimbursed, source, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id,
                record.owner_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.merchant,
                record.item_name,
                record.price,
                record.tax,
                record.total_price,
                record.hsa_eligible,
                record.reimbursed,
                record.source,
                record.created_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to insert expense '{}'", record.item_name))?;

        let event = Event::new(
            "expense_added",
            "expense",
            &record.id,
            serde_json::json!({
                "owner": record.owner_id,
                "total": record.total_price,
                "source": record.source,
            }),
            actor,
        );
        insert_event(&tx, &event)?;

        inserted.push(record);
    }

    tx.commit().context("Failed to commit expenses")?;
    debug!("Inserted {} expenses for {}", inserted.len(), owner_id);

    Ok(inserted)
}

pub fn get_expense(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<ExpenseRecord>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE owner_id = ?1 AND id = ?2",
        EXPENSE_COLUMNS
    );
    let record = conn
        .query_row(&sql, params![owner_id, id], row_to_expense)
        .optional()?;
    Ok(record)
}

/// All of an owner's expenses, newest first
pub fn get_expenses_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<ExpenseRecord>> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE owner_id = ?1 ORDER BY date DESC, created_at DESC",
        EXPENSE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let expenses = stmt
        .query_map([owner_id], row_to_expense)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expenses)
}

/// Apply an inline edit; `None` when the record does not exist for this owner
pub fn update_expense(
    conn: &Connection,
    owner_id: &str,
    id: &str,
    update: &ExpenseUpdate,
    actor: &str,
) -> Result<Option<ExpenseRecord>> {
    let current = match get_expense(conn, owner_id, id)? {
        Some(record) => record,
        None => return Ok(None),
    };

    let mut updated = update.apply(&current);
    updated.updated_at = Some(Utc::now());

    // The row and its audit event land together or not at all
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin transaction")?;
    tx.execute(
        "UPDATE expenses
         SET date = ?1, merchant = ?2, item_name = ?3, price = ?4, tax = ?5,
             total_price = ?6, hsa_eligible = ?7, reimbursed = ?8, updated_at = ?9
         WHERE owner_id = ?10 AND id = ?11",
        params![
            updated.date.format("%Y-%m-%d").to_string(),
            updated.merchant,
            updated.item_name,
            updated.price,
            updated.tax,
            updated.total_price,
            updated.hsa_eligible,
            updated.reimbursed,
            updated.updated_at.map(|dt| dt.to_rfc3339()),
            owner_id,
            id,
        ],
    )?;

    let event = Event::new(
        "expense_updated",
        "expense",
        id,
        serde_json::to_value(update)?,
        actor,
    );
    insert_event(&tx, &event)?;
    tx.commit().context("Failed to commit expense update")?;

    Ok(Some(updated))
}

/// Delete one expense; returns false when nothing matched
pub fn delete_expense(conn: &Connection, owner_id: &str, id: &str, actor: &str) -> Result<bool> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin transaction")?;
    let deleted = tx.execute(
        "DELETE FROM expenses WHERE owner_id = ?1 AND id = ?2",
        params![owner_id, id],
    )?;

    if deleted > 0 {
        let event = Event::new(
            "expense_deleted",
            "expense",
            id,
            serde_json::json!({ "owner": owner_id }),
            actor,
        );
        insert_event(&tx, &event)?;
    }
    tx.commit().context("Failed to commit expense delete")?;

    Ok(deleted > 0)
}

pub fn count_expenses(conn: &Connection, owner_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM expenses WHERE owner_id = ?1",
        [owner_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
