// 📡 Expense Store - shared connection + change feed
//
// Every write publishes a `LedgerChange`. Subscribers never receive diffs:
// each change for their owner yields a fresh full snapshot.

use crate::db::{
    self, count_expenses, delete_expense, get_expense, get_expenses_for_owner, insert_expenses,
    update_expense, ExpenseRecord, ExpenseUpdate, NewExpense,
};
use crate::error::LedgerError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Added(usize),
    Updated(String),
    Deleted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerChange {
    pub owner_id: String,
    pub kind: ChangeKind,
}

#[derive(Clone)]
pub struct ExpenseStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<LedgerChange>,
}

impl ExpenseStore {
    /// Wrap a connection whose schema is already set up
    pub fn new(conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::setup_database(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Storage(anyhow::anyhow!("database lock poisoned")))
    }

    fn notify(&self, owner_id: &str, kind: ChangeKind) {
        let change = LedgerChange {
            owner_id: owner_id.to_string(),
            kind,
        };
        // No subscribers is fine
        if self.changes.send(change).is_err() {
            debug!("No ledger subscribers for {}", owner_id);
        }
    }

    /// Validate and write a batch atomically
    pub fn add_expenses(
        &self,
        owner_id: &str,
        expenses: &[NewExpense],
        actor: &str,
    ) -> Result<Vec<ExpenseRecord>, LedgerError> {
        for expense in expenses {
            expense.validate().map_err(LedgerError::InvalidRequest)?;
        }
        if expenses.is_empty() {
            return Ok(Vec::new());
        }

        let inserted = {
            let mut conn = self.lock()?;
            insert_expenses(&mut conn, owner_id, expenses, actor)?
        };

        self.notify(owner_id, ChangeKind::Added(inserted.len()));
        Ok(inserted)
    }

    pub fn add_expense(
        &self,
        owner_id: &str,
        expense: NewExpense,
    ) -> Result<ExpenseRecord, LedgerError> {
        self.add_expenses(owner_id, std::slice::from_ref(&expense), owner_id)?
            .pop()
            .ok_or_else(|| LedgerError::Storage(anyhow::anyhow!("insert returned no record")))
    }

    pub fn list(&self, owner_id: &str) -> Result<Vec<ExpenseRecord>, LedgerError> {
        let conn = self.lock()?;
        Ok(get_expenses_for_owner(&conn, owner_id)?)
    }

    pub fn get(&self, owner_id: &str, id: &str) -> Result<ExpenseRecord, LedgerError> {
        let conn = self.lock()?;
        get_expense(&conn, owner_id, id)?.ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    pub fn count(&self, owner_id: &str) -> Result<i64, LedgerError> {
        let conn = self.lock()?;
        Ok(count_expenses(&conn, owner_id)?)
    }

    /// Inline edit. Concurrent edits of the same record: last write wins.
    pub fn update(
        &self,
        owner_id: &str,
        id: &str,
        update: &ExpenseUpdate,
    ) -> Result<ExpenseRecord, LedgerError> {
        if update.is_empty() {
            return Err(LedgerError::InvalidRequest("nothing to update".to_string()));
        }
        for (field, value) in [("merchant", &update.merchant), ("itemName", &update.item_name)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(LedgerError::InvalidRequest(format!("{} cannot be empty", field)));
            }
        }

        let updated = {
            let conn = self.lock()?;
            update_expense(&conn, owner_id, id, update, owner_id)?
        }
        .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if !updated.is_consistent() {
            debug!(
                "Expense {} total {:.2} differs from price + tax {:.2}",
                id,
                updated.total_price,
                updated.price + updated.tax
            );
        }

        self.notify(owner_id, ChangeKind::Updated(id.to_string()));
        Ok(updated)
    }

    pub fn delete(&self, owner_id: &str, id: &str) -> Result<(), LedgerError> {
        let deleted = {
            let conn = self.lock()?;
            delete_expense(&conn, owner_id, id, owner_id)?
        };

        if !deleted {
            return Err(LedgerError::NotFound(id.to_string()));
        }

        self.notify(owner_id, ChangeKind::Deleted(id.to_string()));
        Ok(())
    }

    /// Real-time view of one owner's expenses
    pub fn subscribe(&self, owner_id: &str) -> Subscription {
        Subscription {
            store: self.clone(),
            owner_id: owner_id.to_string(),
            receiver: self.changes.subscribe(),
            primed: false,
        }
    }
}

/// Full-collection snapshots for one owner
///
/// The first delivery is the current state; after that one snapshot per
/// relevant change. A lagging subscriber just gets the latest snapshot.
pub struct Subscription {
    store: ExpenseStore,
    owner_id: String,
    receiver: broadcast::Receiver<LedgerChange>,
    primed: bool,
}

impl Subscription {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn snapshot(&self) -> Result<Vec<ExpenseRecord>, LedgerError> {
        self.store.list(&self.owner_id)
    }

    /// Wait for the next snapshot; `None` once the feed is closed
    pub async fn next_snapshot(&mut self) -> Option<Result<Vec<ExpenseRecord>, LedgerError>> {
        if !self.primed {
            self.primed = true;
            return Some(self.snapshot());
        }

        loop {
            match self.receiver.recv().await {
                Ok(change) if change.owner_id == self.owner_id => return Some(self.snapshot()),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber for {} lagged by {} changes", self.owner_id, skipped);
                    return Some(self.snapshot());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for callers without a runtime (the terminal UI)
    pub fn try_snapshot(&mut self) -> Option<Result<Vec<ExpenseRecord>, LedgerError>> {
        let mut changed = !self.primed;
        self.primed = true;

        loop {
            match self.receiver.try_recv() {
                Ok(change) => changed |= change.owner_id == self.owner_id,
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        changed.then(|| self.snapshot())
    }
}
