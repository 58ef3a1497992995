// 🧾 Expense Tracker - The one concrete ledger-operations surface
// add / list / total / persist, plus the startup load.
// Every front end (menu, TUI, one-shot CLI commands) goes through here.

use crate::aggregator::{Aggregator, PartialResult, DEFAULT_PARTITIONS};
use crate::error::Result;
use crate::ledger::{Entry, Ledger};
use crate::persistor::{AsyncPersistor, TaskHandle, TaskReport, DEFAULT_POLL_INTERVAL};
use crate::storage::{LedgerSink, LedgerSource, LoadOutcome, Store};
use rust_decimal::Decimal;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::info;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Workers used by the aggregator
    pub partitions: NonZeroUsize,
    /// Upper bound between completion checks while waiting on a save
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            partitions: NonZeroUsize::new(DEFAULT_PARTITIONS).unwrap_or(NonZeroUsize::MIN),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ============================================================================
// LOAD STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Fresh,
    Loaded { count: usize },
}

impl LoadStatus {
    pub fn message(&self, store: &Store) -> String {
        match self {
            LoadStatus::Fresh => "No existing file found. Starting fresh.".to_string(),
            LoadStatus::Loaded { .. } => {
                format!("Loaded expenses from file: {}", store.path().display())
            }
        }
    }
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct ExpenseTracker {
    ledger: Ledger,
    aggregator: Aggregator,
    store: Store,
    config: TrackerConfig,
}

impl ExpenseTracker {
    pub fn new(store: Store, config: TrackerConfig) -> Self {
        Self {
            ledger: Ledger::new(),
            aggregator: Aggregator::new(config.partitions),
            store,
            config,
        }
    }

    /// New tracker with the store's contents already loaded.
    pub fn open(store: Store, config: TrackerConfig) -> Result<(Self, LoadStatus)> {
        let mut tracker = Self::new(store, config);
        let status = tracker.load()?;
        Ok((tracker, status))
    }

    /// Bulk-load from the configured store. A missing store is not an error.
    pub fn load(&mut self) -> Result<LoadStatus> {
        match self.store.load()? {
            LoadOutcome::Missing => Ok(LoadStatus::Fresh),
            LoadOutcome::Loaded { entries } => {
                let count = entries.len();
                self.ledger.extend(entries);
                Ok(LoadStatus::Loaded { count })
            }
        }
    }

    /// Validate and append one entry.
    pub fn add(&mut self, category: &str, input_amount: &str) -> Result<&Entry> {
        let entry = Entry::parse(category, input_amount)?;
        info!(category = entry.category(), amount = %entry.amount(), "expense added");
        self.ledger.append(entry);
        Ok(&self.ledger.entries()[self.ledger.len() - 1])
    }

    pub fn list(&self) -> &[Entry] {
        self.ledger.entries()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn total(&self) -> Result<Decimal> {
        self.aggregator.total(self.ledger.entries())
    }

    /// Per-partition sums behind [`total`](Self::total), in partition order.
    pub fn partial_sums(&self) -> Result<Vec<PartialResult>> {
        self.aggregator.partial_sums(self.ledger.entries())
    }

    /// Start saving a snapshot of the ledger to the configured store.
    pub fn persist(&self) -> Result<TaskHandle> {
        self.persist_to(self.store.clone())
    }

    /// Start saving a snapshot of the ledger to any sink.
    pub fn persist_to<S>(&self, sink: S) -> Result<TaskHandle>
    where
        S: LedgerSink + 'static,
    {
        AsyncPersistor::start(self.ledger.snapshot(), sink)
    }

    /// Persist and block until the task is terminal.
    pub fn save_and_wait(&self) -> Result<TaskReport> {
        let handle = self.persist()?;
        Ok(handle.wait(self.config.poll_interval))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::persistor::TaskState;
    use crate::storage::StoreKind;
    use rust_decimal_macros::dec;

    fn tracker_in(dir: &tempfile::TempDir, kind: StoreKind) -> ExpenseTracker {
        let store = Store::open(kind, dir.path().join("expenses"));
        ExpenseTracker::new(store, TrackerConfig::default())
    }

    #[test]
    fn test_add_list_total() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_in(&dir, StoreKind::Text);

        assert!(matches!(tracker.total().unwrap_err(), LedgerError::EmptyLedger));

        tracker.add("food", "12.50").unwrap();
        tracker.add("rent", "800.00").unwrap();
        let last = tracker.add("food", "3.25").unwrap();
        assert_eq!(last.amount(), dec!(3.25));

        assert_eq!(tracker.list().len(), 3);
        assert_eq!(tracker.total().unwrap(), dec!(815.75));

        let partials = tracker.partial_sums().unwrap();
        assert_eq!(partials.len(), 4);
        let json = serde_json::to_value(&partials).unwrap();
        assert_eq!(json[2]["partition_index"], 2);
        assert_eq!(json[2]["sum"], "800.00");
    }

    #[test]
    fn test_validation_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_in(&dir, StoreKind::Text);

        assert!(tracker.add("food", "abc").unwrap_err().is_validation());
        assert!(tracker.add("food", "-1").unwrap_err().is_validation());
        assert!(tracker.list().is_empty());
    }

    #[test]
    fn test_open_missing_store_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreKind::Text, dir.path().join("nope.txt"));
        let (tracker, status) = ExpenseTracker::open(store, TrackerConfig::default()).unwrap();

        assert_eq!(status, LoadStatus::Fresh);
        assert_eq!(
            status.message(tracker.store()),
            "No existing file found. Starting fresh."
        );
        assert!(tracker.list().is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        for kind in [StoreKind::Text, StoreKind::Sqlite] {
            let dir = tempfile::tempdir().unwrap();
            let mut tracker = tracker_in(&dir, kind);
            tracker.add("food", "12.50").unwrap();
            tracker.add("rent", "800").unwrap();

            let report = tracker.save_and_wait().unwrap();
            assert_eq!(report.state, TaskState::Succeeded);
            assert_eq!(report.entries_written, 2);

            let store = Store::open(kind, dir.path().join("expenses"));
            let (reopened, status) = ExpenseTracker::open(store, TrackerConfig::default()).unwrap();
            assert_eq!(status, LoadStatus::Loaded { count: 2 });
            assert_eq!(reopened.list(), tracker.list());
        }
    }

    #[test]
    fn test_failed_save_keeps_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreKind::Text, dir.path().join("missing").join("expenses.txt"));
        let mut tracker = ExpenseTracker::new(store, TrackerConfig::default());
        tracker.add("food", "1").unwrap();

        let report = tracker.save_and_wait().unwrap();
        assert_eq!(report.state, TaskState::Failed);
        assert!(report.error.is_some());
        assert_eq!(tracker.list().len(), 1);
    }
}
