// Expense Ledger - Core Library
// Exposes the ledger core for the CLI, the TUI, and tests

pub mod aggregator;
pub mod error;
pub mod ledger;
pub mod menu;
pub mod persistor;
pub mod storage;
pub mod tracker;

// Only compile the full-screen UI when the TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use aggregator::{partition_bounds, Aggregator, PartialResult, DEFAULT_PARTITIONS};
pub use error::{LedgerError, Result};
pub use ledger::{parse_amount, Entry, Ledger};
pub use menu::{run_menu, MenuChoice, MenuExit};
pub use persistor::{
    AsyncPersistor, TaskHandle, TaskReport, TaskState, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use storage::{
    LedgerSink, LedgerSource, LoadOutcome, SqliteStore, Store, StoreKind, TextFileStore,
    WriterSink,
};
pub use tracker::{ExpenseTracker, LoadStatus, TrackerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
