use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use expense_ledger::{
    run_menu, ExpenseTracker, LedgerError, MenuExit, Store, StoreKind, TrackerConfig,
};
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Personal expense tracker: record, list, total and save categorized expenses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Ledger file (text) or database (sqlite)
    #[arg(short, long, env = "EXPENSE_LEDGER_FILE", default_value = "expenses.txt")]
    file: PathBuf,

    /// Storage backend
    #[arg(long, env = "EXPENSE_LEDGER_STORE", value_enum, default_value_t = StoreKind::Text)]
    store: StoreKind,

    /// Parallel workers used to compute the total
    #[arg(short, long, env = "EXPENSE_LEDGER_WORKERS", default_value = "4")]
    workers: NonZeroUsize,

    /// Upper bound between completion checks while a save is running
    #[arg(long, env = "EXPENSE_LEDGER_POLL_MS", default_value_t = 50)]
    poll_interval_ms: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Numbered interactive menu (default)
    Menu,
    /// Full-screen terminal UI
    #[cfg(feature = "tui")]
    Tui,
    /// Print every recorded expense
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the total of every recorded expense
    Total {
        #[arg(long)]
        json: bool,
    },
    /// Record one expense and save immediately
    Add { category: String, amount: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Menu);

    #[cfg(feature = "tui")]
    let to_file = matches!(command, Command::Tui);
    #[cfg(not(feature = "tui"))]
    let to_file = false;
    let _guard = init_tracing(&args.log_level, to_file);

    let config = TrackerConfig {
        partitions: args.workers,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };
    let store = Store::open(args.store, &args.file);
    let (mut tracker, status) = ExpenseTracker::open(store, config)
        .with_context(|| format!("Failed to load ledger from {}", args.file.display()))?;
    info!(entries = tracker.list().len(), store = ?args.store, "tracker ready");

    match command {
        Command::Menu => {
            println!("{}", status.message(tracker.store()));
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut out = io::stdout();
            if run_menu(&mut tracker, &mut input, &mut out)? == MenuExit::EndOfInput {
                warn!("session ended without saving");
            }
        }
        #[cfg(feature = "tui")]
        Command::Tui => {
            let message = status.message(tracker.store());
            run_ui_mode(tracker, message)?
        }
        Command::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(tracker.list())?);
            } else if tracker.list().is_empty() {
                println!("No expenses recorded yet.");
            } else {
                for entry in tracker.list() {
                    println!("- {}", entry);
                }
            }
        }
        Command::Total { json } => match tracker.total() {
            Ok(total) if json => {
                let partitions = tracker.partial_sums()?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "entries": tracker.list().len(),
                        "partitions": partitions,
                        "total": total,
                    }))?
                );
            }
            Ok(total) => println!("Total spending: ${}", total),
            Err(LedgerError::EmptyLedger) => println!("{}", LedgerError::EmptyLedger),
            Err(err) => return Err(err.into()),
        },
        Command::Add { category, amount } => {
            let entry = tracker.add(&category, &amount)?;
            println!("Added expense: {} - ${}", entry.category(), entry.amount());

            let report = tracker.save_and_wait()?;
            if !report.succeeded() {
                let reason = report
                    .error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                bail!("Unable to save expenses to file: {}", reason);
            }
            println!("Expenses saved to file: {}", report.destination);
        }
    }

    Ok(())
}

/// Stderr logging for line modes; a log file for the TUI so the
/// alternate screen stays clean.
fn init_tracing(level: &str, to_file: bool) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("expense_ledger={level}")));

    if to_file {
        let file_appender = tracing_appender::rolling::never(".", "expense-ledger.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter)
            .init();
        None
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(tracker: ExpenseTracker, status: String) -> Result<()> {
    use expense_ledger::ui::{self, UiExit};

    let mut app = ui::App::new(tracker, status);
    match ui::run_ui(&mut app)? {
        UiExit::Saved => println!("{}", app.status),
        UiExit::Aborted => {
            warn!("UI closed without saving");
            println!("Exited without saving.");
        }
    }

    Ok(())
}
