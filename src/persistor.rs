// 🧵 Async Persistor - Background save with an observable completion signal
// Each start() gets its own task and handle; there is no process-wide flag.
//
// State machine:
//   Pending -> Running            (inside start, before the handle is returned)
//   Running -> Succeeded | Failed (exactly once, by the background thread)

use crate::error::{LedgerError, Result};
use crate::ledger::Entry;
use crate::storage::LedgerSink;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll interval actually used; a zero interval would spin.
pub fn effective_poll_interval(requested: Duration) -> Duration {
    requested.max(MIN_POLL_INTERVAL)
}

// ============================================================================
// TASK STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Point-in-time view of a persistence task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: Uuid,
    pub state: TaskState,
    pub entries_written: usize,
    pub error: Option<Arc<LedgerError>>,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Succeeded
    }
}

// ============================================================================
// SHARED TASK SLOT
// ============================================================================

struct TaskSlot {
    report: Mutex<TaskReport>,
    done: Condvar,
}

impl TaskSlot {
    fn lock(&self) -> MutexGuard<'_, TaskReport> {
        // The report is plain data; a panic while holding the lock cannot
        // leave it half-updated, so a poisoned lock is still usable.
        self.report.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, to: TaskState) {
        let mut report = self.lock();
        let from = report.state;
        debug_assert!(
            matches!(
                (from, to),
                (TaskState::Pending, TaskState::Running)
                    | (TaskState::Running, TaskState::Succeeded)
                    | (TaskState::Running, TaskState::Failed)
            ),
            "illegal task transition {from:?} -> {to:?}"
        );
        report.state = to;
        debug!(task = %report.id, ?from, ?to, "persistence task transition");
    }

    /// Move to a terminal state once; later calls are ignored.
    fn finish(&self, outcome: Result<usize>) {
        let mut report = self.lock();
        if report.state.is_terminal() {
            return;
        }

        report.finished_at = Some(Utc::now());
        match outcome {
            Ok(written) => {
                report.entries_written = written;
                report.state = TaskState::Succeeded;
                info!(task = %report.id, destination = %report.destination, entries = written, "ledger saved");
            }
            Err(err) => {
                if let LedgerError::SinkWrite { written, .. } = &err {
                    report.entries_written = *written;
                }
                error!(task = %report.id, destination = %report.destination, error = %err, "ledger save failed");
                report.error = Some(Arc::new(err));
                report.state = TaskState::Failed;
            }
        }
        drop(report);
        self.done.notify_all();
    }
}

/// Marks the task Failed if the worker unwinds before reporting.
struct CompletionGuard(Arc<TaskSlot>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            let id = self.0.lock().id.to_string();
            self.0.finish(Err(LedgerError::TaskPanicked(id)));
        }
    }
}

// ============================================================================
// TASK HANDLE
// ============================================================================

/// Caller's view of one background save.
#[derive(Clone)]
pub struct TaskHandle {
    slot: Arc<TaskSlot>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.slot.lock().id
    }

    pub fn state(&self) -> TaskState {
        self.slot.lock().state
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn error(&self) -> Option<Arc<LedgerError>> {
        self.slot.lock().error.clone()
    }

    pub fn report(&self) -> TaskReport {
        self.slot.lock().clone()
    }

    /// Block until the task is terminal.
    ///
    /// The thread sleeps on the completion signal and is woken as soon as
    /// the task finishes; `poll_interval` bounds each sleep, so the state is
    /// re-checked at most once per interval and never spun on. Intervals
    /// below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn wait(&self, poll_interval: Duration) -> TaskReport {
        let poll_interval = effective_poll_interval(poll_interval);
        let mut report = self.slot.lock();
        while !report.state.is_terminal() {
            report = match self.slot.done.wait_timeout(report, poll_interval) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        report.clone()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    /// Returns `None` if the task is still running.
    pub fn wait_timeout(&self, poll_interval: Duration, timeout: Duration) -> Option<TaskReport> {
        let poll_interval = effective_poll_interval(poll_interval);
        let deadline = std::time::Instant::now() + timeout;
        let mut report = self.slot.lock();
        while !report.state.is_terminal() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = poll_interval.min(deadline - now);
            report = match self.slot.done.wait_timeout(report, slice) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Some(report.clone())
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = self.slot.lock();
        f.debug_struct("TaskHandle")
            .field("id", &report.id)
            .field("state", &report.state)
            .finish()
    }
}

// ============================================================================
// PERSISTOR
// ============================================================================

pub struct AsyncPersistor;

impl AsyncPersistor {
    /// Start writing `entries` to `sink` on a background thread.
    ///
    /// The entries are moved into the task, so later changes to the caller's
    /// ledger are never observed. The returned handle is already `Running`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Spawn`] if the OS refuses to start the thread. Sink
    /// failures are reported through the handle, not here.
    pub fn start<S>(entries: Vec<Entry>, mut sink: S) -> Result<TaskHandle>
    where
        S: LedgerSink + 'static,
    {
        let id = Uuid::new_v4();
        let destination = sink.describe();
        let slot = Arc::new(TaskSlot {
            report: Mutex::new(TaskReport {
                id,
                state: TaskState::Pending,
                entries_written: 0,
                error: None,
                destination: destination.clone(),
                started_at: Utc::now(),
                finished_at: None,
            }),
            done: Condvar::new(),
        });

        slot.transition(TaskState::Running);
        info!(task = %id, destination = %destination, entries = entries.len(), "persistence task started");

        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("ledger-save-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let guard = CompletionGuard(Arc::clone(&worker_slot));
                let outcome = sink.write_all(&entries);
                worker_slot.finish(outcome);
                drop(guard);
            });

        if let Err(source) = spawned {
            error!(task = %id, error = %source, "failed to spawn persistence thread");
            return Err(LedgerError::Spawn(source));
        }

        Ok(TaskHandle { slot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{TextFileStore, WriterSink};
    use rust_decimal_macros::dec;
    use std::io::{self, Write};
    use std::sync::mpsc;
    use std::time::Instant;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::new("food", dec!(12.50)).unwrap(),
            Entry::new("rent", dec!(800.00)).unwrap(),
            Entry::new("food", dec!(3.25)).unwrap(),
        ]
    }

    /// Sink that blocks until the test releases it.
    struct GatedSink {
        gate: mpsc::Receiver<()>,
        fail: bool,
    }

    impl LedgerSink for GatedSink {
        fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
            let _ = self.gate.recv();
            if self.fail {
                Err(LedgerError::SinkWrite {
                    written: 1,
                    source: io::Error::new(io::ErrorKind::Other, "disk full"),
                })
            } else {
                Ok(entries.len())
            }
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    struct PanickingSink;

    impl LedgerSink for PanickingSink {
        fn write_all(&mut self, _entries: &[Entry]) -> Result<usize> {
            panic!("sink exploded");
        }

        fn describe(&self) -> String {
            "panicking".to_string()
        }
    }

    #[test]
    fn test_successful_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.txt");

        let handle = AsyncPersistor::start(sample(), TextFileStore::new(&path)).unwrap();
        let report = handle.wait(Duration::from_millis(10));

        assert_eq!(report.state, TaskState::Succeeded);
        assert_eq!(report.entries_written, 3);
        assert!(report.error.is_none());
        assert!(report.finished_at.is_some());
        assert!(handle.is_done());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "food 12.50\nrent 800.00\nfood 3.25\n"
        );
    }

    #[test]
    fn test_unwritable_sink_fails_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("expenses.txt");

        let handle = AsyncPersistor::start(sample(), TextFileStore::new(path)).unwrap();
        let report = handle.wait(Duration::from_millis(10));

        assert_eq!(report.state, TaskState::Failed);
        let err = handle.error().expect("error should be populated");
        assert!(matches!(*err, LedgerError::SinkOpen { .. }));
    }

    #[test]
    fn test_running_until_sink_finishes() {
        let (release, gate) = mpsc::channel();
        let handle = AsyncPersistor::start(sample(), GatedSink { gate, fail: false }).unwrap();

        // Running immediately, never observed as Pending
        assert_eq!(handle.state(), TaskState::Running);
        assert!(!handle.is_done());
        assert!(handle
            .wait_timeout(Duration::from_millis(5), Duration::from_millis(30))
            .is_none());

        release.send(()).unwrap();
        let report = handle.wait(Duration::from_millis(10));
        assert!(report.succeeded());
        assert_eq!(report.entries_written, 3);
    }

    #[test]
    fn test_partial_write_failure_reports_progress() {
        let (release, gate) = mpsc::channel();
        let handle = AsyncPersistor::start(sample(), GatedSink { gate, fail: true }).unwrap();
        release.send(()).unwrap();

        let report = handle.wait(Duration::from_millis(10));
        assert_eq!(report.state, TaskState::Failed);
        assert_eq!(report.entries_written, 1);
        assert!(report.error.unwrap().is_persistence());
    }

    #[test]
    fn test_wait_returns_promptly_after_completion() {
        let (release, gate) = mpsc::channel();
        let poll = Duration::from_millis(200);
        let handle = AsyncPersistor::start(sample(), GatedSink { gate, fail: true }).unwrap();

        let waiter = {
            let handle = handle.clone();
            thread::spawn(move || {
                let report = handle.wait(poll);
                (report, Instant::now())
            })
        };

        thread::sleep(Duration::from_millis(20));
        release.send(()).unwrap();
        let released_at = Instant::now();

        let (report, returned_at) = waiter.join().unwrap();
        assert_eq!(report.state, TaskState::Failed);
        assert!(returned_at.duration_since(released_at) <= poll + Duration::from_millis(100));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        assert_eq!(effective_poll_interval(Duration::ZERO), MIN_POLL_INTERVAL);
        assert_eq!(effective_poll_interval(Duration::from_millis(50)), Duration::from_millis(50));

        let (release, gate) = mpsc::channel();
        let handle = AsyncPersistor::start(sample(), GatedSink { gate, fail: false }).unwrap();
        assert!(handle.wait_timeout(Duration::ZERO, Duration::from_millis(20)).is_none());

        release.send(()).unwrap();
        assert!(handle.wait(Duration::ZERO).succeeded());
    }

    #[test]
    fn test_panicking_sink_is_reported_as_failed() {
        let handle = AsyncPersistor::start(sample(), PanickingSink).unwrap();
        let report = handle.wait(Duration::from_millis(10));
        assert_eq!(report.state, TaskState::Failed);
        assert!(matches!(
            report.error.as_deref(),
            Some(LedgerError::TaskPanicked(_))
        ));
    }

    #[test]
    fn test_independent_tasks() {
        let first = AsyncPersistor::start(sample(), WriterSink::new(Vec::new(), "memory")).unwrap();
        let second = AsyncPersistor::start(Vec::new(), WriterSink::new(io::sink(), "null")).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.wait(Duration::from_millis(10)).entries_written, 3);
        assert_eq!(second.wait(Duration::from_millis(10)).entries_written, 0);
    }

    #[test]
    fn test_writer_sink_flushes() {
        struct CountingFlush(usize);
        impl Write for CountingFlush {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                self.0 += 1;
                Ok(())
            }
        }

        let mut sink = WriterSink::new(CountingFlush(0), "counting");
        sink.write_all(&sample()).unwrap();
        assert_eq!(sink.into_inner().0, 1);
    }
}
