// 💾 Storage - Where the ledger lives between sessions
// Text file: one "<category> <amount>" pair per line, no escaping.
// SQLite: single `entries` table, replaced wholesale on every save.

use crate::error::{LedgerError, Result};
use crate::ledger::{parse_amount, Entry};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

// ============================================================================
// TRAITS
// ============================================================================

/// Durable destination for a ledger snapshot.
///
/// Implementations open the destination, write every entry, and flush.
/// A failure partway leaves whatever was already written in place.
pub trait LedgerSink: Send {
    /// Returns the number of entries written.
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize>;

    /// Human-readable destination for status messages.
    fn describe(&self) -> String;
}

impl<S: LedgerSink + ?Sized> LedgerSink for Box<S> {
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
        (**self).write_all(entries)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// What a startup load found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored yet. Not an error.
    Missing,
    Loaded { entries: Vec<Entry> },
}

impl LoadOutcome {
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            LoadOutcome::Missing => Vec::new(),
            LoadOutcome::Loaded { entries } => entries,
        }
    }
}

pub trait LedgerSource {
    fn load(&self) -> Result<LoadOutcome>;
}

// ============================================================================
// LINE FORMAT
// ============================================================================

/// Write `<category> <amount>\n` for each entry, then flush.
pub fn write_lines<W: Write>(writer: &mut W, entries: &[Entry]) -> Result<usize> {
    let mut written = 0;
    for entry in entries {
        writeln!(writer, "{} {}", entry.category(), entry.amount())
            .map_err(|source| LedgerError::SinkWrite { written, source })?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|source| LedgerError::SinkWrite { written, source })?;
    Ok(written)
}

/// Read `<category> <amount>` token pairs.
///
/// Reading stops at the first pair whose amount is not a non-negative
/// decimal, or at the first line that is not valid UTF-8; everything before
/// that point is kept. A dangling category with no amount is dropped.
pub fn read_lines<R: BufRead>(mut reader: R) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut pending_category: Option<(String, usize)> = None;
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                warn!(line = line_number, error = %err, "stopped reading ledger at line with invalid UTF-8");
                return Ok(entries);
            }
        };

        for token in line.split_whitespace() {
            match pending_category.take() {
                None => pending_category = Some((token.to_string(), line_number)),
                Some((category, _)) => {
                    match parse_amount(token).and_then(|amount| Entry::new(category, amount)) {
                        Ok(entry) => entries.push(entry),
                        Err(err) => {
                            warn!(line = line_number, error = %err, "stopped reading ledger at malformed record");
                            return Ok(entries);
                        }
                    }
                }
            }
        }
    }

    if let Some((category, line_number)) = pending_category {
        warn!(line = line_number, category = %category, "ledger ends with a category but no amount");
    }

    Ok(entries)
}

/// Any `Write` as a sink. Useful for stdout and tests.
pub struct WriterSink<W> {
    writer: W,
    label: String,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer,
            label: label.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> LedgerSink for WriterSink<W> {
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
        write_lines(&mut self.writer, entries)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ============================================================================
// TEXT FILE STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct TextFileStore {
    path: PathBuf,
}

impl TextFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerSource for TextFileStore {
    fn load(&self) -> Result<LoadOutcome> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no ledger file found");
                return Ok(LoadOutcome::Missing);
            }
            Err(source) => {
                return Err(LedgerError::SourceRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let entries = read_lines(BufReader::new(file)).map_err(|source| LedgerError::SourceRead {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), entries = entries.len(), "ledger loaded");
        Ok(LoadOutcome::Loaded { entries })
    }
}

impl LedgerSink for TextFileStore {
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
        let file = File::create(&self.path).map_err(|source| LedgerError::SinkOpen {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        write_lines(&mut writer, entries)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            position INTEGER NOT NULL,
            category TEXT NOT NULL,
            amount TEXT NOT NULL,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Row position as an SQLite integer; refuses to wrap.
fn position_param(position: usize) -> Result<i64> {
    i64::try_from(position)
        .map_err(|err| LedgerError::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(err))))
}

/// Replace the table contents with `entries` inside one SQLite transaction.
pub fn save_entries(conn: &mut Connection, entries: &[Entry]) -> Result<usize> {
    let saved_at = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM entries", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO entries (position, category, amount, saved_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, entry) in entries.iter().enumerate() {
            stmt.execute(params![
                position_param(position)?,
                entry.category(),
                entry.amount().to_string(),
                saved_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn load_entries(conn: &Connection) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare("SELECT category, amount FROM entries ORDER BY position")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (category, amount) = row?;
        let amount = Decimal::from_str(&amount).map_err(|_| LedgerError::InvalidAmount {
            input: amount.clone(),
        })?;
        entries.push(Entry::new(category, amount)?);
    }
    Ok(entries)
}

impl LedgerSource for SqliteStore {
    fn load(&self) -> Result<LoadOutcome> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no ledger database found");
            return Ok(LoadOutcome::Missing);
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        setup_database(&conn)?;
        let entries = load_entries(&conn)?;
        info!(path = %self.path.display(), entries = entries.len(), "ledger loaded");
        Ok(LoadOutcome::Loaded { entries })
    }
}

impl LedgerSink for SqliteStore {
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
        let mut conn = Connection::open(&self.path)?;
        setup_database(&conn)?;
        save_entries(&mut conn, entries)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// STORE SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// Whitespace-separated text file
    Text,
    /// SQLite database
    Sqlite,
}

/// The configured backend. Cloned into every persistence task.
#[derive(Debug, Clone)]
pub enum Store {
    Text(TextFileStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn open(kind: StoreKind, path: impl Into<PathBuf>) -> Self {
        match kind {
            StoreKind::Text => Store::Text(TextFileStore::new(path)),
            StoreKind::Sqlite => Store::Sqlite(SqliteStore::new(path)),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Store::Text(store) => store.path(),
            Store::Sqlite(store) => store.path(),
        }
    }
}

impl LedgerSource for Store {
    fn load(&self) -> Result<LoadOutcome> {
        match self {
            Store::Text(store) => store.load(),
            Store::Sqlite(store) => store.load(),
        }
    }
}

impl LedgerSink for Store {
    fn write_all(&mut self, entries: &[Entry]) -> Result<usize> {
        match self {
            Store::Text(store) => store.write_all(entries),
            Store::Sqlite(store) => store.write_all(entries),
        }
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::new("food", dec!(12.50)).unwrap(),
            Entry::new("rent", dec!(800.00)).unwrap(),
            Entry::new("food", dec!(3.25)).unwrap(),
        ]
    }

    /// Accepts `limit` lines, then fails every write.
    struct FailingWriter {
        buffer: Vec<u8>,
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let lines = self.buffer.iter().filter(|b| **b == b'\n').count();
            if lines >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_lines_format() {
        let mut out = Vec::new();
        let written = write_lines(&mut out, &sample()).unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "food 12.50\nrent 800.00\nfood 3.25\n"
        );
    }

    #[test]
    fn test_write_failure_keeps_prefix() {
        let mut writer = FailingWriter {
            buffer: Vec::new(),
            limit: 1,
        };
        let err = write_lines(&mut writer, &sample()).unwrap_err();
        assert!(matches!(err, LedgerError::SinkWrite { written: 1, .. }));
        assert_eq!(String::from_utf8(writer.buffer).unwrap(), "food 12.50\n");
    }

    #[test]
    fn test_read_lines_token_pairs() {
        let input = "food 12.50\nrent   800\n\n  food 3.25  \n";
        let entries = read_lines(Cursor::new(input)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].category(), "rent");
        assert_eq!(entries[1].amount(), dec!(800));
    }

    #[test]
    fn test_read_lines_stops_at_malformed_record() {
        // "eating out 9" splits into category "eating" + amount "out"
        let input = "food 12.50\neating out 9\nrent 800\n";
        let entries = read_lines(Cursor::new(input)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category(), "food");

        let negative = "food 1\nrefund -5\nrent 2\n";
        assert_eq!(read_lines(Cursor::new(negative)).unwrap().len(), 1);
    }

    #[test]
    fn test_read_lines_stops_at_invalid_utf8() {
        let input: &[u8] = b"food 12.50\nrent 800\ncaf\xe9 3.25\nfood 1\n";
        let entries = read_lines(Cursor::new(input)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].category(), "rent");
    }

    #[test]
    fn test_text_store_loads_prefix_of_invalid_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.txt");
        std::fs::write(&path, b"food 12.50\nrent 800\ncaf\xe9 3.25\n").unwrap();

        match TextFileStore::new(&path).load().unwrap() {
            LoadOutcome::Loaded { entries } => assert_eq!(entries.len(), 2),
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_text_store_read_error_is_source_read() {
        // A directory opens on unix but fails on read
        let dir = tempfile::tempdir().unwrap();
        let err = TextFileStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, LedgerError::SourceRead { .. }));
        assert!(err.is_persistence());
    }

    #[test]
    fn test_sqlite_store_rejects_non_database_file() {
        // Not silently treated as empty: a later save would overwrite it
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        std::fs::write(&path, "food 12.50\nrent 800\n").unwrap();

        let err = SqliteStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert!(err.is_persistence());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "food 12.50\nrent 800\n");
    }

    #[test]
    fn test_position_param_refuses_to_wrap() {
        assert_eq!(position_param(7).unwrap(), 7);
        if usize::BITS >= 64 {
            assert!(matches!(position_param(usize::MAX).unwrap_err(), LedgerError::Storage(_)));
        }
    }

    #[test]
    fn test_text_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TextFileStore::new(dir.path().join("expenses.txt"));
        assert_eq!(store.load().unwrap(), LoadOutcome::Missing);
        assert!(store.load().unwrap().into_entries().is_empty());
    }

    #[test]
    fn test_text_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TextFileStore::new(dir.path().join("expenses.txt"));

        assert_eq!(store.write_all(&sample()).unwrap(), 3);
        let loaded = store.load().unwrap().into_entries();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_text_store_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TextFileStore::new(dir.path().join("missing").join("expenses.txt"));
        let err = store.write_all(&sample()).unwrap_err();
        assert!(matches!(err, LedgerError::SinkOpen { .. }));
        assert!(err.is_persistence());
    }

    #[test]
    fn test_sqlite_roundtrip_in_memory() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(save_entries(&mut conn, &sample()).unwrap(), 3);
        // Second save replaces rather than appends
        assert_eq!(save_entries(&mut conn, &sample()[..2]).unwrap(), 2);

        let loaded = load_entries(&conn).unwrap();
        assert_eq!(loaded, sample()[..2].to_vec());
    }

    #[test]
    fn test_sqlite_store_missing_then_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::new(dir.path().join("ledger.db"));
        assert_eq!(store.load().unwrap(), LoadOutcome::Missing);

        store.write_all(&sample()).unwrap();
        assert_eq!(store.load().unwrap().into_entries(), sample());
    }

    #[test]
    fn test_store_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        for (kind, name) in [(StoreKind::Text, "expenses.txt"), (StoreKind::Sqlite, "ledger.db")] {
            let mut store = Store::open(kind, dir.path().join(name));
            assert_eq!(store.load().unwrap(), LoadOutcome::Missing);
            assert_eq!(store.write_all(&sample()).unwrap(), 3);
            assert_eq!(store.load().unwrap().into_entries(), sample());
            assert!(store.describe().ends_with(name));
        }
    }
}
