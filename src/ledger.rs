// 📒 Ledger - Categorized expense entries
// Entries are validated at the boundary and never mutated afterwards.
// The ledger only grows: append at runtime, bulk-load at startup.

use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// ENTRY
// ============================================================================

/// One categorized monetary record. Construct through [`Entry::new`] or
/// [`Entry::parse`] so the non-negative / non-empty invariants hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    category: String,
    amount: Decimal,
}

impl Entry {
    pub fn new(category: impl Into<String>, amount: Decimal) -> Result<Self> {
        let category = category.into();
        let trimmed = category.trim();

        if trimmed.is_empty() {
            return Err(LedgerError::EmptyCategory);
        }
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(LedgerError::NegativeAmount {
                amount: amount.to_string(),
            });
        }

        if trimmed.split_whitespace().count() > 1 {
            warn!(category = trimmed, "category contains whitespace and will not round-trip through the text store");
        }

        Ok(Self {
            category: trimmed.to_string(),
            amount,
        })
    }

    /// Validate raw user input (category line + amount string).
    pub fn parse(category: &str, input_amount: &str) -> Result<Self> {
        let amount = parse_amount(input_amount)?;
        Self::new(category, amount)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ${}", self.category, self.amount)
    }
}

/// Parse a non-negative decimal amount.
///
/// Rejects anything that is not a plain decimal number with
/// [`LedgerError::InvalidAmount`], and values below zero with
/// [`LedgerError::NegativeAmount`].
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();

    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| LedgerError::InvalidAmount {
            input: trimmed.to_string(),
        })?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::NegativeAmount {
            amount: trimmed.to_string(),
        });
    }

    // "-0" parses as a negative zero; store it as plain zero
    Ok(if amount.is_zero() { Decimal::ZERO } else { amount })
}

// ============================================================================
// LEDGER
// ============================================================================

/// Ordered, append-only collection of entries for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<Entry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: Entry) {
        debug!(category = entry.category(), amount = %entry.amount(), index = self.entries.len(), "entry appended");
        self.entries.push(entry);
    }

    /// Bulk-load entries (startup only). Keeps insertion order.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Owned copy handed to background persistence so the task never
    /// observes later appends.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }
}

impl From<Vec<Entry>> for Ledger {
    fn from(entries: Vec<Entry>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
