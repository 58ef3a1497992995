// ➕ Aggregator - Parallel total over the ledger
// Splits entries into contiguous partitions, sums each on its own worker,
// then combines the partial sums in ascending partition order.
//
// Partition i covers [i*n/p, (i+1)*n/p). With n < p some partitions are
// empty; they still produce a PartialResult of zero.

use crate::error::{LedgerError, Result};
use crate::ledger::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::thread;
use tracing::{debug, info};

pub const DEFAULT_PARTITIONS: usize = 4;

// ============================================================================
// PARTIAL RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub partition_index: usize,
    pub sum: Decimal,
}

// ============================================================================
// PARTITIONING
// ============================================================================

/// Boundaries of every partition for a ledger of `len` entries.
pub fn partition_bounds(len: usize, partitions: NonZeroUsize) -> Vec<Range<usize>> {
    let p = partitions.get();
    (0..p)
        .map(|i| (i * len / p)..((i + 1) * len / p))
        .collect()
}

/// Plain accumulation in index order.
fn sum_partition(partition_index: usize, entries: &[Entry]) -> Result<PartialResult> {
    let mut sum = Decimal::ZERO;
    for entry in entries {
        sum = sum
            .checked_add(entry.amount())
            .ok_or(LedgerError::AmountOverflow {
                partition: partition_index,
            })?;
    }
    Ok(PartialResult { partition_index, sum })
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    partitions: NonZeroUsize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            partitions: NonZeroUsize::new(DEFAULT_PARTITIONS).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Aggregator {
    pub fn new(partitions: NonZeroUsize) -> Self {
        Self { partitions }
    }

    /// Build from a raw count, rejecting zero.
    pub fn with_partitions(partitions: usize) -> Result<Self> {
        NonZeroUsize::new(partitions)
            .map(Self::new)
            .ok_or(LedgerError::InvalidPartitionCount)
    }

    pub fn partitions(&self) -> NonZeroUsize {
        self.partitions
    }

    /// Compute one partial sum per partition, one scoped worker each.
    ///
    /// The returned vector always has exactly `partitions` elements, indexed
    /// by partition. Blocks until every worker has joined.
    pub fn partial_sums(&self, entries: &[Entry]) -> Result<Vec<PartialResult>> {
        let bounds = partition_bounds(entries.len(), self.partitions);

        thread::scope(|scope| -> Result<Vec<PartialResult>> {
            let mut workers = Vec::with_capacity(bounds.len());
            for (index, range) in bounds.into_iter().enumerate() {
                let slice = &entries[range];
                let worker = thread::Builder::new()
                    .name(format!("ledger-sum-{index}"))
                    .spawn_scoped(scope, move || sum_partition(index, slice))
                    .map_err(LedgerError::Spawn)?;
                workers.push(worker);
            }

            // Join in partition order; each slot is written exactly once.
            workers
                .into_iter()
                .map(|worker| match worker.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }

    /// Total of every entry.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EmptyLedger`] when `entries` is empty; a zero total is
    /// only ever returned for a non-empty ledger of zero amounts.
    pub fn total(&self, entries: &[Entry]) -> Result<Decimal> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyLedger);
        }

        debug!(entries = entries.len(), partitions = self.partitions.get(), "aggregation started");
        let partials = self.partial_sums(entries)?;

        let mut total = Decimal::ZERO;
        for partial in &partials {
            total = total
                .checked_add(partial.sum)
                .ok_or(LedgerError::AmountOverflow {
                    partition: partial.partition_index,
                })?;
        }

        info!(entries = entries.len(), total = %total, "aggregation finished");
        Ok(total)
    }
}

/// Convenience wrapper matching `total(ledger, partitionCount)`.
pub fn total(entries: &[Entry], partitions: usize) -> Result<Decimal> {
    Aggregator::with_partitions(partitions)?.total(entries)
}
