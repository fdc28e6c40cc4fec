use std::collections::VecDeque;
use std::ops::Range;

use plutus_core::{CanonicalRow, TableSchema};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::RecordStore;

pub const DEFAULT_LADDER: [usize; 3] = [5000, 100, 1];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

/// Inserts rows in descending batch sizes. A failed batch is retried at the next
/// smaller rung until single rows isolate the offenders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriter {
    ladder: Vec<usize>,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(DEFAULT_LADDER)
    }
}

impl BatchWriter {
    /// Sizes are sorted descending, zeros dropped, and a final rung of 1 appended if missing.
    pub fn new(ladder: impl IntoIterator<Item = usize>) -> Self {
        let mut sizes: Vec<usize> = ladder.into_iter().filter(|size| *size > 0).collect();
        if sizes.is_empty() {
            sizes = DEFAULT_LADDER.to_vec();
        }
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes.dedup();
        if sizes.last() != Some(&1) {
            sizes.push(1);
        }
        Self { ladder: sizes }
    }

    pub fn ladder(&self) -> &[usize] {
        &self.ladder
    }

    /// Never fails: every row ends up either succeeded or skipped.
    pub async fn write(
        &self,
        store: &dyn RecordStore,
        schema: &TableSchema,
        rows: &[CanonicalRow],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome {
            attempted: rows.len(),
            ..WriteOutcome::default()
        };
        let mut pending: VecDeque<(Range<usize>, usize)> = split(0..rows.len(), self.ladder[0])
            .map(|range| (range, 0))
            .collect();

        while let Some((range, rung)) = pending.pop_front() {
            let chunk = &rows[range.clone()];
            let err = match store.insert(schema, chunk).await {
                Ok(inserted) => {
                    outcome.succeeded += inserted;
                    continue;
                }
                Err(err) => err,
            };

            if rung == 0 && !err.is_constraint_violation() {
                error!(
                    table = %schema.table,
                    rows = chunk.len(),
                    error = %err,
                    "batch skipped after unexpected store error"
                );
                outcome.skipped += chunk.len();
                continue;
            }

            if chunk.len() == 1 {
                if err.is_constraint_violation() {
                    debug!(table = %schema.table, row = range.start, "duplicate row skipped");
                } else {
                    warn!(table = %schema.table, row = range.start, error = %err, "row skipped");
                }
                outcome.skipped += 1;
                continue;
            }

            let next = (rung + 1..self.ladder.len())
                .find(|idx| self.ladder[*idx] < chunk.len())
                .unwrap_or(self.ladder.len() - 1);
            debug!(
                table = %schema.table,
                rows = chunk.len(),
                next_size = self.ladder[next],
                error = %err,
                "retrying batch at smaller size"
            );
            let parts: Vec<Range<usize>> = split(range, self.ladder[next]).collect();
            for part in parts.into_iter().rev() {
                pending.push_front((part, next));
            }
        }

        info!(
            table = %schema.table,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            "write finished"
        );
        outcome
    }
}

fn split(range: Range<usize>, size: usize) -> impl Iterator<Item = Range<usize>> {
    let end = range.end;
    range
        .step_by(size.max(1))
        .map(move |start| start..(start + size.max(1)).min(end))
}
