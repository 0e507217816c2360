//! Month-partitioned ledger storage.
//!
//! [`LedgerStore`] owns all partition access: one worksheet per calendar
//! month, rows appended at the lowest free index, and two derived aggregate
//! cells (running total, operator-set limit). It has no knowledge of
//! conversation state — callers hand it finished [`EntryDraft`] values.
//!
//! Partition layout (inherited from the spreadsheet this replaces):
//! - row 1: column headers `datetime, amount, category, person, description`
//! - rows 2..: one committed entry each, columns 1-5
//! - G3 (`row 3, col 7`): running total — a `=SUM(...)` formula the backend
//!   engine recomputes on every write
//! - G4 (`row 4, col 7`): monthly limit — empty until an operator sets it
//!
//! Mutating operations must be called under [`crate::serializer::WriteSerializer`];
//! the store detects a violated exclusion (a row claimed twice) and surfaces
//! it as [`LedgerError::WriteConflict`] instead of overwriting data.

pub mod backend;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use backend::LedgerBackend;

// ── Partition layout ──────────────────────────────────────────────────────────

const HEADERS: [&str; 5] = ["datetime", "amount", "category", "person", "description"];

const COL_TIMESTAMP: u32 = 1;
const COL_AMOUNT: u32 = 2;
const COL_CATEGORY: u32 = 3;
const COL_PERSON: u32 = 4;
const COL_DESCRIPTION: u32 = 5;

/// (row, col) of the running-total cell.
const TOTAL_CELL: (u32, u32) = (3, 7);
/// (row, col) of the monthly-limit cell.
const LIMIT_CELL: (u32, u32) = (4, 7);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store cannot be reached or refused authorization.
    #[error("ledger backend unavailable: {0}")]
    Backend(String),

    /// The allocated row was occupied between discovery and write.
    /// Unreachable when all mutation goes through the write serializer;
    /// surfaced rather than silently overwriting another entry.
    #[error("row {row} in partition '{partition}' was concurrently occupied")]
    WriteConflict { partition: String, row: u32 },
}

// ── Value types ───────────────────────────────────────────────────────────────

/// A finished entry awaiting commit. Produced by session finalization;
/// the commit timestamp is stamped by the store, not the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub amount: u64,
    pub category: String,
    pub person: String,
    pub description: String,
}

/// Aggregate snapshot of the current partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    /// Sum of the amount column.
    pub total: u64,
    /// Operator-set monthly ceiling; `None` until configured.
    pub limit: Option<u64>,
}

// ── Time derivation ───────────────────────────────────────────────────────────

/// Human-readable partition label for an instant, e.g. `"August 2026"`.
pub fn month_label(now: DateTime<Local>) -> String {
    now.format("%B %Y").to_string()
}

fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── LedgerStore ───────────────────────────────────────────────────────────────

/// Exclusive owner of partition access.
///
/// Every operation derives the current partition from a single wall-clock
/// instant taken at entry — the partition label and the entry timestamp can
/// never disagree about which month a commit belongs to. The `*_at` variants
/// accept that instant explicitly (tests inject deterministic time); the
/// plain variants read the clock.
pub struct LedgerStore {
    backend: LedgerBackend,
    partition_rows: u32,
    partition_cols: u32,
}

impl LedgerStore {
    pub fn new(backend: LedgerBackend, cfg: &LedgerConfig) -> Self {
        Self {
            backend,
            partition_rows: cfg.partition_rows,
            partition_cols: cfg.partition_cols,
        }
    }

    /// Commit `draft` into the current partition and return the updated
    /// aggregates. Must run under the write serializer.
    pub async fn append_entry(&self, draft: &EntryDraft) -> Result<Totals, LedgerError> {
        self.append_entry_at(draft, Local::now()).await
    }

    pub async fn append_entry_at(
        &self,
        draft: &EntryDraft,
        now: DateTime<Local>,
    ) -> Result<Totals, LedgerError> {
        let partition = self.ensure_partition(now).await?;
        let row = self.next_free_row(&partition).await?;
        self.write_entry_row(&partition, row, draft, now).await?;

        let totals = self.read_totals(&partition).await?;
        info!(
            partition = %partition,
            row,
            amount = draft.amount,
            person = %draft.person,
            total = totals.total,
            "entry committed"
        );
        Ok(totals)
    }

    /// Read-only aggregate snapshot of the current partition.
    pub async fn total_and_limit(&self) -> Result<Totals, LedgerError> {
        self.total_and_limit_at(Local::now()).await
    }

    pub async fn total_and_limit_at(&self, now: DateTime<Local>) -> Result<Totals, LedgerError> {
        let partition = self.ensure_partition(now).await?;
        self.read_totals(&partition).await
    }

    /// Overwrite the current partition's limit cell. Idempotent; must run
    /// under the write serializer.
    pub async fn set_limit(&self, value: u64) -> Result<(), LedgerError> {
        self.set_limit_at(value, Local::now()).await
    }

    pub async fn set_limit_at(&self, value: u64, now: DateTime<Local>) -> Result<(), LedgerError> {
        let partition = self.ensure_partition(now).await?;
        self.backend
            .update_cell(&partition, LIMIT_CELL.0, LIMIT_CELL.1, &value.to_string())
            .await?;
        info!(partition = %partition, limit = value, "limit updated");
        Ok(())
    }

    /// Render the current partition as a portable document. Read-only.
    pub async fn export_partition(&self) -> Result<(String, Vec<u8>), LedgerError> {
        self.export_partition_at(Local::now()).await
    }

    pub async fn export_partition_at(
        &self,
        now: DateTime<Local>,
    ) -> Result<(String, Vec<u8>), LedgerError> {
        let partition = self.ensure_partition(now).await?;
        let bytes = self.backend.export(&partition).await?;
        Ok((partition, bytes))
    }

    // ── internals ─────────────────────────────────────────────────────────

    /// Resolve the partition for `now`, creating it lazily with headers and
    /// the total formula in place before any row is written.
    async fn ensure_partition(&self, now: DateTime<Local>) -> Result<String, LedgerError> {
        let label = month_label(now);
        if self.backend.worksheet_exists(&label).await? {
            return Ok(label);
        }

        info!(partition = %label, "creating partition");
        self.backend
            .add_worksheet(&label, self.partition_rows, self.partition_cols)
            .await?;
        for (i, header) in HEADERS.iter().enumerate() {
            self.backend
                .update_cell(&label, 1, i as u32 + 1, header)
                .await?;
        }
        let formula = format!("=SUM(B2:B{})", self.partition_rows);
        self.backend
            .update_cell(&label, TOTAL_CELL.0, TOTAL_CELL.1, &formula)
            .await?;
        Ok(label)
    }

    /// Lowest-numbered row whose key column (column 1) is empty.
    ///
    /// The linear scan over column 1 is the canonical allocation policy:
    /// row 1 always holds headers, so the first gap — or the row past the
    /// last occupied one — is the append target.
    async fn next_free_row(&self, partition: &str) -> Result<u32, LedgerError> {
        let col = self.backend.col_values(partition, COL_TIMESTAMP).await?;
        for (i, value) in col.iter().enumerate() {
            if value.is_empty() {
                return Ok(i as u32 + 1);
            }
        }
        Ok(col.len() as u32 + 1)
    }

    /// Write all entry fields into `row`, verifying the row is still free.
    async fn write_entry_row(
        &self,
        partition: &str,
        row: u32,
        draft: &EntryDraft,
        now: DateTime<Local>,
    ) -> Result<(), LedgerError> {
        let key = self.backend.read_cell(partition, row, COL_TIMESTAMP).await?;
        if !key.is_empty() {
            return Err(LedgerError::WriteConflict {
                partition: partition.to_string(),
                row,
            });
        }

        debug!(partition = %partition, row, "writing entry row");
        let cells = [
            (COL_TIMESTAMP, timestamp(now)),
            (COL_AMOUNT, draft.amount.to_string()),
            (COL_CATEGORY, draft.category.clone()),
            (COL_PERSON, draft.person.clone()),
            (COL_DESCRIPTION, draft.description.clone()),
        ];
        for (col, value) in cells {
            self.backend.update_cell(partition, row, col, &value).await?;
        }
        Ok(())
    }

    async fn read_totals(&self, partition: &str) -> Result<Totals, LedgerError> {
        let total_raw = self
            .backend
            .read_cell(partition, TOTAL_CELL.0, TOTAL_CELL.1)
            .await?;
        let limit_raw = self
            .backend
            .read_cell(partition, LIMIT_CELL.0, LIMIT_CELL.1)
            .await?;

        let total = parse_aggregate(partition, "total", &total_raw)?.unwrap_or(0);
        let limit = parse_aggregate(partition, "limit", &limit_raw)?;
        Ok(Totals { total, limit })
    }
}

/// Parse an aggregate cell: empty means unset, anything else must be numeric.
fn parse_aggregate(partition: &str, cell: &str, raw: &str) -> Result<Option<u64>, LedgerError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| LedgerError::Backend(format!("malformed {cell} cell in '{partition}': '{raw}'")))
}
