//! Persistence layer for monitored units.
//!
//! The engine never touches SQL directly: it consumes the
//! [`UnitRepository`] trait, whose default implementation
//! ([`unit_store::SqliteUnitRepository`]) is a single SQLite database in
//! WAL mode. Per-unit serialization is enforced through optimistic
//! versioning: every save carries the version the caller read, and a
//! mismatch surfaces as [`SaveOutcome::Conflict`] so the caller re-reads
//! and re-applies.

pub mod error;
pub mod unit_store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use upmon_common::types::{MonitoredUnit, UnitKind};

use crate::error::Result;

/// Result of an optimistic save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The row matched `expected_version` and was updated.
    Saved,
    /// Another writer got there first; re-read and re-apply.
    Conflict,
}

/// Persistence boundary for monitored units.
///
/// Implementations must be safe to share across threads (`Send + Sync`):
/// the ping intake and the sweep act on the same rows concurrently, and
/// correctness relies on the version check in [`UnitRepository::save`],
/// not on callers holding any lock.
pub trait UnitRepository: Send + Sync {
    /// Inserts a freshly created unit at version 1.
    fn insert(&self, unit: &MonitoredUnit) -> Result<()>;

    /// Loads one unit, or `None` when the ID is unknown.
    fn load(&self, unit_id: &str) -> Result<Option<MonitoredUnit>>;

    /// Conditionally updates a unit: the row is written (and its version
    /// bumped) only when the stored version still equals
    /// `expected_version`.
    fn save(&self, unit: &MonitoredUnit, expected_version: i64) -> Result<SaveOutcome>;

    /// Range query on the deadline column: non-paused units of `kind`
    /// whose `next_expected_at` is at or before `now`. This is the sweep's
    /// working set; the exact transition predicates are evaluated in the
    /// engine against the loaded values.
    fn find_due(&self, kind: UnitKind, now: DateTime<Utc>) -> Result<Vec<MonitoredUnit>>;

    /// All units, newest first. Management surface only.
    fn list(&self) -> Result<Vec<MonitoredUnit>>;

    /// Deletes a unit. Returns false when the ID was unknown. The engine
    /// never calls this; deletion is an external CRUD concern.
    fn delete(&self, unit_id: &str) -> Result<bool>;
}
