//! Keyed locks serializing check-then-write per report triple.
//!
//! Two concurrent calls may report the same (student, event type, date)
//! triple; the existence check and the insert are not one atomic step, so
//! the persistence service holds the triple's lock across both. Keys are
//! stable FNV-1a hashes, suitable for advisory locking in any backend.

use chrono::{Datelike, NaiveDate};
use simcha_core::{EntityId, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Compute a stable i64 key for the report dedup triple using FNV-1a hash.
/// FNV-1a is deterministic across Rust versions and compilations.
pub fn report_lock_key(
    student_id: EntityId,
    event_type_id: EntityId,
    event_date: NaiveDate,
) -> i64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    let mut eat = |byte: u8| {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    };

    for byte in student_id.as_bytes() {
        eat(*byte);
    }
    for byte in event_type_id.as_bytes() {
        eat(*byte);
    }
    for byte in event_date.num_days_from_ce().to_le_bytes() {
        eat(byte);
    }

    hash as i64
}

/// In-process advisory lock table keyed by report triple.
///
/// `handle` returns the key's shared mutex; the caller locks it for the
/// duration of its check-then-write sequence:
///
/// ```ignore
/// let gate = locks.handle(key)?;
/// let _held = gate.lock().map_err(|_| StorageError::LockPoisoned)?;
/// // existence check + save run here, serialized per triple
/// ```
#[derive(Debug, Default)]
pub struct ReportLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ReportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared mutex for a triple key, created on first use.
    pub fn handle(&self, key: i64) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut table = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Arc::clone(table.entry(key).or_default()))
    }
}
