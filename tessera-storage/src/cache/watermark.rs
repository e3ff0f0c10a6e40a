//! Watermark and change journal for cache invalidation.
//!
//! The change journal tracks mutations in storage, allowing the cache to
//! determine if cached data might be stale. Watermarks represent a point
//! in the mutation history.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tessera_core::{RecordType, StorageError, TenantId, TesseraResult};
use uuid::Uuid;

/// A watermark representing a point in the change journal.
///
/// Watermarks are monotonically increasing per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    /// Monotonically increasing sequence number.
    pub sequence: i64,
    /// When this watermark was observed.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(sequence: i64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (beginning of time).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }

    pub fn is_at_least(&self, other: &Watermark) -> bool {
        self.sequence >= other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

/// Change journal for tracking mutations and cache invalidation.
///
/// Each tenant has an independent watermark. Writers call `record_change`
/// for every mutation of a cached record type; readers compare the watermark
/// stored with a cache entry against the journal.
pub trait ChangeJournal: Send + Sync {
    /// Latest watermark for a tenant.
    fn current_watermark(&self, tenant_id: TenantId) -> TesseraResult<Watermark>;

    /// Whether any change of the given record types happened after
    /// `watermark`. An empty `record_types` slice matches every type.
    fn changes_since(
        &self,
        tenant_id: TenantId,
        watermark: &Watermark,
        record_types: &[RecordType],
    ) -> TesseraResult<bool>;

    /// Record a mutation and return the new watermark.
    fn record_change(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
        record_id: Uuid,
    ) -> TesseraResult<Watermark>;
}

/// In-memory change journal.
///
/// Only the latest change per record type is kept for each tenant, which is
/// all `changes_since` needs. Memory and lookup cost stay constant no matter
/// how many changes are recorded.
#[derive(Debug, Default)]
pub struct InMemoryChangeJournal {
    changes: RwLock<HashMap<TenantId, TenantChanges>>,
}

#[derive(Debug, Default)]
struct TenantChanges {
    sequence: i64,
    latest: HashMap<RecordType, LatestChange>,
}

#[derive(Debug, Clone, Copy)]
struct LatestChange {
    sequence: i64,
    record_id: Uuid,
}

impl InMemoryChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the record of `record_type` changed last, if it changed after
    /// `watermark`.
    pub fn last_changed_record(
        &self,
        tenant_id: TenantId,
        watermark: &Watermark,
        record_type: RecordType,
    ) -> TesseraResult<Option<Uuid>> {
        let changes = self.changes.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(changes
            .get(&tenant_id)
            .and_then(|tc| tc.latest.get(&record_type))
            .filter(|latest| latest.sequence > watermark.sequence)
            .map(|latest| latest.record_id))
    }

    /// Number of change entries held for a tenant.
    pub fn retained_entries(&self, tenant_id: TenantId) -> TesseraResult<usize> {
        let changes = self.changes.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(changes.get(&tenant_id).map_or(0, |tc| tc.latest.len()))
    }
}

impl ChangeJournal for InMemoryChangeJournal {
    fn current_watermark(&self, tenant_id: TenantId) -> TesseraResult<Watermark> {
        let changes = self.changes.read().map_err(|_| StorageError::LockPoisoned)?;
        let sequence = changes.get(&tenant_id).map(|tc| tc.sequence).unwrap_or(0);
        Ok(Watermark::new(sequence))
    }

    fn changes_since(
        &self,
        tenant_id: TenantId,
        watermark: &Watermark,
        record_types: &[RecordType],
    ) -> TesseraResult<bool> {
        let changes = self.changes.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(tenant_changes) = changes.get(&tenant_id) else {
            return Ok(false);
        };
        if record_types.is_empty() {
            return Ok(tenant_changes.sequence > watermark.sequence);
        }
        Ok(record_types.iter().any(|record_type| {
            tenant_changes
                .latest
                .get(record_type)
                .is_some_and(|latest| latest.sequence > watermark.sequence)
        }))
    }

    fn record_change(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
        record_id: Uuid,
    ) -> TesseraResult<Watermark> {
        let mut changes = self.changes.write().map_err(|_| StorageError::LockPoisoned)?;
        let tenant_changes = changes.entry(tenant_id).or_default();

        tenant_changes.sequence += 1;
        tenant_changes.latest.insert(
            record_type,
            LatestChange {
                sequence: tenant_changes.sequence,
                record_id,
            },
        );

        Ok(Watermark::new(tenant_changes.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::EntityIdType;

    #[test]
    fn test_watermark_ordering() {
        let w1 = Watermark::new(1);
        let w2 = Watermark::new(2);

        assert!(w2.is_newer_than(&w1));
        assert!(!w1.is_newer_than(&w2));
        assert!(w2.is_at_least(&Watermark::new(2)));
        assert_eq!(Watermark::zero().sequence, 0);
    }

    #[test]
    fn test_in_memory_journal() {
        let journal = InMemoryChangeJournal::new();
        let tenant_id = TenantId::now_v7();

        let w0 = journal.current_watermark(tenant_id).expect("current_watermark");
        assert_eq!(w0.sequence, 0);

        let w1 = journal
            .record_change(tenant_id, RecordType::ProfileDefinition, Uuid::now_v7())
            .expect("record_change");
        assert_eq!(w1.sequence, 1);

        assert!(journal.changes_since(tenant_id, &w0, &[]).expect("changes_since"));
        assert!(!journal.changes_since(tenant_id, &w1, &[]).expect("changes_since"));
    }

    #[test]
    fn test_journal_record_type_filter() {
        let journal = InMemoryChangeJournal::new();
        let tenant_id = TenantId::now_v7();
        let w0 = journal.current_watermark(tenant_id).expect("current_watermark");
        let record_id = Uuid::now_v7();

        journal
            .record_change(tenant_id, RecordType::ProfileDefinition, record_id)
            .expect("record_change");

        assert!(journal
            .changes_since(tenant_id, &w0, &[RecordType::ProfileDefinition])
            .expect("changes_since"));
        assert!(!journal
            .changes_since(tenant_id, &w0, &[RecordType::AttributeExtend])
            .expect("changes_since"));
        assert_eq!(
            journal
                .last_changed_record(tenant_id, &w0, RecordType::ProfileDefinition)
                .expect("last_changed_record"),
            Some(record_id)
        );
    }

    #[test]
    fn test_journal_tenant_isolation() {
        let journal = InMemoryChangeJournal::new();
        let tenant_a = TenantId::now_v7();
        let tenant_b = TenantId::now_v7();
        let w0_b = journal.current_watermark(tenant_b).expect("current_watermark");

        journal
            .record_change(tenant_a, RecordType::ProfileDefinition, Uuid::now_v7())
            .expect("record_change");

        assert!(!journal.changes_since(tenant_b, &w0_b, &[]).expect("changes_since"));
    }

    #[test]
    fn test_journal_stays_bounded() {
        let journal = InMemoryChangeJournal::new();
        let tenant_id = TenantId::now_v7();
        let w0 = journal.current_watermark(tenant_id).expect("current_watermark");

        for _ in 0..4999 {
            journal
                .record_change(tenant_id, RecordType::ProfileDefinition, Uuid::now_v7())
                .expect("record_change");
        }
        let last = Uuid::now_v7();
        journal
            .record_change(tenant_id, RecordType::ProfileDefinition, last)
            .expect("record_change");
        let w_mid = journal.current_watermark(tenant_id).expect("current_watermark");
        journal
            .record_change(tenant_id, RecordType::AttributeExtend, Uuid::now_v7())
            .expect("record_change");

        assert_eq!(w_mid.sequence, 5000);
        assert_eq!(journal.retained_entries(tenant_id).expect("retained"), 2);
        assert!(journal
            .changes_since(tenant_id, &w0, &[RecordType::ProfileDefinition])
            .expect("changes_since"));
        assert!(!journal
            .changes_since(tenant_id, &w_mid, &[RecordType::ProfileDefinition])
            .expect("changes_since"));
        assert!(journal.changes_since(tenant_id, &w_mid, &[]).expect("changes_since"));
        assert_eq!(
            journal
                .last_changed_record(tenant_id, &w0, RecordType::ProfileDefinition)
                .expect("last_changed_record"),
            Some(last)
        );
        assert_eq!(
            journal
                .last_changed_record(tenant_id, &w_mid, RecordType::ProfileDefinition)
                .expect("last_changed_record"),
            None
        );
    }
}
