//! In-memory ContactStore implementation.
//!
//! Rows live in a `BTreeMap` behind an `RwLock`. Merges are applied to a
//! staged copy of the table and swapped in only when every step succeeds,
//! which gives the same all-or-nothing behaviour as a database
//! transaction. Fault injection hooks let tests abort a merge part way
//! through or simulate serialization conflicts.

use ::async_trait::async_trait;
use chrono::Utc;
use reconcile_core::{
    oldest_first, plan_merge, ClusterIndex, Contact, ContactId, Identifiers, LinkPrecedence,
    MergeOutcome, MergeStep, NewContact, ReconcileResult, StorageError, StorageResult, Timestamp,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::store::ContactStore;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<ContactId, Contact>,
    next_id: i64,
    last_timestamp: Option<Timestamp>,
}

impl Table {
    /// Strictly increasing clock so insertion order is creation order.
    fn tick(&mut self) -> Timestamp {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn insert(&mut self, new: NewContact) -> Contact {
        self.next_id += 1;
        let now = self.tick();
        let contact = Contact {
            id: ContactId(self.next_id),
            email: new.email,
            phone_number: new.phone_number,
            linked_id: new.linked_id,
            link_precedence: new.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.rows.insert(contact.id, contact.clone());
        contact
    }

    fn live(&self, id: ContactId) -> Option<&Contact> {
        self.rows.get(&id).filter(|c| c.is_live())
    }

    fn cluster(&self, primary: ContactId) -> Vec<Contact> {
        let mut head = Vec::with_capacity(1);
        let mut rest = Vec::new();
        for row in self.rows.values().filter(|c| c.is_live()) {
            if row.id == primary {
                head.push(row.clone());
            } else if row.linked_id == Some(primary) {
                rest.push(row.clone());
            }
        }
        oldest_first(&mut rest);
        head.extend(rest);
        head
    }

    /// Apply one merge step, returning how many rows it touched.
    fn apply(&mut self, step: MergeStep, now: Timestamp) -> StorageResult<usize> {
        match step {
            MergeStep::Promote { id } => {
                let row = self.rows.get_mut(&id).ok_or_else(|| StorageError::Query {
                    reason: format!("promote target {} vanished", id),
                })?;
                row.link_precedence = LinkPrecedence::Primary;
                row.linked_id = None;
                row.updated_at = now;
                Ok(1)
            }
            MergeStep::Demote { id, into } => {
                let row = self.rows.get_mut(&id).ok_or_else(|| StorageError::Query {
                    reason: format!("demote target {} vanished", id),
                })?;
                row.link_precedence = LinkPrecedence::Secondary;
                row.linked_id = Some(into);
                row.updated_at = now;
                Ok(1)
            }
            MergeStep::Repoint { from, into } => {
                let mut touched = 0;
                for row in self.rows.values_mut() {
                    if row.is_live() && row.linked_id == Some(from) && row.id != into {
                        row.linked_id = Some(into);
                        row.updated_at = now;
                        touched += 1;
                    }
                }
                Ok(touched)
            }
        }
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Abort the next merge long enough to reach this many applied steps.
    fail_merge_after: Option<usize>,
    /// Number of upcoming merges that fail with a retryable conflict.
    conflicts: u32,
    unavailable: bool,
}

/// In-memory contact store for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContactStore {
    table: Arc<RwLock<Table>>,
    faults: Arc<Mutex<FaultPlan>>,
    merges: Arc<Mutex<u64>>,
}

impl InMemoryContactStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully specified row, bypassing id and clock assignment.
    ///
    /// Used by fixtures that need explicit creation times or deliberately
    /// inconsistent rows.
    pub fn seed(&self, contact: Contact) -> StorageResult<()> {
        let mut table = self.write()?;
        table.next_id = table.next_id.max(contact.id.0);
        if table.last_timestamp.map_or(true, |last| contact.created_at > last) {
            table.last_timestamp = Some(contact.created_at);
        }
        table.rows.insert(contact.id, contact);
        Ok(())
    }

    /// Snapshot of every row, deleted ones included, ordered by id.
    pub fn contacts(&self) -> StorageResult<Vec<Contact>> {
        Ok(self.read()?.rows.values().cloned().collect())
    }

    /// Snapshot of one row regardless of its deletion state.
    pub fn contact(&self, id: ContactId) -> StorageResult<Option<Contact>> {
        Ok(self.read()?.rows.get(&id).cloned())
    }

    /// Number of stored rows.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.read()?.rows.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.read()?.rows.is_empty())
    }

    /// Number of merges that committed.
    pub fn merges_committed(&self) -> StorageResult<u64> {
        let merges = self.merges.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(*merges)
    }

    /// Abort the next merge with more than `steps` steps, once `steps` of
    /// them have been applied.
    ///
    /// The fault stays armed across merges with fewer steps and is cleared
    /// once it fires.
    pub fn fail_merge_after(&self, steps: usize) -> StorageResult<()> {
        self.faults()?.fail_merge_after = Some(steps);
        Ok(())
    }

    /// Make the next `count` merges fail with a retryable conflict.
    pub fn inject_conflicts(&self, count: u32) -> StorageResult<()> {
        self.faults()?.conflicts = count;
        Ok(())
    }

    /// Simulate an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) -> StorageResult<()> {
        self.faults()?.unavailable = unavailable;
        Ok(())
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Table>> {
        self.table.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Table>> {
        self.table.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn faults(&self) -> StorageResult<std::sync::MutexGuard<'_, FaultPlan>> {
        self.faults.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.faults()?.unavailable {
            return Err(StorageError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn find_matches_sync(&self, identifiers: &Identifiers) -> StorageResult<Vec<Contact>> {
        self.ensure_available()?;
        let table = self.read()?;
        let mut matches: Vec<Contact> = table
            .rows
            .values()
            .filter(|c| c.is_live())
            .filter(|c| c.shares_identifier(identifiers.email(), identifiers.phone_number()))
            .cloned()
            .collect();
        oldest_first(&mut matches);
        Ok(matches)
    }

    fn insert_secondary_sync(
        &self,
        primary: ContactId,
        identifiers: &Identifiers,
    ) -> StorageResult<Option<Contact>> {
        self.ensure_available()?;
        let mut table = self.write()?;

        match table.live(primary) {
            Some(row) if row.is_primary() => {}
            _ => {
                return Err(StorageError::Conflict {
                    reason: format!("contact {} is no longer a live primary", primary),
                })
            }
        }

        let exists = table
            .cluster(primary)
            .iter()
            .any(|c| c.has_pair(identifiers.email(), identifiers.phone_number()));
        if exists {
            return Ok(None);
        }

        let (email, phone_number) = identifiers.clone().into_parts();
        Ok(Some(table.insert(NewContact::secondary(email, phone_number, primary))))
    }

    fn merge_sync(&self, roots: &BTreeSet<ContactId>) -> ReconcileResult<MergeOutcome> {
        self.ensure_available()?;
        let fail_after = {
            let mut faults = self.faults()?;
            if faults.conflicts > 0 {
                faults.conflicts -= 1;
                return Err(StorageError::Conflict {
                    reason: "injected serialization failure".to_string(),
                }
                .into());
            }
            faults.fail_merge_after
        };

        let mut table = self.write()?;
        let mut staged = table.clone();

        // Candidate rows, expanded to the current roots of demoted candidates.
        let mut candidates: Vec<Contact> = roots
            .iter()
            .filter_map(|id| staged.live(*id).cloned())
            .collect();
        loop {
            let missing = ClusterIndex::build(&candidates).missing_roots(&candidates);
            let extra: Vec<Contact> = missing
                .iter()
                .filter_map(|id| staged.live(*id).cloned())
                .collect();
            if extra.is_empty() {
                break;
            }
            candidates.extend(extra);
        }

        let plan = plan_merge(roots, candidates)?;

        let now = staged.tick();
        let mut repointed = 0;
        for (applied, step) in plan.steps.iter().enumerate() {
            if fail_after == Some(applied) {
                self.faults()?.fail_merge_after = None;
                return Err(StorageError::TransactionFailed {
                    reason: format!("injected fault after {} merge step(s)", applied),
                }
                .into());
            }
            let touched = staged.apply(*step, now)?;
            if matches!(step, MergeStep::Repoint { .. }) {
                repointed += touched;
            }
        }

        let survivor = staged
            .live(plan.survivor.id)
            .cloned()
            .ok_or_else(|| StorageError::Query {
                reason: format!("survivor {} vanished during merge", plan.survivor.id),
            })?;

        *table = staged;
        drop(table);
        *self.merges.lock().map_err(|_| StorageError::LockPoisoned)? += 1;

        Ok(MergeOutcome {
            survivor,
            demoted: plan.demoted,
            repointed,
            degenerate: plan.degenerate,
        })
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn find_matches(&self, identifiers: &Identifiers) -> ReconcileResult<Vec<Contact>> {
        Ok(self.find_matches_sync(identifiers)?)
    }

    async fn get_live(&self, id: ContactId) -> ReconcileResult<Option<Contact>> {
        self.ensure_available()?;
        Ok(self.read()?.live(id).cloned())
    }

    async fn load_cluster(&self, primary: ContactId) -> ReconcileResult<Vec<Contact>> {
        self.ensure_available()?;
        Ok(self.read()?.cluster(primary))
    }

    async fn insert_primary(&self, identifiers: &Identifiers) -> ReconcileResult<Contact> {
        self.ensure_available()?;
        let (email, phone_number) = identifiers.clone().into_parts();
        Ok(self.write()?.insert(NewContact::primary(email, phone_number)))
    }

    async fn insert_secondary(
        &self,
        primary: ContactId,
        identifiers: &Identifiers,
    ) -> ReconcileResult<Option<Contact>> {
        Ok(self.insert_secondary_sync(primary, identifiers)?)
    }

    async fn merge_clusters(&self, roots: &BTreeSet<ContactId>) -> ReconcileResult<MergeOutcome> {
        self.merge_sync(roots)
    }

    async fn health_check(&self) -> ReconcileResult<()> {
        self.ensure_available()?;
        drop(self.read()?);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
