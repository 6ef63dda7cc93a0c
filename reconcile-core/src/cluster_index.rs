//! Per-request adjacency index over contact rows
//!
//! The `linked_id` column is a reference graph. Rather than walking it
//! pointer by pointer, every request rebuilds a flat index of
//! primary id -> secondary ids from the rows it fetched. Because the index
//! is one level deep by construction, a multi-hop chain shows up as a
//! secondary keyed under a non-primary root instead of being silently
//! followed.

use crate::{Contact, ContactId};
use std::collections::{BTreeMap, BTreeSet};

/// Primary id -> ids of the secondaries that link to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterIndex {
    clusters: BTreeMap<ContactId, BTreeSet<ContactId>>,
    orphans: BTreeSet<ContactId>,
}

impl ClusterIndex {
    /// Build the index from a set of rows. Deleted rows are skipped.
    pub fn build<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a Contact>,
    {
        let mut index = Self::default();
        for row in rows.into_iter().filter(|c| c.is_live()) {
            match row.cluster_root() {
                Some(root) if root == row.id => {
                    index.clusters.entry(root).or_default();
                }
                Some(root) => {
                    index.clusters.entry(root).or_default().insert(row.id);
                }
                None => {
                    index.orphans.insert(row.id);
                }
            }
        }
        index
    }

    /// Every root referenced by the indexed rows, whether or not the root
    /// row itself was among them.
    pub fn roots(&self) -> BTreeSet<ContactId> {
        self.clusters.keys().copied().collect()
    }

    pub fn root_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn secondaries_of(&self, root: ContactId) -> Option<&BTreeSet<ContactId>> {
        self.clusters.get(&root)
    }

    /// Secondaries carrying no link at all.
    pub fn orphans(&self) -> &BTreeSet<ContactId> {
        &self.orphans
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Roots that are referenced by a secondary but absent from `rows`.
    pub fn missing_roots(&self, rows: &[Contact]) -> BTreeSet<ContactId> {
        let present: BTreeSet<ContactId> = rows.iter().map(|c| c.id).collect();
        self.clusters
            .keys()
            .filter(|root| !present.contains(root))
            .copied()
            .collect()
    }
}
