//! Merge planning
//!
//! Given the locked candidate rows of every implicated cluster root, decide
//! which row survives and which row-level mutations collapse the others
//! into it. Planning is pure; stores apply the plan inside one transaction.

use crate::contact::oldest_first;
use crate::error::InconsistencyError;
use crate::{Contact, ContactId, LinkPrecedence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One row-level mutation of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStep {
    /// Force a row to `primary` with no link.
    Promote { id: ContactId },
    /// Turn a row into a secondary of `into`.
    Demote { id: ContactId, into: ContactId },
    /// Point every live row linked to `from` at `into` (excluding `into` itself).
    Repoint { from: ContactId, into: ContactId },
}

/// Ordered steps that collapse the candidate clusters into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// The surviving row as it will look after the plan is applied.
    pub survivor: Contact,
    pub steps: Vec<MergeStep>,
    /// Ids demoted by the plan, oldest first.
    pub demoted: Vec<ContactId>,
    /// No candidate was a primary when the plan was built.
    pub degenerate: bool,
}

/// Summary of an applied merge, as reported by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor: Contact,
    pub demoted: Vec<ContactId>,
    /// Rows re-pointed from a demoted primary to the survivor.
    pub repointed: usize,
    pub degenerate: bool,
}

/// Plan a merge over the live candidate rows.
///
/// The survivor is the oldest current primary by `(created_at, id)`. When
/// no candidate is currently primary the oldest row overall is promoted and
/// every other candidate is demoted under it.
pub fn plan_merge(
    requested: &BTreeSet<ContactId>,
    candidates: Vec<Contact>,
) -> Result<MergePlan, InconsistencyError> {
    let mut candidates: Vec<Contact> = candidates.into_iter().filter(Contact::is_live).collect();
    oldest_first(&mut candidates);

    let primaries: Vec<&Contact> = candidates.iter().filter(|c| c.is_primary()).collect();

    let (survivor, to_demote, degenerate) = if let Some((first, rest)) = primaries.split_first() {
        (*first, rest.to_vec(), false)
    } else {
        let (first, rest) = candidates
            .split_first()
            .ok_or_else(|| InconsistencyError::EmptyMergeCandidates {
                ids: requested.iter().copied().collect(),
            })?;
        (first, rest.iter().collect(), true)
    };

    let mut steps = Vec::with_capacity(to_demote.len() * 2 + 1);
    if !survivor.is_primary() || survivor.linked_id.is_some() {
        steps.push(MergeStep::Promote { id: survivor.id });
    }

    let mut demoted = Vec::with_capacity(to_demote.len());
    for row in to_demote {
        steps.push(MergeStep::Demote {
            id: row.id,
            into: survivor.id,
        });
        steps.push(MergeStep::Repoint {
            from: row.id,
            into: survivor.id,
        });
        demoted.push(row.id);
    }

    let mut survivor = survivor.clone();
    survivor.link_precedence = LinkPrecedence::Primary;
    survivor.linked_id = None;

    Ok(MergePlan {
        survivor,
        steps,
        demoted,
        degenerate,
    })
}
