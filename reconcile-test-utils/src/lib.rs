//! Reconcile Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for identifiers and request sequences
//! - Fixtures that seed stores with rows at explicit creation times
//! - Assertions over the contact graph and consolidated views

pub use reconcile_storage::InMemoryContactStore;

pub use reconcile_core::{
    ConsolidatedContact, Contact, ContactId, Identifiers, InconsistencyError, LinkPrecedence,
    ReconcileError, ReconcileResult, StorageError, Timestamp, ValidationError,
};

use chrono::Utc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for identify requests.
    //!
    //! Identifier pools are kept small so generated requests collide often
    //! and exercise merging.

    use super::*;
    use proptest::prelude::*;

    /// Generate an email from a small pool, in mixed case and with padding.
    pub fn arb_email() -> impl Strategy<Value = String> {
        (0u8..6, any::<bool>(), any::<bool>()).prop_map(|(n, upper, padded)| {
            let base = format!("user{}@example.com", n);
            let cased = if upper { base.to_uppercase() } else { base };
            if padded {
                format!("  {} ", cased)
            } else {
                cased
            }
        })
    }

    /// Generate a phone number from a small pool.
    pub fn arb_phone() -> impl Strategy<Value = String> {
        (0u8..6).prop_map(|n| format!("55501{}", n))
    }

    /// Generate valid normalized identifiers (at least one present).
    pub fn arb_identifiers() -> impl Strategy<Value = Identifiers> {
        prop_oneof![
            (arb_email(), arb_phone()).prop_map(|(e, p)| (Some(e), Some(p))),
            arb_email().prop_map(|e| (Some(e), None)),
            arb_phone().prop_map(|p| (None, Some(p))),
        ]
        .prop_filter_map("identifiers must normalize", |(email, phone)| {
            Identifiers::normalize(email.as_deref(), phone.as_deref()).ok()
        })
    }

    /// Generate a sequence of identify requests.
    pub fn arb_request_sequence(max_len: usize) -> impl Strategy<Value = Vec<Identifiers>> {
        prop::collection::vec(arb_identifiers(), 1..=max_len.max(1))
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate `count` disjoint primaries with arbitrary (possibly equal)
    /// creation times, ids starting at 1.
    pub fn arb_disjoint_primaries(count: usize) -> impl Strategy<Value = Vec<Contact>> {
        prop::collection::vec(arb_timestamp(), count).prop_map(|times| {
            times
                .into_iter()
                .enumerate()
                .map(|(i, ts)| {
                    let n = i as i64 + 1;
                    Contact {
                        id: ContactId(n),
                        email: Some(format!("p{}@example.com", n)),
                        phone_number: Some(format!("900{}", n)),
                        linked_id: None,
                        link_precedence: LinkPrecedence::Primary,
                        created_at: ts,
                        updated_at: ts,
                        deleted_at: None,
                    }
                })
                .collect()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and stores for common scenarios.

    use super::*;
    use chrono::TimeZone;

    /// Fixed base instant all fixture times are offset from.
    pub const BASE_EPOCH_SECS: i64 = 1_680_000_000;

    /// Timestamp `secs` seconds after the fixture base.
    pub fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(BASE_EPOCH_SECS + secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Normalized identifiers; panics on invalid input.
    pub fn ids(email: Option<&str>, phone: Option<&str>) -> Identifiers {
        Identifiers::normalize(email, phone).expect("fixture identifiers must be valid")
    }

    /// A live primary created `secs` after the base.
    pub fn primary_at(id: i64, secs: i64, email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id: ContactId(id),
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: ts(secs),
            updated_at: ts(secs),
            deleted_at: None,
        }
    }

    /// A live secondary of `linked` created `secs` after the base.
    pub fn secondary_at(
        id: i64,
        secs: i64,
        linked: i64,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Contact {
        Contact {
            linked_id: Some(ContactId(linked)),
            link_precedence: LinkPrecedence::Secondary,
            ..primary_at(id, secs, email, phone)
        }
    }

    /// The same row, soft-deleted.
    pub fn deleted(mut contact: Contact) -> Contact {
        contact.deleted_at = Some(contact.updated_at);
        contact
    }

    /// An in-memory store seeded with `rows`.
    pub fn store_with(rows: impl IntoIterator<Item = Contact>) -> InMemoryContactStore {
        let store = InMemoryContactStore::new();
        for row in rows {
            store.seed(row).expect("seeding an in-memory store");
        }
        store
    }

    /// One primary with one secondary sharing its phone.
    ///
    /// ```text
    /// 1  primary    lorraine@hillvalley.edu  123456
    /// 23 secondary  mcfly@hillvalley.edu     123456  -> 1
    /// ```
    pub fn lorraine_cluster() -> InMemoryContactStore {
        store_with([
            primary_at(1, 0, Some("lorraine@hillvalley.edu"), Some("123456")),
            secondary_at(23, 60, 1, Some("mcfly@hillvalley.edu"), Some("123456")),
        ])
    }

    /// Two unrelated primaries, the first one older.
    ///
    /// ```text
    /// 11 primary  george@hillvalley.edu    919191
    /// 27 primary  biffsucks@hillvalley.edu 717171
    /// ```
    pub fn george_and_biff() -> InMemoryContactStore {
        store_with([
            primary_at(11, 0, Some("george@hillvalley.edu"), Some("919191")),
            primary_at(27, 3600, Some("biffsucks@hillvalley.edu"), Some("717171")),
        ])
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over stored rows and consolidated views.

    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// Assert the live contact graph is well formed.
    ///
    /// Every live primary has no link. Every live secondary links to a live
    /// primary, so chains are exactly one hop deep.
    #[track_caller]
    pub fn assert_store_invariants(contacts: &[Contact]) {
        let live: BTreeMap<ContactId, &Contact> = contacts
            .iter()
            .filter(|c| c.is_live())
            .map(|c| (c.id, c))
            .collect();

        for row in live.values() {
            match row.link_precedence {
                LinkPrecedence::Primary => assert!(
                    row.linked_id.is_none(),
                    "primary {} carries link {:?}",
                    row.id,
                    row.linked_id
                ),
                LinkPrecedence::Secondary => {
                    let target = row
                        .linked_id
                        .unwrap_or_else(|| panic!("secondary {} has no link", row.id));
                    let parent = live
                        .get(&target)
                        .unwrap_or_else(|| panic!("secondary {} links to missing {}", row.id, target));
                    assert!(
                        parent.is_primary(),
                        "secondary {} links to non-primary {}",
                        row.id,
                        target
                    );
                }
            }
            assert!(
                row.email.is_some() || row.phone_number.is_some(),
                "contact {} has no identifiers",
                row.id
            );
        }
    }

    /// Assert no two clusters share an email or phone number.
    #[track_caller]
    pub fn assert_clusters_disjoint(contacts: &[Contact]) {
        let mut owner_by_email: BTreeMap<&str, ContactId> = BTreeMap::new();
        let mut owner_by_phone: BTreeMap<&str, ContactId> = BTreeMap::new();

        for row in contacts.iter().filter(|c| c.is_live()) {
            let Some(root) = row.cluster_root() else {
                panic!("contact {} has no cluster root", row.id);
            };
            if let Some(email) = row.email.as_deref() {
                let owner = *owner_by_email.entry(email).or_insert(root);
                assert_eq!(owner, root, "email {} spans clusters {} and {}", email, owner, root);
            }
            if let Some(phone) = row.phone_number.as_deref() {
                let owner = *owner_by_phone.entry(phone).or_insert(root);
                assert_eq!(owner, root, "phone {} spans clusters {} and {}", phone, owner, root);
            }
        }
    }

    /// Assert a consolidated view agrees with the stored cluster it names.
    #[track_caller]
    pub fn assert_consolidated_matches_store(view: &ConsolidatedContact, contacts: &[Contact]) {
        let primary = contacts
            .iter()
            .find(|c| c.id == view.primary_contact_id && c.is_live())
            .unwrap_or_else(|| panic!("primary {} not live in store", view.primary_contact_id));
        assert!(primary.is_primary(), "{} is not a primary", primary.id);

        let members: Vec<&Contact> = contacts
            .iter()
            .filter(|c| c.is_live() && c.linked_id == Some(primary.id))
            .collect();

        let expected_ids: Vec<ContactId> = members
            .iter()
            .map(|c| c.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(view.secondary_contact_ids, expected_ids, "secondary ids differ");

        let emails: BTreeSet<&str> = std::iter::once(primary)
            .chain(members.iter().copied())
            .filter_map(|c| c.email.as_deref())
            .collect();
        let phones: BTreeSet<&str> = std::iter::once(primary)
            .chain(members.iter().copied())
            .filter_map(|c| c.phone_number.as_deref())
            .collect();
        assert_eq!(
            view.emails.iter().map(String::as_str).collect::<BTreeSet<_>>(),
            emails,
            "emails differ"
        );
        assert_eq!(view.emails.len(), emails.len(), "duplicate emails in view");
        assert_eq!(
            view.phone_numbers.iter().map(String::as_str).collect::<BTreeSet<_>>(),
            phones,
            "phone numbers differ"
        );
        assert_eq!(view.phone_numbers.len(), phones.len(), "duplicate phones in view");

        if let Some(email) = primary.email.as_deref() {
            assert_eq!(view.emails.first().map(String::as_str), Some(email));
        }
        if let Some(phone) = primary.phone_number.as_deref() {
            assert_eq!(view.phone_numbers.first().map(String::as_str), Some(phone));
        }
    }

    /// Assert a result is a validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &ReconcileResult<T>) {
        match result {
            Err(ReconcileError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert a result is an inconsistent-state error.
    #[track_caller]
    pub fn assert_inconsistent_state<T: std::fmt::Debug>(result: &ReconcileResult<T>) {
        match result {
            Err(ReconcileError::InconsistentState(_)) => {}
            other => panic!("Expected InconsistentState error, got: {:?}", other),
        }
    }

    /// Assert a result is a transaction failure after `attempts` attempts.
    #[track_caller]
    pub fn assert_transaction_failure<T: std::fmt::Debug>(
        result: &ReconcileResult<T>,
        attempts: u32,
    ) {
        match result {
            Err(ReconcileError::TransactionFailure { attempts: got, .. }) => {
                assert_eq!(*got, attempts, "wrong attempt count");
            }
            other => panic!("Expected TransactionFailure, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lorraine_cluster_is_well_formed() {
        let store = fixtures::lorraine_cluster();
        let contacts = store.contacts().unwrap();
        assertions::assert_store_invariants(&contacts);
        assertions::assert_clusters_disjoint(&contacts);
        assert_eq!(contacts.len(), 2);
    }

    #[test]
    #[should_panic(expected = "links to non-primary")]
    fn test_chain_violates_invariants() {
        let contacts = vec![
            fixtures::primary_at(1, 0, Some("a@x.com"), None),
            fixtures::secondary_at(2, 1, 1, Some("b@x.com"), None),
            fixtures::secondary_at(3, 2, 2, Some("c@x.com"), None),
        ];
        assertions::assert_store_invariants(&contacts);
    }

    #[test]
    #[should_panic(expected = "spans clusters")]
    fn test_shared_phone_across_clusters_detected() {
        let contacts = vec![
            fixtures::primary_at(1, 0, None, Some("1")),
            fixtures::primary_at(2, 1, None, Some("1")),
        ];
        assertions::assert_clusters_disjoint(&contacts);
    }

    #[test]
    fn test_deleted_rows_are_ignored() {
        let contacts = vec![
            fixtures::primary_at(1, 0, None, Some("1")),
            fixtures::deleted(fixtures::primary_at(2, 1, None, Some("1"))),
        ];
        assertions::assert_clusters_disjoint(&contacts);
        assertions::assert_store_invariants(&contacts);
    }

    proptest! {
        #[test]
        fn prop_generated_identifiers_are_normalized(ids in generators::arb_identifiers()) {
            prop_assert!(ids.email().is_some() || ids.phone_number().is_some());
            if let Some(email) = ids.email() {
                prop_assert_eq!(email, email.trim().to_lowercase());
            }
        }

        #[test]
        fn prop_disjoint_primaries_are_well_formed(rows in generators::arb_disjoint_primaries(4)) {
            assertions::assert_store_invariants(&rows);
            assertions::assert_clusters_disjoint(&rows);
        }
    }
}
