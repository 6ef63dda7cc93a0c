//! Response Builder: flatten a cluster into its consolidated view.

use std::collections::HashSet;

use reconcile_core::{Contact, ConsolidatedContact, ContactId};

/// Build the consolidated view of `primary` and its cluster.
///
/// `cluster` may or may not contain the primary row itself. Emails and
/// phone numbers start with the primary's own values (when present), then
/// the remaining distinct values in cluster order. Secondary ids are
/// ascending.
pub fn consolidate(primary: &Contact, cluster: &[Contact]) -> ConsolidatedContact {
    let members = std::iter::once(primary).chain(cluster.iter().filter(|c| c.id != primary.id));

    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    let mut seen_emails = HashSet::new();
    let mut seen_phones = HashSet::new();
    let mut secondary_contact_ids: Vec<ContactId> = Vec::new();

    for member in members {
        if let Some(email) = member.email.as_deref() {
            if seen_emails.insert(email) {
                emails.push(email.to_string());
            }
        }
        if let Some(phone) = member.phone_number.as_deref() {
            if seen_phones.insert(phone) {
                phone_numbers.push(phone.to_string());
            }
        }
        if member.id != primary.id {
            secondary_contact_ids.push(member.id);
        }
    }

    secondary_contact_ids.sort_unstable();
    secondary_contact_ids.dedup();

    ConsolidatedContact {
        primary_contact_id: primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_test_utils::fixtures::{primary_at, secondary_at};

    #[test]
    fn test_primary_values_lead() {
        let primary = primary_at(4, 0, Some("p@x.com"), Some("400"));
        let cluster = vec![
            primary.clone(),
            secondary_at(9, 1, 4, Some("s@x.com"), Some("400")),
            secondary_at(2, 2, 4, Some("p@x.com"), Some("200")),
        ];

        let view = consolidate(&primary, &cluster);
        assert_eq!(view.primary_contact_id, ContactId(4));
        assert_eq!(view.emails, vec!["p@x.com", "s@x.com"]);
        assert_eq!(view.phone_numbers, vec!["400", "200"]);
        assert_eq!(view.secondary_contact_ids, vec![ContactId(2), ContactId(9)]);
    }

    #[test]
    fn test_primary_without_email_does_not_lead_with_null() {
        let primary = primary_at(1, 0, None, Some("100"));
        let cluster = vec![secondary_at(2, 5, 1, Some("s@x.com"), Some("100"))];

        let view = consolidate(&primary, &cluster);
        assert_eq!(view.emails, vec!["s@x.com"]);
        assert_eq!(view.phone_numbers, vec!["100"]);
        assert_eq!(view.secondary_contact_ids, vec![ContactId(2)]);
    }

    #[test]
    fn test_lone_primary() {
        let primary = primary_at(1, 0, Some("a@x.com"), None);
        let view = consolidate(&primary, std::slice::from_ref(&primary));
        assert_eq!(view.emails, vec!["a@x.com"]);
        assert!(view.phone_numbers.is_empty());
        assert!(view.secondary_contact_ids.is_empty());
    }
}
