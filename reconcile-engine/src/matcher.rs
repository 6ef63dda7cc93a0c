//! Match Finder: every live contact sharing an identifier with the request.

use reconcile_core::{oldest_first, Contact, Identifiers, ReconcileResult};
use reconcile_storage::ContactStore;

/// Live rows whose email or phone equals the request's, oldest first.
pub async fn find_matches(
    store: &dyn ContactStore,
    identifiers: &Identifiers,
) -> ReconcileResult<Vec<Contact>> {
    let mut matches = store.find_matches(identifiers).await?;
    matches.retain(Contact::is_live);
    oldest_first(&mut matches);

    tracing::debug!(
        match_count = matches.len(),
        match_ids = ?matches.iter().map(|c| c.id).collect::<Vec<_>>(),
        "Matched existing contacts"
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_storage::InMemoryContactStore;

    #[tokio::test]
    async fn test_matches_on_either_identifier() {
        let store = InMemoryContactStore::new();
        let by_email = store
            .insert_primary(&Identifiers::normalize(Some("a@x.com"), None).unwrap())
            .await
            .unwrap();
        let by_phone = store
            .insert_primary(&Identifiers::normalize(None, Some("111")).unwrap())
            .await
            .unwrap();
        store
            .insert_primary(&Identifiers::normalize(Some("z@x.com"), Some("999")).unwrap())
            .await
            .unwrap();

        let request = Identifiers::normalize(Some("A@x.com"), Some("111")).unwrap();
        let matches = find_matches(&store, &request).await.unwrap();
        let ids: Vec<_> = matches.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![by_email.id, by_phone.id]);
    }

    #[tokio::test]
    async fn test_absent_identifier_never_matches_null_column() {
        let store = InMemoryContactStore::new();
        store
            .insert_primary(&Identifiers::normalize(None, Some("111")).unwrap())
            .await
            .unwrap();

        let request = Identifiers::normalize(Some("a@x.com"), None).unwrap();
        assert!(find_matches(&store, &request).await.unwrap().is_empty());
    }
}
