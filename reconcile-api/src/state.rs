//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use reconcile_engine::IdentityResolver;
use reconcile_storage::ContactStore;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub resolver: IdentityResolver,
    /// The resolver's store, for health probes.
    pub store: Arc<dyn ContactStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(resolver: IdentityResolver) -> Self {
        let store = Arc::clone(resolver.store());
        Self {
            resolver,
            store,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(IdentityResolver, resolver);
crate::impl_from_ref!(Arc<dyn ContactStore>, store);
crate::impl_from_ref!(Instant, start_time);
