//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::SessionCache;
use crate::db::UserStore;
use crate::services::AuthService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// credential service and the backends it runs on.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    auth: AuthService,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn SessionCache>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        auth: AuthService,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                auth,
                users,
                cache,
            }),
        }
    }

    /// Get a reference to the credential service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Get a reference to the durable user store.
    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.users.as_ref()
    }

    /// Get a reference to the session cache backend.
    #[must_use]
    pub fn cache(&self) -> &dyn SessionCache {
        self.inner.cache.as_ref()
    }
}
