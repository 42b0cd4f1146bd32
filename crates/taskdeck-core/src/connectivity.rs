use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::backend::StorageBackend;

#[derive(Debug, Default)]
struct ConnectivityState {
    checked: AtomicBool,
    online: AtomicBool,
}

/// Whether the remote API is used, decided once per session.
///
/// The first [`probe`](Self::probe) asks the backend's health endpoint and
/// caches the answer. A later remote failure calls
/// [`mark_offline`](Self::mark_offline), which sticks for the rest of the
/// session. Clones share the same verdict, so presentation code can hold one
/// for its connection indicator.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityPolicy {
    state: Arc<ConnectivityState>,
}

impl ConnectivityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Already decided: never talk to the remote.
    pub fn offline() -> Self {
        Self::decided(false)
    }

    /// Already decided: use the remote until a call fails.
    pub fn online() -> Self {
        Self::decided(true)
    }

    fn decided(online: bool) -> Self {
        let policy = Self::default();
        policy.state.checked.store(true, Ordering::SeqCst);
        policy.state.online.store(online, Ordering::SeqCst);
        policy
    }

    pub fn is_checked(&self) -> bool {
        self.state.checked.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        self.state.online.load(Ordering::SeqCst)
    }

    #[tracing::instrument(skip_all)]
    pub async fn probe<B>(&self, backend: &B) -> bool
    where
        B: StorageBackend + Sync + ?Sized,
    {
        if self.state.checked.swap(true, Ordering::SeqCst) {
            return self.is_online();
        }

        let online = match backend.health().await {
            Ok(()) => {
                info!("remote API reachable");
                true
            }
            Err(err) => {
                info!(error = %err, "remote API unavailable; using local storage");
                false
            }
        };
        self.state.online.store(online, Ordering::SeqCst);
        online
    }

    pub fn mark_offline(&self) {
        self.state.checked.store(true, Ordering::SeqCst);
        if self.state.online.swap(false, Ordering::SeqCst) {
            warn!("remote API failed; switching to local storage for this session");
        }
    }
}
