//! Process signal dispatch for graceful shutdown.
//!
//! The OS handler is installed once per process and forwards SIGINT/SIGTERM
//! (Ctrl-C on all platforms) to the single active [`App`](super::App) through
//! a global slot. Registration is scoped: entering `run` claims the slot if
//! it is free, and leaving `run` clears it, so a second concurrent app simply
//! runs without signal delivery.

use std::sync::Arc;
use std::sync::Once;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::app::AppShared;

static ACTIVE: Lazy<Mutex<Option<Arc<AppShared>>>> = Lazy::new(|| Mutex::new(None));
static INSTALL: Once = Once::new();

/// Claim the active-app slot. Returns false when another app already holds
/// it; the existing app stays in place.
pub(crate) fn register(app: &Arc<AppShared>) -> bool {
    {
        let mut slot = ACTIVE.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(Arc::clone(app));
    }

    INSTALL.call_once(|| {
        let result = ctrlc::set_handler(|| {
            let app = ACTIVE.lock().clone();
            if let Some(app) = app {
                tracing::info!("received shutdown signal");
                app.stop();
            }
        });
        if let Err(e) = result {
            tracing::error!("failed to install signal handler: {e}");
        }
    });

    true
}

/// Clear the slot if `app` is the one registered.
pub(crate) fn deregister(app: &Arc<AppShared>) {
    let mut slot = ACTIVE.lock();
    let owned = slot.as_ref().map(|cur| Arc::ptr_eq(cur, app)).unwrap_or(false);
    if owned {
        *slot = None;
    }
}
