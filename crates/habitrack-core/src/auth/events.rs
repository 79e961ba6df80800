use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the broadcast channel handed to presentation-layer subscribers
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// Renewal failed or was impossible; the user has to log in again.
    Expired,
}

type Hook = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Fan-out point for session lifecycle events.
///
/// Hooks run synchronously inside [`SessionEvents::emit`], before the
/// operation that raised the event returns. Broadcast subscribers are
/// notified after the hooks and may observe the event later.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
    hooks: Arc<Mutex<Vec<Hook>>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn on_event(&self, hook: impl Fn(SessionEvent) + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(hook));
    }

    pub fn emit(&self, event: SessionEvent) {
        // Snapshot so a hook may register further hooks without deadlocking.
        let hooks: Vec<Hook> = self
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for hook in hooks {
            hook(event);
        }
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(?event, receivers, "Session event emitted");
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
