use std::sync::Arc;

use crate::display::domain::display_host::{DisplayHandler, DisplayHost, ListenerId, ListenerKind};

/// Keeps one listener registered for as long as the guard lives.
pub struct ListenerGuard {
    host: Arc<dyn DisplayHost>,
    id: ListenerId,
    kind: ListenerKind,
}

impl ListenerGuard {
    pub fn register(host: Arc<dyn DisplayHost>, kind: ListenerKind, handler: DisplayHandler) -> Self {
        let id = host.add_listener(kind, handler);
        log::debug!("Registered {kind:?} {id}");
        Self { host, id, kind }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if !self.host.remove_listener(self.id) {
            log::warn!("{:?} {} was already removed", self.kind, self.id);
        }
    }
}
