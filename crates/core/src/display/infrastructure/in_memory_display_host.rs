use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::display::domain::display_host::{
    DisplayEvent, DisplayHandler, DisplayHost, ListenerId, ListenerKind,
};
use crate::shared::size::Size;

type SharedHandler = Arc<dyn Fn(DisplayEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    kind: ListenerKind,
    handler: SharedHandler,
}

struct HostState {
    rendered: Option<Size>,
    hidden: bool,
    next_id: u64,
    listeners: Vec<Registration>,
}

/// Display host driven programmatically: the CLI uses it for a fixed-size
/// virtual display, tests use it to simulate layout and visibility changes.
pub struct InMemoryDisplayHost {
    state: Mutex<HostState>,
}

impl InMemoryDisplayHost {
    pub fn new(rendered: Size) -> Self {
        Self::with_target(Some(rendered))
    }

    /// `None` models a page without a video element.
    pub fn with_target(rendered: Option<Size>) -> Self {
        Self {
            state: Mutex::new(HostState {
                rendered,
                hidden: false,
                next_id: 1,
                listeners: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Element layout change: notifies resize observers.
    pub fn resize_element(&self, rendered: Size) {
        self.state().rendered = Some(rendered);
        self.dispatch(&[ListenerKind::ResizeObserver], DisplayEvent::ElementResized);
    }

    /// Window resize that also re-lays out the element.
    pub fn resize_window(&self, rendered: Size) {
        self.state().rendered = Some(rendered);
        self.dispatch(&[ListenerKind::ResizeObserver], DisplayEvent::ElementResized);
        self.dispatch(&[ListenerKind::WindowResize], DisplayEvent::WindowResized);
    }

    pub fn set_hidden(&self, hidden: bool) {
        {
            let mut state = self.state();
            if state.hidden == hidden {
                return;
            }
            state.hidden = hidden;
        }
        self.dispatch(
            &[ListenerKind::Visibility],
            DisplayEvent::VisibilityChanged { hidden },
        );
    }

    pub fn listener_count(&self, kind: ListenerKind) -> usize {
        self.state()
            .listeners
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        self.state().listeners.len()
    }

    fn dispatch(&self, kinds: &[ListenerKind], event: DisplayEvent) {
        // Handlers run outside the lock so they may call back into the host.
        let handlers: Vec<SharedHandler> = self
            .state()
            .listeners
            .iter()
            .filter(|r| kinds.contains(&r.kind))
            .map(|r| Arc::clone(&r.handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl DisplayHost for InMemoryDisplayHost {
    fn rendered_size(&self) -> Option<Size> {
        self.state().rendered
    }

    fn is_hidden(&self) -> bool {
        self.state().hidden
    }

    fn add_listener(&self, kind: ListenerKind, handler: DisplayHandler) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push(Registration {
            id,
            kind,
            handler: Arc::from(handler),
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|r| r.id != id);
        state.listeners.len() != before
    }
}
