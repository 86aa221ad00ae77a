use std::fmt;

use crate::shared::size::Size;

/// Identifies one listener registration. Removing by id removes exactly the
/// registration that returned it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Layout changes of the video element itself.
    ResizeObserver,
    /// Window resizes; fallback for hosts whose observer misses changes.
    WindowResize,
    /// Document visibility.
    Visibility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    ElementResized,
    WindowResized,
    VisibilityChanged { hidden: bool },
}

pub type DisplayHandler = Box<dyn Fn(DisplayEvent) + Send + Sync>;

/// Display collaborator: where the video is laid out, and the event sources
/// the session listens to.
///
/// Handlers may be invoked from any thread and must not block.
pub trait DisplayHost: Send + Sync {
    /// Current rendered box of the video element, `None` if there is no
    /// element to render into.
    fn rendered_size(&self) -> Option<Size>;

    fn is_hidden(&self) -> bool;

    fn add_listener(&self, kind: ListenerKind, handler: DisplayHandler) -> ListenerId;

    /// Returns `false` when `id` was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}
