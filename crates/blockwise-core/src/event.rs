//! Change notifications for renderers and other observers.
//!
//! ## Learning: Observer Pattern in Rust
//!
//! Rust's ownership model makes callback-based observers awkward: the
//! editor would have to hold references into its subscribers. A
//! `tokio::sync::broadcast` channel turns notifications into values:
//! - Subscribers own their receiver, the editor owns only the sender
//! - Events are cloned to every subscriber
//! - A slow subscriber lags instead of blocking the editor

use tokio::sync::broadcast;

use crate::block::BlockId;
use crate::path::Path;

/// What one committed batch changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Blocks whose content or meta changed
    pub updated: Vec<BlockId>,
    pub inserted: Vec<BlockId>,
    pub removed: Vec<BlockId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.inserted.is_empty() && self.removed.is_empty()
    }
}

/// Events emitted by the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// A batch was committed; emitted once per batch
    Changed(ChangeSet),
    /// The path (focus, block selection or text selection) changed
    PathChanged(Path),
    /// Undo or redo availability changed
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// The whole document was replaced
    ValueReplaced,
}

/// Event bus for broadcasting editor events.
pub struct EventBus {
    sender: broadcast::Sender<EditorEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        // Capacity of 256 events in the buffer
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Emits an event to all subscribers.
    pub fn emit(&self, event: EditorEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Helper for processing events asynchronously.
///
/// ## Example
///
/// ```ignore
/// let mut handler = EventHandler::new(editor.subscribe());
///
/// tokio::spawn(async move {
///     while let Some(event) = handler.next().await {
///         if let EditorEvent::Changed(changes) = event {
///             // Re-render changes.updated
///         }
///     }
/// });
/// ```
pub struct EventHandler {
    receiver: broadcast::Receiver<EditorEvent>,
}

impl EventHandler {
    pub fn new(receiver: broadcast::Receiver<EditorEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event; `None` once the editor is gone.
    pub async fn next(&mut self) -> Option<EditorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(EditorEvent::ValueReplaced);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, EditorEvent::ValueReplaced);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(EditorEvent::HistoryChanged {
            can_undo: true,
            can_redo: false,
        });

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_handler_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut handler = EventHandler::new(bus.subscribe());
        bus.emit(EditorEvent::ValueReplaced);
        drop(bus);

        assert_eq!(handler.next().await, Some(EditorEvent::ValueReplaced));
        assert_eq!(handler.next().await, None);
    }

    #[tokio::test]
    async fn test_handler_skips_lagged_events() {
        let bus = EventBus::new();
        let mut handler = EventHandler::new(bus.subscribe());
        for _ in 0..300 {
            bus.emit(EditorEvent::ValueReplaced);
        }
        bus.emit(EditorEvent::HistoryChanged {
            can_undo: false,
            can_redo: false,
        });

        // The oldest events were overwritten; the handler resumes after them.
        assert_eq!(handler.next().await, Some(EditorEvent::ValueReplaced));
    }
}
