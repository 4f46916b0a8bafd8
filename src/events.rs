use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events emitted by the build-order services.
///
/// Events are sent after a transaction commits, never from inside it, so a
/// consumer never observes an event for work that was rolled back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Build lifecycle events
    BuildCreated(Uuid),
    BuildCancelled(Uuid),
    BuildCompleted {
        build_id: Uuid,
        output_stock_item_id: Uuid,
    },
    BuildUnallocated {
        build_id: Uuid,
        records_removed: u64,
    },

    // Allocation events
    StockAllocated {
        build_id: Uuid,
        stock_item_id: Uuid,
        quantity: i32,
    },

    // Stock events
    StockItemCreated(Uuid),
    StockItemDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
