//! In-process event bus
//!
//! Services broadcast state transitions over `tokio::sync::broadcast` so that
//! caches, notifiers and tests can observe them. Emitting never blocks: with
//! no subscribers the event is dropped, and a lagging subscriber loses the
//! oldest events rather than slowing the emitter.
//!
//! # Example
//!
//! ```
//! use libpagecast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::LibraryInvalidated {
//!     user_id: "user-1".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, ScheduleState};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A publish batch is about to dispatch
    PublishStarted {
        content_id: String,
        user_id: String,
        account_ids: Vec<String>,
    },

    AccountPublished {
        content_id: String,
        account_id: String,
        platform: Platform,
        external_post_id: String,
    },

    AccountFailed {
        content_id: String,
        account_id: String,
        platform: Option<Platform>,
        error: String,
        retryable: bool,
    },

    /// The user's library and content caches are stale
    LibraryInvalidated { user_id: String },

    AccountDeactivated {
        user_id: String,
        account_id: String,
        reason: String,
    },

    /// A scheduled post was created, moved or reached a new state
    ScheduleChanged {
        post_id: String,
        user_id: String,
        state: ScheduleState,
        scheduled_at: i64,
    },

    /// One promotion run finished
    PromotionCompleted {
        claimed: usize,
        published: usize,
        failed: usize,
        skipped: usize,
    },
}
