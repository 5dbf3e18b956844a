//! Notification fan-out for WebSocket subscribers.
//!
//! [`EventBroadcaster`] wraps a tokio broadcast channel. Every applied
//! mutation is sent once and delivered to every subscriber in send order.
//! A subscriber that falls more than the channel capacity behind receives
//! `RecvError::Lagged` and misses the overwritten notifications.

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::types::Notification;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Cloneable handle to the notification channel.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: Sender<Notification>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster holding at most `capacity` undelivered
    /// notifications per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created event broadcaster");
        Self { sender }
    }

    /// Subscribes to notifications sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Notification> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Sends `notification` to every current subscriber and returns how many
    /// there were.
    pub fn broadcast(&self, notification: Notification) -> usize {
        trace!(event = notification.event_name(), "Broadcasting notification");

        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for notification");
                0
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
