//! Notification channel listener.
//!
//! Connects to the store's WebSocket endpoint, subscribes to one channel and
//! forwards decoded [`Notification`]s to the sync engine in receive order.
//!
//! # Wire format
//!
//! Every text frame is an envelope:
//!
//! ```json
//! {"event": "items", "channel": "todo", "data": {"text": "Buy milk", "completed": false}}
//! ```
//!
//! `data` may also be a string holding the encoded object. After connecting
//! the client sends `{"event": "subscribe", "channel": "todo"}`.
//!
//! # Failure handling
//!
//! A lost connection is logged and retried with exponential backoff and
//! jitter. Broadcasts sent while disconnected are lost, so once the store
//! confirms a subscription made after a loss the listener emits
//! [`ChannelEvent::Resubscribed`] and the engine re-fetches the list.
//! Malformed frames are logged and skipped. The listener exits once the
//! receiving side of its output channel is dropped.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::ChannelError;
use crate::types::{
    Frame, ItemCompletedPayload, ItemCreatedPayload, Notification, EVENT_ITEM_COMPLETED,
    EVENT_ITEM_CREATED, EVENT_SUBSCRIBED,
};

/// Initial reconnect delay in seconds.
const INITIAL_RETRY_DELAY_SECS: u64 = 1;

/// Maximum reconnect delay in seconds.
const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// What the listener hands to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A change made by any client, this one included.
    Notification(Notification),
    /// The store confirmed the first subscription.
    Subscribed,
    /// The store confirmed a subscription made after the connection was
    /// lost. Anything broadcast in between never arrived.
    Resubscribed,
}

impl From<Notification> for ChannelEvent {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

/// Decodes one text frame.
///
/// A subscription acknowledgement decodes to [`ChannelEvent::Subscribed`].
/// Returns `Ok(None)` for frames that are well formed but not for us: other
/// channels, unknown events, protocol chatter.
///
/// # Errors
///
/// Returns `ChannelError::Malformed` if the envelope or a known event's
/// payload cannot be decoded.
pub fn decode_frame(channel: &str, text: &str) -> Result<Option<ChannelEvent>, ChannelError> {
    let frame: Frame = serde_json::from_str(text)?;

    if let Some(frame_channel) = frame.channel.as_deref() {
        if frame_channel != channel {
            trace!(channel = frame_channel, "Ignoring frame for other channel");
            return Ok(None);
        }
    }

    if frame.event == EVENT_SUBSCRIBED {
        return Ok(Some(ChannelEvent::Subscribed));
    }

    // Payloads may arrive double-encoded as a JSON string.
    let data = match frame.data {
        serde_json::Value::String(encoded) => serde_json::from_str(&encoded)?,
        other => other,
    };

    let notification = match frame.event.as_str() {
        EVENT_ITEM_CREATED => {
            let payload: ItemCreatedPayload = serde_json::from_value(data)?;
            Notification::from(payload)
        }
        EVENT_ITEM_COMPLETED => {
            let payload: ItemCompletedPayload = serde_json::from_value(data)?;
            Notification::from(payload)
        }
        other => {
            debug!(event = other, "Ignoring unknown notification event");
            return Ok(None);
        }
    };

    Ok(Some(ChannelEvent::Notification(notification)))
}

/// Exponential backoff with jitter for reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = add_jitter(self.current);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Resets the delay to its initial value.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(INITIAL_RETRY_DELAY_SECS),
            Duration::from_secs(MAX_RETRY_DELAY_SECS),
        )
    }
}

/// Adds ±25% jitter to a duration.
fn add_jitter(duration: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * JITTER_FACTOR;
    let jitter = rng.random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.0))
}

/// Subscribes to the notification channel and feeds the sync engine.
#[derive(Debug, Clone)]
pub struct NotificationListener {
    url: String,
    channel: String,
    backoff: Backoff,
    confirmed_before: bool,
}

impl NotificationListener {
    /// Creates a listener for `channel` at the WebSocket `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
            backoff: Backoff::default(),
            confirmed_before: false,
        }
    }

    /// Replaces the reconnect backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs the listener on a new task.
    pub fn spawn(self, tx: mpsc::Sender<ChannelEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }

    /// Connects, subscribes and forwards notifications until `tx` closes.
    pub async fn run(mut self, tx: mpsc::Sender<ChannelEvent>) {
        loop {
            match self.session(&tx).await {
                Ok(()) => {}
                Err(e) => warn!(url = %self.url, error = %e, "Notification channel lost"),
            }

            if tx.is_closed() {
                debug!("Notification receiver dropped, stopping listener");
                return;
            }

            let delay = self.backoff.next_delay();
            info!(delay_ms = delay.as_millis(), "Reconnecting to notification channel");
            sleep(delay).await;
        }
    }

    /// One connection lifetime. Returns `Ok(())` only when `tx` closed.
    async fn session(&mut self, tx: &mpsc::Sender<ChannelEvent>) -> Result<(), ChannelError> {
        let (mut ws, _response) = connect_async(self.url.as_str()).await?;

        let subscribe = serde_json::to_string(&Frame::subscribe(&self.channel))?;
        ws.send(Message::Text(subscribe.into())).await?;

        info!(url = %self.url, channel = %self.channel, "Subscribed to notification channel");
        self.backoff.reset();

        loop {
            let message = tokio::select! {
                () = tx.closed() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                message = ws.next() => message,
            };
            let Some(message) = message else {
                break;
            };

            match message? {
                Message::Text(text) => {
                    let event = match decode_frame(&self.channel, text.as_str()) {
                        Ok(Some(ChannelEvent::Subscribed)) => self.on_confirmed(),
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(error = %e, "Dropping malformed notification frame");
                            continue;
                        }
                    };
                    if let ChannelEvent::Notification(notification) = &event {
                        trace!(kind = ?notification.kind(), "Notification received");
                    }
                    if tx.send(event).await.is_err() {
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
                Message::Close(frame) => {
                    debug!(?frame, "Server closed notification channel");
                    break;
                }
                _ => {}
            }
        }

        Err(ChannelError::Closed)
    }

    fn on_confirmed(&mut self) -> ChannelEvent {
        if self.confirmed_before {
            info!(channel = %self.channel, "Subscription restored, changes may have been missed");
            ChannelEvent::Resubscribed
        } else {
            debug!(channel = %self.channel, "Subscription confirmed");
            self.confirmed_before = true;
            ChannelEvent::Subscribed
        }
    }
}
