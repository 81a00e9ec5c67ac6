//! Realtime change notifications
//!
//! A [`Subscription`] is the receiving end of a typed stream of change
//! events for one `{table, INSERT, column = value}` scope. Whoever holds it
//! owns the underlying channel; dropping or closing it releases the channel
//! and no further events are delivered.

mod client;
mod phoenix;

pub use client::{realtime_socket_url, RealtimeClient};
pub use phoenix::{ChangeFilter, Inbound, PhoenixFrame};

use tokio::sync::{mpsc, oneshot};

/// Buffered events per subscription before the producer waits
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Channel connection state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    Closed,
    Error(String),
}

impl ChannelStatus {
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Subscribed)
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribed => "online",
            Self::Closed => "closed",
            Self::Error(_) => "error",
        }
    }
}

/// One item delivered through a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent<T> {
    Status(ChannelStatus),
    Insert(T),
}

/// Producer side handed to the task feeding a [`Subscription`].
pub struct SubscriptionSink<T> {
    tx: mpsc::Sender<ChannelEvent<T>>,
    shutdown: oneshot::Receiver<()>,
    released: bool,
}

impl<T> SubscriptionSink<T> {
    /// Deliver an event; returns `false` once the subscription is released.
    pub async fn send(&self, event: ChannelEvent<T>) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn status(&self, status: ChannelStatus) -> bool {
        self.send(ChannelEvent::Status(status)).await
    }

    /// Resolves when the subscription is closed or dropped.
    pub async fn released(&mut self) {
        if !self.released {
            let _ = (&mut self.shutdown).await;
            self.released = true;
        }
    }
}

/// Exclusive handle on a live change-notification channel.
pub struct Subscription<T> {
    rx: mpsc::Receiver<ChannelEvent<T>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl<T> Subscription<T> {
    /// Create a connected subscription/sink pair.
    #[must_use]
    pub fn channel() -> (Self, SubscriptionSink<T>) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                rx,
                shutdown: Some(shutdown_tx),
            },
            SubscriptionSink {
                tx,
                shutdown: shutdown_rx,
                released: false,
            },
        )
    }

    /// Next event, or `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<ChannelEvent<T>> {
        self.rx.recv().await
    }

    /// Release the channel. Equivalent to dropping the handle.
    pub fn close(self) {}

    fn release(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            self.rx.close();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.shutdown.is_none())
            .finish_non_exhaustive()
    }
}
