use std::future::Future;
use std::sync::Arc;

use super::state::{ConfirmOutcome, MessageFeed, RemoteOutcome};
use crate::backend::Backend;
use crate::models::{ConversationId, FeedEntry, Message, PendingMessage, TempId, UserId};
use crate::realtime::{ChannelEvent, ChannelStatus, Subscription};
use crate::{Error, Result};

/// Result of one durable insert started by [`FeedController::deliver`]
#[derive(Debug)]
pub struct Delivery {
    pub temp_id: TempId,
    pub result: Result<Message>,
}

/// A change applied to the feed by the realtime channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Status(ChannelStatus),
    Message(RemoteOutcome),
}

/// Live view of one conversation.
///
/// Dropping the controller releases its realtime subscription.
pub struct FeedController<B: Backend + ?Sized> {
    backend: Arc<B>,
    feed: MessageFeed,
    subscription: Option<Subscription<Message>>,
    status: ChannelStatus,
}

impl<B: Backend + ?Sized + 'static> FeedController<B> {
    /// Authenticate, subscribe, then load history.
    ///
    /// Subscribing first means nothing inserted while history loads is missed;
    /// overlap between the two is removed by id.
    pub async fn open(backend: Arc<B>, conversation: ConversationId) -> Result<Self> {
        let viewer = backend.current_user().await?.ok_or(Error::Unauthenticated)?;
        let subscription = backend.subscribe_messages(conversation).await?;

        let mut feed = MessageFeed::new(conversation, viewer);
        feed.load_history(backend.list_messages(conversation).await?);
        tracing::debug!(%conversation, messages = feed.len(), "Opened message feed");

        Ok(Self {
            backend,
            feed,
            subscription: Some(subscription),
            status: ChannelStatus::Connecting,
        })
    }

    pub const fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn entries(&self) -> &[FeedEntry] {
        self.feed.entries()
    }

    pub const fn viewer(&self) -> UserId {
        self.feed.viewer()
    }

    pub const fn status(&self) -> &ChannelStatus {
        &self.status
    }

    /// Wait for the next realtime event and apply it.
    ///
    /// Returns `None` once the channel has ended; the feed stays usable for
    /// sending but receives nothing further.
    pub async fn next_update(&mut self) -> Option<FeedUpdate> {
        let event = self.subscription.as_mut()?.next().await;
        match event {
            Some(ChannelEvent::Status(status)) => {
                self.status = status.clone();
                Some(FeedUpdate::Status(status))
            }
            Some(ChannelEvent::Insert(message)) => {
                Some(FeedUpdate::Message(self.feed.apply_remote(message)))
            }
            None => {
                self.subscription = None;
                if self.status.is_live() || self.status == ChannelStatus::Connecting {
                    self.status = ChannelStatus::Closed;
                }
                None
            }
        }
    }

    /// Echo `text` locally as a pending entry.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingMessage> {
        self.feed.begin_send(text)
    }

    /// The durable insert for `pending`, detached from the controller so the
    /// caller can keep handling events while it runs.
    pub fn deliver(
        &self,
        pending: &PendingMessage,
    ) -> impl Future<Output = Delivery> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let temp_id = pending.temp_id;
        let row = pending.to_insert();
        async move {
            Delivery {
                temp_id,
                result: backend.insert_message(&row).await,
            }
        }
    }

    /// Apply a finished delivery: confirm on success, roll back on failure.
    pub fn complete(&mut self, delivery: Delivery) -> Result<ConfirmOutcome> {
        match delivery.result {
            Ok(message) => Ok(self.feed.confirm(delivery.temp_id, message)),
            Err(error) => {
                tracing::warn!("Message send failed: {error}");
                self.feed.fail(delivery.temp_id);
                Err(error)
            }
        }
    }

    /// Optimistic send awaited in place.
    pub async fn send(&mut self, text: &str) -> Result<ConfirmOutcome> {
        let pending = self.begin_send(text)?;
        let delivery = self.deliver(&pending).await;
        self.complete(delivery)
    }

    /// Release the realtime subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
            self.status = ChannelStatus::Closed;
            tracing::debug!(conversation = %self.feed.conversation(), "Closed message feed");
        }
    }
}
