//! Backend facade
//!
//! Everything the client needs from persistence, identity and change
//! notifications goes through [`Backend`]. The hosted implementation talks to
//! Supabase; the local one keeps the same contract on an embedded libSQL file
//! and doubles as the test backend.

mod local;
mod supabase;

pub use local::LocalBackend;
pub use supabase::SupabaseBackend;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Conversation, ConversationId, ConversationKey, ConversationOverview, Listing, ListingDetail,
    ListingId, Message, NewListing, NewMessage, UserId,
};
use crate::realtime::Subscription;
use crate::util::normalize_text_option;
use crate::Result;

/// Filter for the listing index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    /// Case-insensitive title substring; `None` lists everything.
    pub title_contains: Option<String>,
    pub limit: Option<usize>,
}

impl ListingQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// Search by title. Blank text means no filter.
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            title_contains: normalize_text_option(Some(text.into())),
            limit: None,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// The signed-in viewer, if any.
    async fn current_user(&self) -> Result<Option<UserId>>;

    /// Listings newest first.
    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>>;

    async fn get_listing(&self, id: ListingId) -> Result<Option<ListingDetail>>;

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing>;

    /// Insert the conversation for `key`, or bump `updated_at` on the existing
    /// one, in a single atomic statement.
    async fn upsert_conversation(
        &self,
        key: ConversationKey,
        touched_at: DateTime<Utc>,
    ) -> Result<Conversation>;

    /// Conversations where `user` is buyer or seller, most recent first.
    async fn list_conversations_for(&self, user: UserId) -> Result<Vec<ConversationOverview>>;

    /// Full history, oldest first.
    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>>;

    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;

    /// Inserted messages for one conversation, as they happen.
    async fn subscribe_messages(&self, conversation: ConversationId)
        -> Result<Subscription<Message>>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn current_user(&self) -> Result<Option<UserId>> {
        (**self).current_user().await
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        (**self).list_listings(query).await
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<ListingDetail>> {
        (**self).get_listing(id).await
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing> {
        (**self).insert_listing(listing).await
    }

    async fn upsert_conversation(
        &self,
        key: ConversationKey,
        touched_at: DateTime<Utc>,
    ) -> Result<Conversation> {
        (**self).upsert_conversation(key, touched_at).await
    }

    async fn list_conversations_for(&self, user: UserId) -> Result<Vec<ConversationOverview>> {
        (**self).list_conversations_for(user).await
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        (**self).list_messages(conversation).await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        (**self).insert_message(message).await
    }

    async fn subscribe_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Subscription<Message>> {
        (**self).subscribe_messages(conversation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_no_filter() {
        assert_eq!(ListingQuery::search("   "), ListingQuery::all());
        assert_eq!(
            ListingQuery::search(" iphone ").title_contains.as_deref(),
            Some("iphone")
        );
        assert_eq!(ListingQuery::all().with_limit(5).limit, Some(5));
    }
}
