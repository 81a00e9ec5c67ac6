//! Hosted backend: PostgREST rows, Realtime notifications, GoTrue identity.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Backend, ListingQuery};
use crate::auth::AuthSession;
use crate::config::SupabaseEndpoint;
use crate::models::{
    Conversation, ConversationId, ConversationKey, ConversationOverview, Listing, ListingDetail,
    ListingId, Message, NewListing, NewMessage, UserId,
};
use crate::realtime::{ChangeFilter, RealtimeClient, Subscription};
use crate::rest::{PostgrestClient, RowQuery};
use crate::{Error, Result};

const INBOX_COLUMNS: &str = "id,listing_id,buyer_id,seller_id,updated_at,\
     listing:listings(title,images),\
     buyer:profiles!buyer_id(full_name),\
     seller:profiles!seller_id(full_name)";

#[derive(Serialize)]
struct ConversationUpsert {
    #[serde(flatten)]
    key: ConversationKey,
    updated_at: DateTime<Utc>,
}

pub struct SupabaseBackend {
    rest: PostgrestClient,
    realtime: RealtimeClient,
    session: RwLock<Option<AuthSession>>,
}

impl std::fmt::Debug for SupabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseBackend")
            .field("rest", &self.rest)
            .field("viewer", &self.viewer())
            .finish_non_exhaustive()
    }
}

impl SupabaseBackend {
    /// Connect with an optional, already restored session.
    pub fn new(endpoint: &SupabaseEndpoint, session: Option<AuthSession>) -> Result<Self> {
        Ok(Self {
            rest: PostgrestClient::new(&endpoint.url, &endpoint.anon_key)?,
            realtime: RealtimeClient::new(&endpoint.url, &endpoint.anon_key),
            session: RwLock::new(session),
        })
    }

    /// Replace the session, e.g. after sign-in or a token refresh.
    pub fn set_session(&self, session: Option<AuthSession>) {
        match self.session.write() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn viewer(&self) -> Option<UserId> {
        self.read_session(|session| session.user_id())
    }

    fn access_token(&self) -> Option<String> {
        self.read_session(|session| session.access_token.clone())
    }

    fn read_session<T>(&self, read: impl FnOnce(&AuthSession) -> T) -> Option<T> {
        let guard = match self.session.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().map(read)
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn current_user(&self) -> Result<Option<UserId>> {
        Ok(self.viewer())
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let mut rows = RowQuery::table("listings")
            .select("*")
            .order("created_at", false);
        if let Some(text) = &query.title_contains {
            rows = rows.ilike_contains("title", text);
        }
        // `*` is sent as a one-character wildcard, so those rows are re-checked
        // here and the limit applies after filtering.
        let recheck = query
            .title_contains
            .as_deref()
            .filter(|text| text.contains('*'));
        if let (Some(limit), None) = (query.limit, recheck) {
            rows = rows.limit(limit);
        }
        let listings: Vec<Listing> = self.rest.fetch(&rows, self.access_token().as_deref()).await?;
        let Some(text) = recheck else {
            return Ok(listings);
        };
        Ok(listings
            .into_iter()
            .filter(|listing| listing.title_matches(text))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<ListingDetail>> {
        let rows = RowQuery::table("listings")
            .select("*,profiles(*),categories(*)")
            .eq("id", id)
            .limit(1);
        let found: Vec<ListingDetail> = self
            .rest
            .fetch(&rows, self.access_token().as_deref())
            .await?;
        Ok(found.into_iter().next())
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing> {
        let token = self.access_token().ok_or(Error::Unauthenticated)?;
        self.rest.insert("listings", listing, Some(&token)).await
    }

    async fn upsert_conversation(
        &self,
        key: ConversationKey,
        touched_at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let token = self.access_token().ok_or(Error::Unauthenticated)?;
        let row = ConversationUpsert {
            key,
            updated_at: touched_at,
        };
        self.rest
            .upsert(
                "conversations",
                &row,
                ConversationKey::CONFLICT_COLUMNS,
                Some(&token),
            )
            .await
    }

    async fn list_conversations_for(&self, user: UserId) -> Result<Vec<ConversationOverview>> {
        let rows = RowQuery::table("conversations")
            .select(INBOX_COLUMNS)
            .or(&format!("buyer_id.eq.{user},seller_id.eq.{user}"))
            .order("updated_at", false);
        self.rest.fetch(&rows, self.access_token().as_deref()).await
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let rows = RowQuery::table("messages")
            .select("*")
            .eq("conversation_id", conversation)
            .order("created_at", true);
        self.rest.fetch(&rows, self.access_token().as_deref()).await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let token = self.access_token().ok_or(Error::Unauthenticated)?;
        self.rest.insert("messages", message, Some(&token)).await
    }

    async fn subscribe_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Subscription<Message>> {
        let filter = ChangeFilter::inserts("messages", "conversation_id", conversation);
        Ok(self
            .realtime
            .subscribe_inserts(filter, self.access_token()))
    }
}
