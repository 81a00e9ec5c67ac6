//! Conversation resolver and inbox.
//!
//! Opening a conversation is a single upsert keyed on
//! `(listing, buyer, seller)`, so repeated or concurrent contact requests
//! converge on one row.

use std::sync::Arc;

use chrono::Utc;

use crate::backend::Backend;
use crate::models::{ConversationId, ConversationKey, InboxEntry, ListingId, UserId};
use crate::{Error, Result};

pub struct ConversationResolver<B: Backend + ?Sized> {
    backend: Arc<B>,
}

impl<B: Backend + ?Sized> ConversationResolver<B> {
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Find or create the conversation between the viewer (as buyer) and
    /// `seller_id` about `listing_id`.
    pub async fn open(&self, listing_id: ListingId, seller_id: UserId) -> Result<ConversationId> {
        let viewer = self
            .backend
            .current_user()
            .await?
            .ok_or(Error::Unauthenticated)?;
        if viewer == seller_id {
            return Err(Error::SelfContact);
        }

        let key = ConversationKey {
            listing_id,
            buyer_id: viewer,
            seller_id,
        };
        let conversation = self.backend.upsert_conversation(key, Utc::now()).await?;
        tracing::info!(
            conversation = %conversation.id,
            listing = %listing_id,
            "Opened conversation"
        );
        Ok(conversation.id)
    }

    /// The viewer's conversations, most recent activity first.
    pub async fn inbox(&self) -> Result<Vec<InboxEntry>> {
        let viewer = self
            .backend
            .current_user()
            .await?
            .ok_or(Error::Unauthenticated)?;
        let mut entries: Vec<InboxEntry> = self
            .backend
            .list_conversations_for(viewer)
            .await?
            .iter()
            .filter(|overview| overview.conversation.involves(viewer))
            .map(|overview| overview.inbox_entry(viewer))
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::models::{CategoryId, GeoPoint, NewListing, Price, Profile, ViewerRole};
    use pretty_assertions::assert_eq;

    async fn listing_by(store: &LocalBackend, seller: UserId) -> ListingId {
        store
            .insert_listing(&NewListing {
                owner_id: seller,
                title: "Road bike".to_string(),
                description: "Carbon frame".to_string(),
                price: Price::parse("900").unwrap(),
                category_id: CategoryId(2),
                images: vec![],
                location: GeoPoint::PLACEHOLDER,
                address: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeat_contact_returns_same_conversation_and_touches_it() {
        let store = LocalBackend::open_in_memory().await.unwrap();
        let (buyer, seller) = (UserId::new(), UserId::new());
        let listing = listing_by(&store, seller).await;
        let resolver = ConversationResolver::new(Arc::new(store.as_viewer(buyer)));

        let first = resolver.open(listing, seller).await.unwrap();
        let before = store.list_conversations_for(buyer).await.unwrap()[0]
            .conversation
            .updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = resolver.open(listing, seller).await.unwrap();
        let after = store.list_conversations_for(buyer).await.unwrap()[0]
            .conversation
            .updated_at;

        assert_eq!(first, second);
        assert!(after > before);
        assert_eq!(store.conversation_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_contact_creates_one_conversation() {
        let store = LocalBackend::open_in_memory().await.unwrap();
        let (buyer, seller) = (UserId::new(), UserId::new());
        let listing = listing_by(&store, seller).await;
        let resolver = ConversationResolver::new(Arc::new(store.as_viewer(buyer)));

        let (a, b) = tokio::join!(resolver.open(listing, seller), resolver.open(listing, seller));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.conversation_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn self_contact_is_refused_without_writing() {
        let store = LocalBackend::open_in_memory().await.unwrap();
        let seller = UserId::new();
        let listing = listing_by(&store, seller).await;
        let resolver = ConversationResolver::new(Arc::new(store.as_viewer(seller)));

        let error = resolver.open(listing, seller).await.unwrap_err();
        assert!(matches!(error, Error::SelfContact));
        assert_eq!(store.conversation_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn signed_out_viewer_is_sent_to_sign_in() {
        let store = LocalBackend::open_in_memory().await.unwrap();
        let seller = UserId::new();
        let listing = listing_by(&store, seller).await;
        let resolver = ConversationResolver::new(Arc::new(store.signed_out()));

        let error = resolver.open(listing, seller).await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Unauthenticated);
        assert_eq!(store.conversation_count().await.unwrap(), 0);
        assert!(matches!(
            resolver.inbox().await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn inbox_shows_both_sides_newest_first() {
        let store = LocalBackend::open_in_memory().await.unwrap();
        let (ana, bruno, carla) = (UserId::new(), UserId::new(), UserId::new());
        for (id, name) in [(ana, "Ana"), (bruno, "Bruno"), (carla, "Carla")] {
            store
                .upsert_profile(&Profile {
                    id,
                    full_name: Some(name.to_string()),
                })
                .await
                .unwrap();
        }
        let anas_listing = listing_by(&store, ana).await;
        let carlas_listing = listing_by(&store, carla).await;

        ConversationResolver::new(Arc::new(store.as_viewer(bruno)))
            .open(anas_listing, ana)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ConversationResolver::new(Arc::new(store.as_viewer(ana)))
            .open(carlas_listing, carla)
            .await
            .unwrap();

        let inbox = ConversationResolver::new(Arc::new(store.as_viewer(ana)))
            .inbox()
            .await
            .unwrap();
        let summary: Vec<_> = inbox
            .iter()
            .map(|entry| (entry.counterpart_name.as_str(), entry.role))
            .collect();
        assert_eq!(
            summary,
            vec![("Carla", ViewerRole::Buyer), ("Bruno", ViewerRole::Seller)]
        );
    }
}
