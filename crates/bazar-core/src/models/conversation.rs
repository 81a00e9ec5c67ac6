//! Conversation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::display_name_or_fallback;
use super::{null_as_default, ConversationId, ListingId, UserId};

/// The chat thread for one listing and one buyer/seller pair.
///
/// At most one row exists per [`ConversationKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Last activity
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    #[must_use]
    pub const fn key(&self) -> ConversationKey {
        ConversationKey {
            listing_id: self.listing_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
        }
    }

    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}

/// Uniqueness key of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
}

impl ConversationKey {
    /// Column list of the backend's unique constraint
    pub const CONFLICT_COLUMNS: &'static str = "listing_id,buyer_id,seller_id";
}

/// Listing fields shown next to a conversation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListingSnippet {
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameSnippet {
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Conversation row joined with its listing and both participant names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationOverview {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default)]
    pub listing: Option<ListingSnippet>,
    #[serde(default)]
    pub buyer: Option<NameSnippet>,
    #[serde(default)]
    pub seller: Option<NameSnippet>,
}

/// Which side of the deal the viewer is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerRole {
    Buyer,
    Seller,
}

impl ViewerRole {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Buyer => "You want to buy",
            Self::Seller => "They want to buy your item",
        }
    }
}

/// One inbox row as presented to a viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    pub conversation_id: ConversationId,
    pub listing_id: ListingId,
    pub listing_title: Option<String>,
    pub cover_image: Option<String>,
    pub counterpart_name: String,
    pub role: ViewerRole,
    pub updated_at: DateTime<Utc>,
}

impl ConversationOverview {
    /// Present this row from `viewer`'s point of view.
    #[must_use]
    pub fn inbox_entry(&self, viewer: UserId) -> InboxEntry {
        let role = if self.conversation.buyer_id == viewer {
            ViewerRole::Buyer
        } else {
            ViewerRole::Seller
        };
        let counterpart = match role {
            ViewerRole::Buyer => self.seller.as_ref(),
            ViewerRole::Seller => self.buyer.as_ref(),
        };
        let counterpart_name =
            display_name_or_fallback(counterpart.and_then(|name| name.full_name.as_deref()))
                .to_string();

        InboxEntry {
            conversation_id: self.conversation.id,
            listing_id: self.conversation.listing_id,
            listing_title: self.listing.as_ref().map(|listing| listing.title.clone()),
            cover_image: self
                .listing
                .as_ref()
                .and_then(|listing| listing.images.first().cloned()),
            counterpart_name,
            role,
            updated_at: self.conversation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overview(buyer: UserId, seller: UserId) -> ConversationOverview {
        let json = serde_json::json!({
            "id": ConversationId::new(),
            "listing_id": ListingId::new(),
            "buyer_id": buyer,
            "seller_id": seller,
            "updated_at": "2024-05-01T10:00:00Z",
            "listing": { "title": "Bike", "images": ["https://img/1.jpg"] },
            "buyer": { "full_name": "Bruno" },
            "seller": { "full_name": null }
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn buyer_sees_seller_name_and_buy_label() {
        let (buyer, seller) = (UserId::new(), UserId::new());
        let entry = overview(buyer, seller).inbox_entry(buyer);
        assert_eq!(entry.role, ViewerRole::Buyer);
        assert_eq!(entry.counterpart_name, "User");
        assert_eq!(entry.role.label(), "You want to buy");
        assert_eq!(entry.cover_image.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn seller_sees_buyer_name() {
        let (buyer, seller) = (UserId::new(), UserId::new());
        let entry = overview(buyer, seller).inbox_entry(seller);
        assert_eq!(entry.role, ViewerRole::Seller);
        assert_eq!(entry.counterpart_name, "Bruno");
        assert_eq!(entry.listing_title.as_deref(), Some("Bike"));
    }

    #[test]
    fn key_matches_conflict_columns() {
        let (buyer, seller) = (UserId::new(), UserId::new());
        let conversation = overview(buyer, seller).conversation;
        let key = serde_json::to_value(conversation.key()).unwrap();
        let mut columns = key.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        columns.sort();
        let mut expected = ConversationKey::CONFLICT_COLUMNS.split(',').collect::<Vec<_>>();
        expected.sort_unstable();
        assert_eq!(columns, expected);
        assert!(conversation.involves(buyer));
        assert!(!conversation.involves(UserId::new()));
    }
}
