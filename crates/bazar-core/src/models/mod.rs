//! Data models for Bazar

mod conversation;
mod geo;
mod ids;
mod listing;
mod message;
mod price;
mod profile;

pub use conversation::{
    Conversation, ConversationKey, ConversationOverview, InboxEntry, ListingSnippet, NameSnippet,
    ViewerRole,
};
pub use geo::GeoPoint;
pub use ids::{CategoryId, ConversationId, ListingId, MessageId, TempId, UserId};
pub use listing::{Category, Listing, ListingDetail, ListingDraft, NewListing};
pub use message::{FeedEntry, Message, NewMessage, PendingMessage};
pub use price::Price;
pub use profile::Profile;

use serde::{Deserialize, Deserializer};

/// Deserialize a nullable JSON value into `T::default()` when it is `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
