//! Listing model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::deserialize_location;
use super::{null_as_default, CategoryId, GeoPoint, ListingId, Price, Profile, UserId};

/// A category a listing is filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    /// Categories shipped with every backend.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        [(1, "Technology"), (2, "Cars"), (3, "Real Estate")]
            .into_iter()
            .map(|(id, name)| Self {
                id: CategoryId(id),
                name: name.to_string(),
            })
            .collect()
    }

    #[must_use]
    pub fn builtin_by_id(id: CategoryId) -> Option<Self> {
        Self::builtin().into_iter().find(|category| category.id == id)
    }
}

/// A for-sale item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    /// Seller
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    pub price: Price,
    pub category_id: CategoryId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    /// Free-text address
    #[serde(default, rename = "address_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "deserialize_location")]
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    #[must_use]
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Case-insensitive substring match on the title.
    #[must_use]
    pub fn title_matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(&query.to_lowercase())
    }
}

/// A listing joined with its category and seller profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(default, rename = "categories")]
    pub category: Option<Category>,
    #[serde(default, rename = "profiles")]
    pub seller: Option<Profile>,
}

/// Row inserted when publishing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Price,
    pub category_id: CategoryId,
    pub images: Vec<String>,
    pub location: GeoPoint,
    #[serde(rename = "address_text")]
    pub address: Option<String>,
}

/// Raw form fields as typed by the seller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDraft {
    pub title: String,
    pub price: String,
    pub description: String,
    pub category_id: CategoryId,
    pub address: Option<String>,
}
