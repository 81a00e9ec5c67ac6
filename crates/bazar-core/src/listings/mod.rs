//! Listing browser and publisher.

use std::sync::Arc;

use crate::backend::{Backend, ListingQuery};
use crate::media::{ImageFile, MediaUploader};
use crate::models::{
    Category, GeoPoint, Listing, ListingDetail, ListingDraft, ListingId, NewListing, Price, UserId,
};
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub struct ListingService<B: Backend + ?Sized> {
    backend: Arc<B>,
    media: Option<Arc<dyn MediaUploader>>,
}

impl<B: Backend + ?Sized> ListingService<B> {
    pub const fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            media: None,
        }
    }

    #[must_use]
    pub fn with_media(mut self, uploader: Arc<dyn MediaUploader>) -> Self {
        self.media = Some(uploader);
        self
    }

    /// Newest first, optionally filtered by a title substring.
    pub async fn browse(&self, text: Option<&str>) -> Result<Vec<Listing>> {
        let query = text.map_or_else(ListingQuery::all, ListingQuery::search);
        self.backend.list_listings(&query).await
    }

    pub async fn detail(&self, id: ListingId) -> Result<ListingDetail> {
        self.backend
            .get_listing(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("listing {id}")))
    }

    /// Validate, upload the image if any, then insert.
    ///
    /// Validation runs before any network call and a failed upload aborts
    /// before the listing row is written.
    pub async fn publish(&self, draft: &ListingDraft, image: Option<&ImageFile>) -> Result<Listing> {
        let owner = self
            .backend
            .current_user()
            .await?
            .ok_or(Error::Unauthenticated)?;
        let mut listing = validate_draft(draft, owner)?;

        if let Some(image) = image {
            let uploader = self
                .media
                .as_ref()
                .ok_or_else(|| Error::validation("Image upload is not configured"))?;
            listing.images.push(uploader.upload_image(image).await?);
        }

        let stored = self.backend.insert_listing(&listing).await?;
        tracing::info!(listing = %stored.id, "Published listing");
        Ok(stored)
    }
}

/// Turn raw form fields into an insertable row.
pub fn validate_draft(draft: &ListingDraft, owner: UserId) -> Result<NewListing> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(Error::validation("Title is required"));
    }
    let description = draft.description.trim();
    if description.is_empty() {
        return Err(Error::validation("Description is required"));
    }
    let price = Price::parse(&draft.price).map_err(Error::Validation)?;
    if Category::builtin_by_id(draft.category_id).is_none() {
        return Err(Error::validation(format!(
            "Unknown category {}",
            draft.category_id.0
        )));
    }

    Ok(NewListing {
        owner_id: owner,
        title: title.to_string(),
        description: description.to_string(),
        price,
        category_id: draft.category_id,
        images: Vec::new(),
        // No geocoding yet
        location: GeoPoint::PLACEHOLDER,
        address: normalize_text_option(draft.address.clone()),
    })
}
