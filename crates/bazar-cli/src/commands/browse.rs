use std::sync::Arc;

use bazar_core::listings::ListingService;
use bazar_core::models::{Category, GeoPoint, ListingDetail, ListingId};
use chrono::Utc;
use serde::Serialize;

use crate::cli::Target;
use crate::commands::common::{connect, format_listing_lines, listing_to_list_item, parse_id};
use crate::error::CliError;

pub async fn run_list(target: &Target, query: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let context = connect(target).await?;
    let listings = ListingService::new(Arc::clone(&context.backend))
        .browse(query)
        .await?;
    let now = Utc::now();

    if as_json {
        let items = listings
            .iter()
            .map(|listing| listing_to_list_item(listing, now))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if listings.is_empty() {
        println!("No listings found.");
    } else {
        for line in format_listing_lines(&listings, now) {
            println!("{line}");
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ListingDetailItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub category: Option<String>,
    pub seller_id: String,
    pub seller_name: Option<String>,
    pub images: Vec<String>,
    pub address: Option<String>,
    pub map_url: String,
    pub created_at: String,
}

pub fn detail_to_item(detail: &ListingDetail) -> ListingDetailItem {
    let listing = &detail.listing;
    ListingDetailItem {
        id: listing.id.to_string(),
        title: listing.title.clone(),
        description: listing.description.clone(),
        price: listing.price.to_string(),
        category: detail.category.as_ref().map(|category| category.name.clone()),
        seller_id: listing.owner_id.to_string(),
        seller_name: detail
            .seller
            .as_ref()
            .map(|seller| seller.display_name().to_string()),
        images: listing.images.clone(),
        address: listing.address.clone(),
        map_url: GeoPoint::display_or_default(listing.location).osm_url(),
        created_at: listing.created_at.to_rfc3339(),
    }
}

pub fn format_detail_lines(item: &ListingDetailItem) -> Vec<String> {
    let mut lines = vec![
        item.title.clone(),
        format!("Price:    {}", item.price),
        format!(
            "Category: {}",
            item.category.as_deref().unwrap_or("(unknown)")
        ),
        format!(
            "Seller:   {} ({})",
            item.seller_name.as_deref().unwrap_or("User"),
            item.seller_id
        ),
    ];
    if let Some(address) = &item.address {
        lines.push(format!("Address:  {address}"));
    }
    lines.push(format!("Map:      {}", item.map_url));
    for image in &item.images {
        lines.push(format!("Image:    {image}"));
    }
    lines.push(String::new());
    lines.push(item.description.clone());
    lines
}

pub async fn run_show(target: &Target, id: &str, as_json: bool) -> Result<(), CliError> {
    let id: ListingId = parse_id("listing", id)?;
    let context = connect(target).await?;
    let detail = ListingService::new(Arc::clone(&context.backend))
        .detail(id)
        .await?;
    let item = detail_to_item(&detail);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        for line in format_detail_lines(&item) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn run_categories() {
    for category in Category::builtin() {
        println!("{:>3}  {}", category.id, category.name);
    }
}
