use std::sync::Arc;

use bazar_core::backend::Backend;
use bazar_core::conversation::ConversationResolver;
use bazar_core::listings::ListingService;
use bazar_core::models::{ConversationId, ListingId};
use chrono::Utc;

use crate::cli::Target;
use crate::commands::common::{connect, format_inbox_lines, parse_id};
use crate::error::CliError;

/// Resolve the conversation between the viewer and the listing's seller.
pub async fn contact_seller(
    backend: Arc<dyn Backend>,
    listing_id: ListingId,
) -> Result<ConversationId, CliError> {
    let detail = ListingService::new(Arc::clone(&backend))
        .detail(listing_id)
        .await?;
    let conversation = ConversationResolver::new(backend)
        .open(listing_id, detail.listing.owner_id)
        .await?;
    Ok(conversation)
}

pub async fn run_contact(target: &Target, listing: &str) -> Result<(), CliError> {
    let listing_id: ListingId = parse_id("listing", listing)?;
    let context = connect(target).await?;
    let conversation = contact_seller(context.backend, listing_id).await?;
    println!("{conversation}");
    eprintln!("Run `bazar chat {conversation}` to start talking.");
    Ok(())
}

pub async fn run_inbox(target: &Target, as_json: bool) -> Result<(), CliError> {
    let context = connect(target).await?;
    let entries = ConversationResolver::new(context.backend).inbox().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No conversations yet.");
    } else {
        for line in format_inbox_lines(&entries, Utc::now()) {
            println!("{line}");
        }
    }
    Ok(())
}
