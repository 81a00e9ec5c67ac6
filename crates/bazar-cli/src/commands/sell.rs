use std::path::Path;
use std::sync::Arc;

use bazar_core::listings::ListingService;
use bazar_core::media::ImageFile;
use bazar_core::models::{CategoryId, ListingDraft};
use chrono::Utc;

use crate::cli::{SellArgs, Target};
use crate::commands::common::{connect, listing_to_list_item};
use crate::error::CliError;

pub fn draft_from_args(args: &SellArgs) -> ListingDraft {
    ListingDraft {
        title: args.title.clone(),
        price: args.price.clone(),
        description: args.description.clone(),
        category_id: CategoryId(args.category),
        address: args.address.clone(),
    }
}

pub fn read_image(path: &Path) -> Result<ImageFile, CliError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());
    Ok(ImageFile::new(file_name, bytes))
}

pub async fn run_sell(target: &Target, args: SellArgs) -> Result<(), CliError> {
    let draft = draft_from_args(&args);
    let image = args.image.as_deref().map(read_image).transpose()?;

    let context = connect(target).await?;
    let mut service = ListingService::new(Arc::clone(&context.backend));
    if let Some(media) = &context.media {
        service = service.with_media(Arc::clone(media));
    }
    let listing = service.publish(&draft, image.as_ref()).await?;

    if args.json {
        let item = listing_to_list_item(&listing, Utc::now());
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Published {} ({})", listing.title, listing.id);
    }
    Ok(())
}
