use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use bazar_core::backend::{Backend, LocalBackend, SupabaseBackend};
use bazar_core::config::ClientConfig;
use bazar_core::media::{CloudinaryUploader, MediaUploader};
use bazar_core::models::{FeedEntry, InboxEntry, Listing, Profile, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::SupabaseAuthService;
use crate::cli::Target;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

const ENV_DB_PATH: &str = "BAZAR_DB_PATH";
const ENV_USER: &str = "BAZAR_USER";

/// Where the connected backend lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Local(PathBuf),
    Hosted { profile: String },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "local database {}", path.display()),
            Self::Hosted { profile } => write!(f, "hosted backend (profile '{profile}')"),
        }
    }
}

/// A connected backend plus the optional media host.
pub struct AppContext {
    pub backend: Arc<dyn Backend>,
    pub media: Option<Arc<dyn MediaUploader>>,
    pub mode: Mode,
}

/// Connect to the backend the global flags, environment and profile select.
///
/// `--db-path` forces local mode; otherwise the hosted backend is used when
/// it is configured and the local database is the fallback.
pub async fn connect(target: &Target) -> Result<AppContext, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(target.profile.as_deref());
    let config = resolve_client_config(&profiles, &profile_name);

    let media = match config.media()? {
        Some(endpoint) => {
            let uploader = CloudinaryUploader::new(
                &endpoint.api_url,
                &endpoint.cloud_name,
                &endpoint.upload_preset,
            )?;
            Some(Arc::new(uploader) as Arc<dyn MediaUploader>)
        }
        None => None,
    };

    let hosted = if target.db_path.is_some() {
        None
    } else {
        config.supabase()?
    };

    let Some(endpoint) = hosted else {
        let path = resolve_db_path(target.db_path.clone())?;
        let store = LocalBackend::open_path(&path).await?;
        let user = resolve_local_user(target.as_user.as_deref())?;
        let store = local_viewer(store, user, target.name.as_deref()).await?;
        return Ok(AppContext {
            backend: Arc::new(store),
            media,
            mode: Mode::Local(path),
        });
    };

    if target.as_user.is_some() {
        tracing::warn!("--as only applies in local mode; using the signed-in session");
    }
    let auth = SupabaseAuthService::new(&profile_name, &endpoint)
        .map_err(|error| CliError::Auth(error.to_string()))?;
    let session = auth
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?;
    tracing::debug!(profile = %profile_name, signed_in = session.is_some(), "Using hosted backend");

    Ok(AppContext {
        backend: Arc::new(SupabaseBackend::new(&endpoint, session)?),
        media,
        mode: Mode::Hosted {
            profile: profile_name,
        },
    })
}

/// Environment values win over the stored profile.
pub fn resolve_client_config(profiles: &CliProfilesConfig, profile_name: &str) -> ClientConfig {
    let stored = profiles
        .profile(profile_name)
        .map(|profile| profile.client_config())
        .unwrap_or_default();
    ClientConfig::from_env().or(stored)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("bazar").join("bazar.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Act as `user`, first recording `name` as that user's display name.
pub async fn local_viewer(
    store: LocalBackend,
    user: Option<UserId>,
    name: Option<&str>,
) -> Result<LocalBackend, CliError> {
    let Some(user) = user else {
        return Ok(store);
    };
    if let Some(full_name) = name.map(str::trim).filter(|name| !name.is_empty()) {
        store
            .upsert_profile(&Profile {
                id: user,
                full_name: Some(full_name.to_string()),
            })
            .await?;
    }
    Ok(store.as_viewer(user))
}

fn resolve_local_user(explicit: Option<&str>) -> Result<Option<UserId>, CliError> {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| env::var(ENV_USER).ok())
        .filter(|value| !value.trim().is_empty());
    raw.map(|value| parse_id("user", &value)).transpose()
}

pub fn parse_id<T: FromStr>(kind: &'static str, raw: &str) -> Result<T, CliError> {
    raw.trim().parse().map_err(|_| CliError::InvalidId {
        kind,
        value: raw.trim().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListingListItem {
    pub id: String,
    pub title: String,
    pub price: String,
    pub category_id: i64,
    pub address: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
    pub relative_time: String,
}

pub fn listing_to_list_item(listing: &Listing, now: DateTime<Utc>) -> ListingListItem {
    ListingListItem {
        id: listing.id.to_string(),
        title: listing.title.clone(),
        price: listing.price.to_string(),
        category_id: listing.category_id.0,
        address: listing.address.clone(),
        image: listing.cover_image().map(str::to_string),
        created_at: listing.created_at.to_rfc3339(),
        relative_time: format_relative_time(listing.created_at, now),
    }
}

pub fn format_listing_lines(listings: &[Listing], now: DateTime<Utc>) -> Vec<String> {
    listings
        .iter()
        .map(|listing| {
            let id = listing.id.to_string();
            let title = preview(&listing.title, 36);
            let price = listing.price.to_string();
            let relative_time = format_relative_time(listing.created_at, now);
            format!("{id}  {title:<36}  {price:>10}  {relative_time}")
        })
        .collect()
}

pub fn format_inbox_lines(entries: &[InboxEntry], now: DateTime<Utc>) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let title = preview(entry.listing_title.as_deref().unwrap_or("(listing removed)"), 30);
            format!(
                "{}  {title:<30}  {:<20}  {}  ({})",
                entry.conversation_id,
                preview(&entry.counterpart_name, 20),
                entry.role.label(),
                format_relative_time(entry.updated_at, now)
            )
        })
        .collect()
}

/// One chat line: local time, sender, text, and a marker while unconfirmed.
pub fn format_feed_entry(entry: &FeedEntry, viewer: UserId) -> String {
    let time = entry
        .created_at()
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let who = if entry.sender_id() == viewer {
        "You"
    } else {
        "Them"
    };
    if entry.is_pending() {
        format!("[{time}] {who}: {} (sending...)", entry.content())
    } else {
        format!("[{time}] {who}: {}", entry.content())
    }
}

/// First line with whitespace collapsed, cut to `max_chars`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
