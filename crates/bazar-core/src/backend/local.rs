//! libSQL-backed backend for local mode and tests.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use libsql::{params, params_from_iter, Row, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};

use super::{Backend, ListingQuery};
use crate::db::Database;
use crate::models::{
    Category, CategoryId, Conversation, ConversationId, ConversationKey, ConversationOverview,
    GeoPoint, Listing, ListingDetail, ListingId, ListingSnippet, Message, MessageId, NameSnippet,
    NewListing, NewMessage, Price, Profile, UserId,
};
use crate::realtime::{ChannelEvent, ChannelStatus, Subscription};
use crate::{Error, Result};

const BROADCAST_CAPACITY: usize = 512;

const LISTING_COLUMNS: &str = "l.id, l.user_id, l.title, l.description, l.price_cents, \
     l.category_id, l.images, l.address_text, l.location, l.created_at";

/// Embedded store with the same contract as the hosted backend.
///
/// Clones share the database and the change feed; each clone may act as a
/// different viewer (see [`LocalBackend::as_viewer`]).
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    viewer: Option<UserId>,
    inserted: broadcast::Sender<Message>,
}

impl LocalBackend {
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path).await?;
        tracing::info!("Running in local mode: {}", db_path.display());
        Ok(Self::from_database(db, Some(db_path)))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory().await?, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let (inserted, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            viewer: None,
            inserted,
        }
    }

    /// A handle on the same store acting as `viewer`.
    #[must_use]
    pub fn as_viewer(&self, viewer: UserId) -> Self {
        Self {
            viewer: Some(viewer),
            ..self.clone()
        }
    }

    /// A handle on the same store with nobody signed in.
    #[must_use]
    pub fn signed_out(&self) -> Self {
        Self {
            viewer: None,
            ..self.clone()
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of live message subscriptions.
    pub fn live_subscriptions(&self) -> usize {
        self.inserted.receiver_count()
    }

    /// Create or rename a profile so it shows up with a display name.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO profiles (id, full_name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name",
                params_from_iter([
                    Value::Text(profile.id.to_string()),
                    optional_text(profile.full_name.clone()),
                ]),
            )
            .await?;
        Ok(())
    }

    /// Number of conversations stored; used to check upsert behaviour.
    pub async fn conversation_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM conversations", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn current_user(&self) -> Result<Option<UserId>> {
        Ok(self.viewer)
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let mut sql = format!("SELECT {LISTING_COLUMNS} FROM listings l");
        let mut values = Vec::new();
        if let Some(text) = &query.title_contains {
            sql.push_str(" WHERE instr(lower(l.title), lower(?1)) > 0");
            values.push(Value::Text(text.clone()));
        }
        sql.push_str(" ORDER BY l.created_at DESC, l.rowid DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let db = self.db.lock().await;
        let mut rows = db.connection().query(&sql, params_from_iter(values)).await?;
        let mut listings = Vec::new();
        while let Some(row) = rows.next().await? {
            listings.push(listing_from_row(&row)?);
        }
        Ok(listings)
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<ListingDetail>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS}, c.name, p.full_name, p.id
             FROM listings l
             LEFT JOIN categories c ON c.id = l.category_id
             LEFT JOIN profiles p ON p.id = l.user_id
             WHERE l.id = ?1"
        );
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(&sql, params![id.to_string()])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let listing = listing_from_row(&row)?;
        let category = optional_column(&row, 10)?.map(|name| Category {
            id: listing.category_id,
            name,
        });
        // p.id is NULL when the seller never created a profile
        let seller = match optional_column(&row, 12)? {
            Some(_) => Some(Profile {
                id: listing.owner_id,
                full_name: optional_column(&row, 11)?,
            }),
            None => None,
        };

        Ok(Some(ListingDetail {
            listing,
            category,
            seller,
        }))
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing> {
        let stored = Listing {
            id: ListingId::new(),
            owner_id: listing.owner_id,
            title: listing.title.clone(),
            description: listing.description.clone(),
            price: listing.price,
            category_id: listing.category_id,
            images: listing.images.clone(),
            address: listing.address.clone(),
            location: Some(listing.location),
            created_at: stored_now(),
        };

        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO listings (id, user_id, title, description, price_cents,
                     category_id, images, address_text, location, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params_from_iter([
                    Value::Text(stored.id.to_string()),
                    Value::Text(stored.owner_id.to_string()),
                    Value::Text(stored.title.clone()),
                    Value::Text(stored.description.clone()),
                    Value::Integer(stored.price.cents()),
                    Value::Integer(stored.category_id.0),
                    Value::Text(serde_json::to_string(&stored.images)?),
                    optional_text(stored.address.clone()),
                    Value::Text(listing.location.to_ewkb_hex()),
                    Value::Integer(stored.created_at.timestamp_micros()),
                ]),
            )
            .await?;

        tracing::debug!(listing = %stored.id, "Inserted listing");
        Ok(stored)
    }

    async fn upsert_conversation(
        &self,
        key: ConversationKey,
        touched_at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "INSERT INTO conversations (id, listing_id, buyer_id, seller_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(listing_id, buyer_id, seller_id)
                 DO UPDATE SET updated_at = excluded.updated_at
                 RETURNING id, listing_id, buyer_id, seller_id, updated_at",
                params![
                    ConversationId::new().to_string(),
                    key.listing_id.to_string(),
                    key.buyer_id.to_string(),
                    key.seller_id.to_string(),
                    touched_at.timestamp_micros(),
                ],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::backend("conversation upsert returned no row"))?;
        conversation_from_row(&row)
    }

    async fn list_conversations_for(&self, user: UserId) -> Result<Vec<ConversationOverview>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT c.id, c.listing_id, c.buyer_id, c.seller_id, c.updated_at,
                        l.title, l.images, pb.full_name, ps.full_name
                 FROM conversations c
                 LEFT JOIN listings l ON l.id = c.listing_id
                 LEFT JOIN profiles pb ON pb.id = c.buyer_id
                 LEFT JOIN profiles ps ON ps.id = c.seller_id
                 WHERE c.buyer_id = ?1 OR c.seller_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
                params![user.to_string()],
            )
            .await?;

        let mut overviews = Vec::new();
        while let Some(row) = rows.next().await? {
            let listing = match optional_column(&row, 5)? {
                Some(title) => Some(ListingSnippet {
                    title,
                    images: parse_images(optional_column(&row, 6)?)?,
                }),
                None => None,
            };
            overviews.push(ConversationOverview {
                conversation: conversation_from_row(&row)?,
                listing,
                buyer: Some(NameSnippet {
                    full_name: optional_column(&row, 7)?,
                }),
                seller: Some(NameSnippet {
                    full_name: optional_column(&row, 8)?,
                }),
            });
        }
        Ok(overviews)
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                params![conversation.to_string()],
            )
            .await?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(message_from_row(&row)?);
        }
        Ok(messages)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let stored = Message {
            id: MessageId::new(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            created_at: stored_now(),
        };

        {
            let db = self.db.lock().await;
            let inserted = db
                .connection()
                .execute(
                    "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                     SELECT ?1, c.id, ?3, ?4, ?5 FROM conversations c
                     WHERE c.id = ?2 AND (c.buyer_id = ?3 OR c.seller_id = ?3)",
                    params![
                        stored.id.to_string(),
                        stored.conversation_id.to_string(),
                        stored.sender_id.to_string(),
                        stored.content.clone(),
                        stored.created_at.timestamp_micros(),
                    ],
                )
                .await?;
            if inserted == 0 {
                return Err(Error::backend(
                    "sender is not a participant of this conversation",
                ));
            }
        }

        // No receivers is fine
        let _ = self.inserted.send(stored.clone());
        Ok(stored)
    }

    async fn subscribe_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Subscription<Message>> {
        let mut inserted = self.inserted.subscribe();
        let (subscription, mut sink) = Subscription::channel();

        tokio::spawn(async move {
            if !sink.status(ChannelStatus::Connecting).await
                || !sink.status(ChannelStatus::Subscribed).await
            {
                return;
            }
            loop {
                tokio::select! {
                    () = sink.released() => break,
                    received = inserted.recv() => match received {
                        Ok(message) if message.conversation_id == conversation => {
                            if !sink.send(ChannelEvent::Insert(message)).await {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(%conversation, skipped, "Local message feed lagged");
                        }
                        Err(RecvError::Closed) => {
                            sink.status(ChannelStatus::Closed).await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(subscription)
    }
}

/// Current time at the precision the store keeps.
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn optional_column(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::backend(format!(
            "unexpected value in column {index}: {other:?}"
        ))),
    }
}

fn parse_column<T: FromStr>(row: &Row, index: i32) -> Result<T> {
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|_| Error::backend(format!("corrupt value in column {index}: {raw}")))
}

fn timestamp_column(row: &Row, index: i32) -> Result<DateTime<Utc>> {
    let micros: i64 = row.get(index)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::backend(format!("timestamp out of range: {micros}")))
}

fn parse_images(raw: Option<String>) -> Result<Vec<String>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(Vec::new()),
    }
}

fn listing_from_row(row: &Row) -> Result<Listing> {
    let cents: i64 = row.get(4)?;
    Ok(Listing {
        id: parse_column(row, 0)?,
        owner_id: parse_column(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        price: Price::from_cents(cents)
            .ok_or_else(|| Error::backend(format!("negative price: {cents}")))?,
        category_id: CategoryId(row.get(5)?),
        images: parse_images(optional_column(row, 6)?)?,
        address: optional_column(row, 7)?,
        location: optional_column(row, 8)?
            .and_then(|hex| GeoPoint::from_ewkb_hex(&hex).ok()),
        created_at: timestamp_column(row, 9)?,
    })
}

fn conversation_from_row(row: &Row) -> Result<Conversation> {
    Ok(Conversation {
        id: parse_column(row, 0)?,
        listing_id: parse_column(row, 1)?,
        buyer_id: parse_column(row, 2)?,
        seller_id: parse_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn message_from_row(row: &Row) -> Result<Message> {
    Ok(Message {
        id: parse_column(row, 0)?,
        conversation_id: parse_column(row, 1)?,
        sender_id: parse_column(row, 2)?,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}
