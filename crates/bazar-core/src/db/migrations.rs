//! Versioned schema for the local marketplace database.

use libsql::Connection;

use crate::error::Result;

struct Migration {
    version: i64,
    summary: &'static str,
    statements: &'static [&'static str],
}

/// Applied in order; each one runs in its own transaction.
///
/// Timestamps are microseconds since the Unix epoch. The conversation triple
/// is unique so that contact requests can upsert instead of read-then-write.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        summary: "marketplace tables",
        statements: &[
            "CREATE TABLE profiles (
                id TEXT PRIMARY KEY,
                full_name TEXT
            )",
            "CREATE TABLE categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )",
            "CREATE TABLE listings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                category_id INTEGER NOT NULL REFERENCES categories(id),
                images TEXT NOT NULL DEFAULT '[]',
                address_text TEXT,
                location TEXT,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX listings_by_age ON listings(created_at DESC)",
            "CREATE TABLE conversations (
                id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL REFERENCES listings(id),
                buyer_id TEXT NOT NULL,
                seller_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (listing_id, buyer_id, seller_id),
                CHECK (buyer_id <> seller_id)
            )",
            "CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX messages_by_thread ON messages(conversation_id, created_at)",
            "INSERT INTO categories (id, name) VALUES
                (1, 'Technology'), (2, 'Cars'), (3, 'Real Estate')",
        ],
    },
    Migration {
        version: 2,
        summary: "inbox lookups by participant",
        statements: &[
            "CREATE INDEX conversations_by_buyer ON conversations(buyer_id, updated_at DESC)",
            "CREATE INDEX conversations_by_seller ON conversations(seller_id, updated_at DESC)",
        ],
    },
];

/// Bring the schema up to the newest version.
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let applied = schema_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let tx = conn.transaction().await?;
        for statement in migration.statements {
            tx.execute(statement, ()).await?;
        }
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .await?;
        tx.commit().await?;
        tracing::info!(
            version = migration.version,
            summary = migration.summary,
            "applied schema migration"
        );
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}
