use std::path::Path;

use libsql::{Builder, Connection};

use super::migrations;
use crate::error::{Error, Result};

/// One migrated libSQL connection plus the database handle that owns it.
pub struct Database {
    conn: Connection,
    _handle: libsql::Database,
}

impl Database {
    /// Open or create the file at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = path
            .to_str()
            .ok_or_else(|| Error::validation(format!("{} is not valid UTF-8", path.display())))?;
        Self::prepare(Builder::new_local(location).build().await?).await
    }

    /// Private, throwaway store.
    pub async fn open_in_memory() -> Result<Self> {
        Self::prepare(Builder::new_local(":memory:").build().await?).await
    }

    async fn prepare(handle: libsql::Database) -> Result<Self> {
        let conn = handle.connect()?;
        // WAL is best effort: in-memory stores refuse it and the pragma yields a row.
        if let Err(error) = conn.query("PRAGMA journal_mode = WAL", ()).await {
            tracing::debug!(%error, "journal_mode unchanged");
        }
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        migrations::run(&conn).await?;
        Ok(Self {
            conn,
            _handle: handle,
        })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use libsql::Value;

    async fn scalar(db: &Database, sql: &str) -> Value {
        let mut rows = db.connection().query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get_value(0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_file_is_seeded_with_categories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.db");
        let db = Database::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(scalar(&db, "SELECT COUNT(*) FROM categories").await, Value::Integer(3));
        assert_eq!(scalar(&db, "PRAGMA foreign_keys").await, Value::Integer(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.db");
        Database::open(&path)
            .await
            .unwrap()
            .connection()
            .execute("INSERT INTO profiles (id, full_name) VALUES ('sofia', 'Sofia')", ())
            .await
            .unwrap();

        let reopened = Database::open(&path).await.unwrap();
        let name = scalar(&reopened, "SELECT full_name FROM profiles WHERE id = 'sofia'").await;
        assert_eq!(name, Value::Text("Sofia".to_string()));
    }
}
