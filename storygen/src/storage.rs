use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::debug;

/// Handle to a document that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

/// Writes staged for one atomic commit.
#[derive(Debug, Default)]
pub struct WriteBatch {
    writes: Vec<(DocumentRef, Map<String, Value>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value`'s fields as the full content of `doc`. The value must serialize to an object.
    pub fn set<T: Serialize>(&mut self, doc: &DocumentRef, value: &T) -> Result<()> {
        let fields = match serde_json::to_value(value).context("failed to serialize document")? {
            Value::Object(fields) => fields,
            other => {
                return Err(anyhow!(
                    "document {}/{} must be an object, got {}",
                    doc.collection,
                    doc.id,
                    other
                ))
            }
        };
        self.writes.push((doc.clone(), fields));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[(DocumentRef, Map<String, Value>)] {
        &self.writes
    }
}

/// Document database accepting atomic batched writes.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// New reference in `collection` with a store-generated id.
    fn doc(&self, collection: &str) -> DocumentRef {
        DocumentRef {
            collection: collection.to_string(),
            id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Apply every staged write, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// `DocumentStore` over the `documents` table created by `common::ensure_schema`.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin batch transaction")?;

        for (doc, fields) in batch.writes {
            let fields_json = serde_json::to_string(&fields).context("failed to encode document fields")?;
            // A set replaces the whole document.
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO documents (id, collection, fields_json, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.collection)
            .bind(&fields_json)
            .bind(Utc::now())
            .execute(&mut tx)
            .await
            .with_context(|| format!("failed to write document {}/{}", doc.collection, doc.id))?;
            debug!(collection = %doc.collection, id = %doc.id, "staged document written");
        }

        // Dropping `tx` on an early return above rolls the whole batch back.
        tx.commit().await.context("failed to commit batch transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    async fn setup_store() -> SqliteDocumentStore {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        common::ensure_schema(&pool).await.expect("ensure schema");
        SqliteDocumentStore::new(pool)
    }

    #[derive(Serialize)]
    struct Note {
        text: &'static str,
        rank: i64,
    }

    #[tokio::test]
    async fn commit_writes_all_staged_documents() {
        let store = setup_store().await;
        let mut batch = WriteBatch::new();
        let first = store.doc("notes");
        let second = store.doc("notes");
        assert_ne!(first.id, second.id);

        batch.set(&first, &Note { text: "a", rank: 1 }).unwrap();
        batch.set(&second, &Note { text: "b", rank: 2 }).unwrap();
        assert_eq!(batch.len(), 2);
        store.commit(batch).await.expect("commit");

        let rows = sqlx::query("SELECT id, collection, fields_json FROM documents ORDER BY json_extract(fields_json, '$.rank')")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String, _>("id"), first.id);
        assert_eq!(rows[0].get::<String, _>("collection"), "notes");
        let fields: Value = serde_json::from_str(&rows[1].get::<String, _>("fields_json")).unwrap();
        assert_eq!(fields, serde_json::json!({ "text": "b", "rank": 2 }));
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_documents() {
        let store = setup_store().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_poison BEFORE INSERT ON documents
            WHEN json_extract(NEW.fields_json, '$.text') = 'poison'
            BEGIN SELECT RAISE(ABORT, 'poisoned document'); END;
            "#,
        )
        .execute(store.pool())
        .await
        .unwrap();

        let mut batch = WriteBatch::new();
        batch.set(&store.doc("notes"), &Note { text: "fine", rank: 1 }).unwrap();
        batch.set(&store.doc("notes"), &Note { text: "poison", rank: 2 }).unwrap();

        let err = store.commit(batch).await.unwrap_err();
        assert!(format!("{:#}", err).contains("poisoned document"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn set_rejects_non_object_values() {
        let doc = DocumentRef {
            collection: "notes".into(),
            id: "fixed".into(),
        };
        let mut batch = WriteBatch::new();
        assert!(batch.set(&doc, &42).is_err());
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_commits() {
        let store = setup_store().await;
        store.commit(WriteBatch::new()).await.expect("commit empty batch");
    }
}
