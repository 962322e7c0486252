//! Document store implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};

use consilium_core::{Document, DocumentStore, Error, NewDocument, Result};

/// PostgreSQL implementation of [`DocumentStore`].
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    /// Create a new PgDocumentStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a document row into a Document struct.
    fn parse_document_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            doc_id: row.get("doc_id"),
            matter_id: row.get("matter_id"),
            class_name: row.get("class_name"),
            title: row.get("title"),
            storage_ref: row.get("storage_ref"),
            sha256: row.get("sha256"),
            status: row.get("status"),
            tags: row.get("tags"),
            origin_meta: row.get("origin_meta"),
            origin: row.get("origin"),
            owner: row.get("owner"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

const DOCUMENT_COLUMNS: &str = "doc_id, matter_id, class_name, title, storage_ref, sha256, \
                                status, tags, origin_meta, origin, owner, created_at, updated_at";

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, doc: NewDocument) -> Result<Document> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO documents
                 (doc_id, matter_id, class_name, title, storage_ref, sha256,
                  status, tags, origin_meta, origin, owner, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(&doc.doc_id)
        .bind(&doc.matter_id)
        .bind(&doc.class_name)
        .bind(&doc.title)
        .bind(&doc.storage_ref)
        .bind(&doc.sha256)
        .bind(&doc.status)
        .bind(&doc.tags)
        .bind(&doc.origin_meta)
        .bind(&doc.origin)
        .bind(&doc.owner)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_document_row(row))
    }

    async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_id = $1"
        ))
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_document_row))
    }

    async fn update_sha(&self, doc_id: &str, sha256: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET sha256 = $1, updated_at = $2 WHERE doc_id = $3",
        )
        .bind(sha256)
        .bind(Utc::now())
        .bind(doc_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }
        Ok(())
    }

    async fn set_status(&self, doc_id: &str, status: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = $1, updated_at = $2 WHERE doc_id = $3",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(doc_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }
        Ok(())
    }

    async fn set_tags(&self, doc_id: &str, tags: &[String]) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET tags = $1, updated_at = $2 WHERE doc_id = $3",
        )
        .bind(tags)
        .bind(Utc::now())
        .bind(doc_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }
        Ok(())
    }

    async fn merge_origin_meta(&self, doc_id: &str, patch: JsonValue) -> Result<()> {
        // JSONB || is a shallow merge; top-level keys in the patch win,
        // everything else in origin_meta survives.
        let result = sqlx::query(
            "UPDATE documents
             SET origin_meta = origin_meta || $1, updated_at = $2
             WHERE doc_id = $3",
        )
        .bind(&patch)
        .bind(Utc::now())
        .bind(doc_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }
        Ok(())
    }

    async fn list_for_integrity(&self, statuses: &[String], limit: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE status = ANY($1)
             ORDER BY updated_at ASC
             LIMIT $2"
        ))
        .bind(statuses)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_document_row).collect())
    }
}
