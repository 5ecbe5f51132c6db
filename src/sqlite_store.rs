//! SQLite-backed [`Store`] implementation.
//!
//! All collections share the `records` table created by
//! [`migrate`](crate::migrate). Nearest-neighbour queries load the
//! collection's rows, apply the metadata [`Filter`] in Rust, and rank by
//! brute-force cosine distance, which is adequate for course-sized corpora.
//! A row whose stored `dims` differs from the query vector fails the query.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use course_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use course_rag_core::store::{ensure_same_dims, sort_hits, Filter, Hit, Record, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let blob: Vec<u8> = row.get("embedding");

    let metadata: Map<String, Value> = serde_json::from_str(&metadata_json)
        .with_context(|| format!("Corrupt metadata for record '{}'", id))?;

    Ok(Record {
        id,
        document: row.get("document"),
        metadata,
        embedding: blob_to_vec(&blob),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for r in records {
            let metadata_json = serde_json::to_string(&r.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata_json, embedding, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&r.id)
            .bind(&r.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&r.embedding))
            .bind(r.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, ids: Option<&[String]>) -> Result<Vec<Record>> {
        match ids {
            Some(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    let row = sqlx::query(
                        "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? AND id = ?",
                    )
                    .bind(collection)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                    if let Some(row) = row {
                        out.push(row_to_record(&row)?);
                    }
                }
                Ok(out)
            }
            None => {
                let rows = sqlx::query(
                    "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? ORDER BY id ASC",
                )
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;
                rows.iter().map(row_to_record).collect()
            }
        }
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Hit>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding, dims FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in &rows {
            let record = row_to_record(row)?;
            if !filter.map_or(true, |f| f.matches(&record.metadata)) {
                continue;
            }
            let dims: i64 = row.get("dims");
            ensure_same_dims(embedding, &record.id, dims as usize)?;
            hits.push(Hit {
                distance: cosine_distance(embedding, &record.embedding),
                record,
            });
        }

        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
