//! Storage abstraction over named vector collections.
//!
//! The [`Store`] trait is the persistent-store boundary the retrieval core
//! consumes: named collections, upsert-by-id, and metadata-filtered
//! nearest-neighbour search ordered by ascending cosine distance.
//! Backends are pluggable (SQLite in the app crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Collection holding one entry per course, keyed by title.
pub const COURSE_CATALOG: &str = "course_catalog";
/// Collection holding one entry per chunk.
pub const COURSE_CONTENT: &str = "course_content";

/// One stored item in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within its collection; upserts replace on conflict.
    pub id: String,
    /// The text the embedding was computed from.
    pub document: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

/// A record returned by [`Store::query`] with its distance to the query.
#[derive(Debug, Clone)]
pub struct Hit {
    pub record: Record,
    /// Cosine distance `1 - cos`; smaller is closer.
    pub distance: f32,
}

/// Metadata filter evaluated against a record's JSON metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `metadata[field] == value`.
    Eq { field: String, value: Value },
    /// Every inner filter must match.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq { field, value } => metadata.get(field) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// Abstract collection store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Insert or replace records by id |
/// | [`get`](Store::get) | Fetch records by id, or all records |
/// | [`query`](Store::query) | Nearest neighbours with optional filter |
/// | [`count`](Store::count) | Number of records in a collection |
/// | [`clear`](Store::clear) | Drop every record in a collection |
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()>;

    /// `ids = None` returns the whole collection. Missing ids are skipped.
    async fn get(&self, collection: &str, ids: Option<&[String]>) -> Result<Vec<Record>>;

    /// Up to `limit` records ordered by ascending distance to `embedding`.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Hit>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    async fn clear(&self, collection: &str) -> Result<()>;
}

/// Fail when a stored vector cannot be compared with the query vector.
///
/// Collections embedded by one model and queried with another would
/// otherwise score every record at distance `1.0`.
pub fn ensure_same_dims(query: &[f32], record_id: &str, stored_dims: usize) -> Result<()> {
    if query.len() != stored_dims {
        anyhow::bail!(
            "embedding dimension mismatch: query has {} dims, record '{}' has {}; \
             re-ingest after changing the embedding model",
            query.len(),
            record_id,
            stored_dims
        );
    }
    Ok(())
}

/// Sort hits by ascending distance, ties broken by id for stable output.
pub fn sort_hits(hits: &mut Vec<Hit>, limit: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(limit);
}
