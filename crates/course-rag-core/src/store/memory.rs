//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Collections are `BTreeMap`s keyed by record id behind a
//! `std::sync::RwLock`. Queries are brute-force cosine distance over the
//! filtered records.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;

use super::{ensure_same_dims, sort_hits, Filter, Hit, Record, Store};

type Collections = HashMap<String, BTreeMap<String, Record>>;

pub struct InMemoryStore {
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        let mut guard = self.write()?;
        let coll = guard.entry(collection.to_string()).or_default();
        for r in records {
            coll.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn get(&self, collection: &str, ids: Option<&[String]>) -> Result<Vec<Record>> {
        let guard = self.read()?;
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(match ids {
            Some(ids) => ids.iter().filter_map(|id| coll.get(id).cloned()).collect(),
            None => coll.values().cloned().collect(),
        })
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Hit>> {
        let guard = self.read()?;
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits = Vec::new();
        for r in coll.values() {
            if !filter.map_or(true, |f| f.matches(&r.metadata)) {
                continue;
            }
            ensure_same_dims(embedding, &r.id, r.embedding.len())?;
            hits.push(Hit {
                distance: cosine_distance(embedding, &r.embedding),
                record: r.clone(),
            });
        }
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.read()?.get(collection).map_or(0, |c| c.len()))
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.write()?.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn record(id: &str, lesson: u32, embedding: Vec<f32>) -> Record {
        let mut metadata = Map::new();
        metadata.insert("course_title".into(), Value::from("A"));
        metadata.insert("lesson_number".into(), json!(lesson));
        Record {
            id: id.to_string(),
            document: format!("doc {}", id),
            metadata,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryStore::new();
        store
            .upsert("c", &[record("x", 1, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("c", &[record("x", 2, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        let ids = vec!["x".to_string()];
        let got = store.get("c", Some(ids.as_slice())).await.unwrap();
        assert_eq!(got[0].metadata["lesson_number"], json!(2));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "c",
                &[
                    record("far", 1, vec![0.0, 1.0]),
                    record("near", 1, vec![1.0, 0.1]),
                    record("mid", 1, vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        let hits = store.query("c", &[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_applies_filter_and_limit() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "c",
                &[
                    record("a", 1, vec![1.0, 0.0]),
                    record("b", 2, vec![1.0, 0.0]),
                    record("d", 2, vec![0.9, 0.1]),
                ],
            )
            .await
            .unwrap();
        let f = Filter::eq("lesson_number", 2);
        let hits = store.query("c", &[1.0, 0.0], 1, Some(&f)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "b");
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = InMemoryStore::new();
        assert_eq!(store.count("nope").await.unwrap(), 0);
        assert!(store.get("nope", None).await.unwrap().is_empty());
        assert!(store.query("nope", &[1.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_mismatched_dims() {
        let store = InMemoryStore::new();
        store
            .upsert("c", &[record("a", 1, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let err = store.query("c", &[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryStore::new();
        store
            .upsert("c", &[record("a", 1, vec![1.0])])
            .await
            .unwrap();
        store.clear("c").await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 0);
    }
}
