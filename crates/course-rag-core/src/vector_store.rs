//! Dual-collection course store.
//!
//! [`VectorStore`] sits on top of any [`Store`] backend and an
//! [`Embedder`], and owns the two collections the retrieval pipeline uses:
//!
//! - [`COURSE_CATALOG`]: one record per course, embedded from the title,
//!   used only for fuzzy course-name resolution.
//! - [`COURSE_CONTENT`]: one record per [`CourseChunk`], embedded from the
//!   chunk text, used for content search.
//!
//! Course resolution always returns the single nearest catalog entry;
//! there is no similarity floor, so an unrelated name still resolves to
//! some course as long as the catalog is non-empty.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use crate::embedding::{embed_one, Embedder};
use crate::error::RagError;
use crate::models::{Course, CourseChunk};
use crate::store::{Filter, Hit, Record, Store, COURSE_CATALOG, COURSE_CONTENT};

/// One retrieved chunk and its distance to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: CourseChunk,
    pub distance: f32,
}

/// Outcome of [`VectorStore::search`].
///
/// An empty `hits` with `error == None` means the filters matched nothing,
/// which is not a failure.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub error: Option<RagError>,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_error(error: RagError) -> Self {
        Self {
            hits: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

pub struct VectorStore {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
    batch_size: usize,
}

impl VectorStore {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        Self {
            store,
            embedder,
            max_results: max_results.max(1),
            batch_size: 64,
        }
    }

    /// Number of chunk texts sent to the embedder per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Add a course to the catalog. Returns `false` (and writes nothing)
    /// when a course with the same title already exists.
    ///
    /// The existence check and the write are not atomic; concurrent
    /// ingesters of the same title may both write, and the second upsert
    /// simply replaces the first.
    pub async fn add_course_metadata(&self, course: &Course) -> Result<bool> {
        if self.has_course(&course.title).await? {
            tracing::debug!(title = %course.title, "course already in catalog");
            return Ok(false);
        }
        self.write_catalog_entry(course).await?;
        Ok(true)
    }

    /// Store a course and its chunks, content first. Returns `None` when
    /// the title already exists.
    ///
    /// The catalog entry is what marks a course as present, so it is only
    /// written once every chunk is stored. A failure part way leaves no
    /// catalog entry and the next ingest retries the whole course; chunk
    /// ids are stable, so the retry overwrites any partial content.
    pub async fn add_course(&self, course: &Course, chunks: &[CourseChunk]) -> Result<Option<usize>> {
        if self.has_course(&course.title).await? {
            tracing::debug!(title = %course.title, "course already in catalog");
            return Ok(None);
        }
        let added = self.add_course_content(chunks).await?;
        self.write_catalog_entry(course).await?;
        Ok(Some(added))
    }

    async fn has_course(&self, title: &str) -> Result<bool> {
        let existing = self
            .store
            .get(COURSE_CATALOG, Some(std::slice::from_ref(&title.to_string())))
            .await?;
        Ok(!existing.is_empty())
    }

    async fn write_catalog_entry(&self, course: &Course) -> Result<()> {
        let embedding = self.embed_query(&course.title).await?;
        let record = Record {
            id: course.title.clone(),
            document: course.title.clone(),
            metadata: catalog_metadata(course),
            embedding,
        };
        self.store.upsert(COURSE_CATALOG, &[record]).await
    }

    /// Embed and store chunks. Ids are `"<title>_<chunk_index>"`, so adding
    /// the same chunks again overwrites instead of duplicating.
    pub async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<usize> {
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }
            for v in &vectors {
                self.check_dims(v)?;
            }

            let records: Vec<Record> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| Record {
                    id: format!("{}_{}", chunk.course_title, chunk.chunk_index),
                    document: chunk.content.clone(),
                    metadata: content_metadata(chunk),
                    embedding,
                })
                .collect();
            self.store.upsert(COURSE_CONTENT, &records).await?;
        }
        Ok(chunks.len())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let v = embed_one(self.embedder.as_ref(), text).await?;
        self.check_dims(&v)?;
        Ok(v)
    }

    /// Every vector must have the embedder's declared dimensionality.
    fn check_dims(&self, v: &[f32]) -> Result<()> {
        let expected = self.embedder.dims();
        if v.len() != expected {
            bail!(
                "embedder '{}' returned a {}-dimensional vector, expected {}",
                self.embedder.model_name(),
                v.len(),
                expected
            );
        }
        Ok(())
    }

    /// Map a partial or approximate course name to its canonical title.
    ///
    /// Returns `None` only when the catalog is empty.
    pub async fn resolve_course_name(&self, name: &str) -> Result<Option<String>> {
        let embedding = self.embed_query(name).await?;
        let hits = self
            .store
            .query(COURSE_CATALOG, &embedding, 1, None)
            .await?;
        let resolved = hits.into_iter().next().map(|h| catalog_title(&h.record));
        tracing::debug!(query = name, resolved = ?resolved, "course name resolution");
        Ok(resolved)
    }

    /// Combine an exact course title and lesson number into one filter.
    pub fn build_filter(course_title: Option<&str>, lesson_number: Option<u32>) -> Option<Filter> {
        match (course_title, lesson_number) {
            (None, None) => None,
            (Some(t), None) => Some(Filter::eq("course_title", t)),
            (None, Some(n)) => Some(Filter::eq("lesson_number", n)),
            (Some(t), Some(n)) => Some(Filter::And(vec![
                Filter::eq("course_title", t),
                Filter::eq("lesson_number", n),
            ])),
        }
    }

    /// Semantic search over course content.
    ///
    /// `course_name` is resolved fuzzily first; failure to resolve yields a
    /// [`RagError::Resolution`] result. Backend failures yield
    /// [`RagError::Store`]. `limit` defaults to the configured maximum.
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<usize>,
    ) -> SearchResults {
        let course_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await {
                Ok(Some(title)) => Some(title),
                Ok(None) => return SearchResults::from_error(RagError::Resolution(name.into())),
                Err(e) => return SearchResults::from_error(RagError::store(e)),
            },
            None => None,
        };

        let filter = Self::build_filter(course_title.as_deref(), lesson_number);
        let limit = limit.unwrap_or(self.max_results);

        let embedding = match self.embed_query(query).await {
            Ok(v) => v,
            Err(e) => return SearchResults::from_error(RagError::store(e)),
        };

        match self
            .store
            .query(COURSE_CONTENT, &embedding, limit, filter.as_ref())
            .await
        {
            Ok(hits) => SearchResults {
                hits: hits.into_iter().map(decode_hit).collect(),
                error: None,
            },
            Err(e) => SearchResults::from_error(RagError::store(e)),
        }
    }

    pub async fn existing_course_titles(&self) -> Result<Vec<String>> {
        let records = self.store.get(COURSE_CATALOG, None).await?;
        Ok(records.iter().map(catalog_title).collect())
    }

    pub async fn course_count(&self) -> Result<usize> {
        self.store.count(COURSE_CATALOG).await
    }

    pub async fn all_courses_metadata(&self) -> Result<Vec<Course>> {
        let records = self.store.get(COURSE_CATALOG, None).await?;
        records.iter().map(decode_course).collect()
    }

    /// Catalog entry for an exact title.
    pub async fn course_metadata(&self, title: &str) -> Result<Option<Course>> {
        let records = self
            .store
            .get(COURSE_CATALOG, Some(std::slice::from_ref(&title.to_string())))
            .await?;
        records.first().map(decode_course).transpose()
    }

    pub async fn course_link(&self, title: &str) -> Result<Option<String>> {
        Ok(self
            .course_metadata(title)
            .await?
            .and_then(|c| c.course_link))
    }

    pub async fn lesson_link(&self, title: &str, lesson_number: u32) -> Result<Option<String>> {
        Ok(self
            .course_metadata(title)
            .await?
            .and_then(|c| c.lesson(lesson_number).and_then(|l| l.lesson_link.clone())))
    }

    /// Remove every course and chunk.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.store.clear(COURSE_CATALOG).await?;
        self.store.clear(COURSE_CONTENT).await?;
        Ok(())
    }
}

fn catalog_metadata(course: &Course) -> Map<String, Value> {
    let lessons: Vec<Value> = course
        .lessons
        .iter()
        .map(|l| {
            json!({
                "lesson_number": l.lesson_number,
                "title": l.title,
                "lesson_link": l.lesson_link,
            })
        })
        .collect();

    let mut m = Map::new();
    m.insert("title".into(), Value::from(course.title.clone()));
    m.insert("instructor".into(), json!(course.instructor));
    m.insert("course_link".into(), json!(course.course_link));
    m.insert("lesson_count".into(), Value::from(course.lessons.len()));
    m.insert("lessons".into(), Value::Array(lessons));
    m
}

fn content_metadata(chunk: &CourseChunk) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("course_title".into(), Value::from(chunk.course_title.clone()));
    m.insert("lesson_number".into(), json!(chunk.lesson_number));
    m.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    m
}

fn catalog_title(record: &Record) -> String {
    record
        .metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| record.id.clone())
}

fn decode_course(record: &Record) -> Result<Course> {
    let mut course: Course = serde_json::from_value(Value::Object(record.metadata.clone()))?;
    if course.title.is_empty() {
        course.title = record.id.clone();
    }
    Ok(course)
}

fn decode_hit(hit: Hit) -> SearchHit {
    let meta = &hit.record.metadata;
    let chunk = CourseChunk {
        course_title: meta
            .get("course_title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        lesson_number: meta
            .get("lesson_number")
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        chunk_index: meta
            .get("chunk_index")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        content: hit.record.document,
    };
    SearchHit {
        chunk,
        distance: hit.distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::BagOfWordsEmbedder;
    use crate::models::Lesson;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    const COMPUTER_USE: &str = "Building Towards Computer Use with Anthropic";
    const MCP: &str = "MCP: Build Rich-Context AI Apps";

    fn course(title: &str, lessons: u32) -> Course {
        let mut c = Course::new(title);
        c.course_link = Some(format!("https://example.com/{}", lessons));
        c.instructor = Some("Instructor".into());
        for n in 0..lessons {
            c.lessons.push(Lesson {
                lesson_number: n,
                title: format!("Lesson title {}", n),
                lesson_link: Some(format!("https://example.com/{}/{}", lessons, n)),
            });
        }
        c
    }

    fn chunk(title: &str, lesson: Option<u32>, index: usize, content: &str) -> CourseChunk {
        CourseChunk {
            content: content.to_string(),
            course_title: title.to_string(),
            lesson_number: lesson,
            chunk_index: index,
        }
    }

    fn vector_store() -> VectorStore {
        VectorStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(BagOfWordsEmbedder::default()),
            5,
        )
    }

    async fn seeded() -> VectorStore {
        let vs = vector_store();
        vs.add_course_metadata(&course(COMPUTER_USE, 3)).await.unwrap();
        vs.add_course_metadata(&course(MCP, 4)).await.unwrap();
        vs.add_course_content(&[
            chunk(COMPUTER_USE, Some(1), 0, "Computer use lets the model click buttons."),
            chunk(COMPUTER_USE, Some(3), 1, "Prompt caching reduces latency for agents."),
            chunk(MCP, Some(1), 0, "MCP servers expose tools to clients."),
            chunk(MCP, Some(3), 1, "MCP clients list tools from servers."),
            chunk(MCP, Some(3), 2, "Servers can also expose prompts and resources."),
        ])
        .await
        .unwrap();
        vs
    }

    #[tokio::test]
    async fn test_resolve_acronym_to_full_title() {
        let vs = seeded().await;
        let resolved = vs.resolve_course_name("MCP").await.unwrap();
        assert_eq!(resolved.as_deref(), Some(MCP));
    }

    #[tokio::test]
    async fn test_resolve_on_empty_catalog() {
        let vs = vector_store();
        assert_eq!(vs.resolve_course_name("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_always_returns_nearest() {
        let vs = seeded().await;
        let resolved = vs.resolve_course_name("zzz unrelated").await.unwrap();
        assert!(resolved.is_some());
    }

    #[tokio::test]
    async fn test_filter_by_course_and_lesson() {
        let vs = seeded().await;
        let results = vs.search("tools", Some("MCP"), Some(3), None).await;
        assert!(results.error.is_none());
        assert_eq!(results.hits.len(), 2);
        for h in &results.hits {
            assert_eq!(h.chunk.course_title, MCP);
            assert_eq!(h.chunk.lesson_number, Some(3));
        }
    }

    #[tokio::test]
    async fn test_filter_by_course_any_lesson() {
        let vs = seeded().await;
        let results = vs.search("tools", Some("MCP"), None, None).await;
        assert_eq!(results.hits.len(), 3);
        assert!(results.hits.iter().all(|h| h.chunk.course_title == MCP));
        assert!(results.hits[0].distance <= results.hits[1].distance);
    }

    #[tokio::test]
    async fn test_empty_lesson_is_not_an_error() {
        let vs = seeded().await;
        let results = vs.search("tools", Some("MCP"), Some(99), None).await;
        assert!(results.is_empty());
        assert!(results.error.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_course_is_an_error() {
        let vs = vector_store();
        let results = vs.search("tools", Some("Nonexistent"), None, None).await;
        assert_eq!(
            results.error,
            Some(RagError::Resolution("Nonexistent".into()))
        );
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let vs = seeded().await;
        assert_eq!(vs.search("tools", None, None, Some(2)).await.hits.len(), 2);
        assert_eq!(vs.search("tools", None, None, None).await.hits.len(), 5);
    }

    #[tokio::test]
    async fn test_idempotent_course_add() {
        let vs = vector_store();
        assert!(vs.add_course_metadata(&course(MCP, 2)).await.unwrap());
        assert!(!vs.add_course_metadata(&course(MCP, 2)).await.unwrap());
        assert_eq!(vs.course_count().await.unwrap(), 1);

        let chunks = vec![chunk(MCP, Some(0), 0, "a"), chunk(MCP, Some(1), 1, "b")];
        vs.add_course_content(&chunks).await.unwrap();
        vs.add_course_content(&chunks).await.unwrap();
        assert_eq!(vs.store.count(COURSE_CONTENT).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_catalog_metadata_roundtrip() {
        let vs = seeded().await;
        let mut titles = vs.existing_course_titles().await.unwrap();
        titles.sort();
        assert_eq!(titles, vec![COMPUTER_USE.to_string(), MCP.to_string()]);

        let all = vs.all_courses_metadata().await.unwrap();
        let mcp = all.iter().find(|c| c.title == MCP).unwrap();
        assert_eq!(mcp.lessons.len(), 4);
        assert_eq!(mcp.instructor.as_deref(), Some("Instructor"));

        assert_eq!(
            vs.course_link(MCP).await.unwrap().as_deref(),
            Some("https://example.com/4")
        );
        assert_eq!(
            vs.lesson_link(MCP, 2).await.unwrap().as_deref(),
            Some("https://example.com/4/2")
        );
        assert_eq!(vs.lesson_link(MCP, 42).await.unwrap(), None);
        assert_eq!(vs.course_link("Unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_all_data() {
        let vs = seeded().await;
        vs.clear_all_data().await.unwrap();
        assert_eq!(vs.course_count().await.unwrap(), 0);
        assert!(vs.search("tools", None, None, None).await.is_empty());
    }

    /// Fails multi-text batches while `failing` is set.
    struct FlakyEmbedder {
        inner: BagOfWordsEmbedder,
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.len() > 1 && self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                bail!("embedding service 503");
            }
            self.inner.embed(texts).await
        }
    }

    #[tokio::test]
    async fn test_failed_content_leaves_course_retryable() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: BagOfWordsEmbedder::default(),
            failing: std::sync::atomic::AtomicBool::new(true),
        });
        let vs = VectorStore::new(Arc::new(InMemoryStore::new()), embedder.clone(), 5);
        let chunks = vec![
            chunk(MCP, Some(1), 0, "MCP servers expose tools."),
            chunk(MCP, Some(2), 1, "Clients connect to servers."),
        ];

        let err = vs.add_course(&course(MCP, 3), &chunks).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(vs.course_count().await.unwrap(), 0);

        embedder
            .failing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let added = vs.add_course(&course(MCP, 3), &chunks).await.unwrap();
        assert_eq!(added, Some(2));
        assert_eq!(vs.course_count().await.unwrap(), 1);
        assert_eq!(vs.store.count(COURSE_CONTENT).await.unwrap(), 2);
        assert_eq!(vs.add_course(&course(MCP, 3), &chunks).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_changed_embedding_dims_is_an_error() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let wide = VectorStore::new(Arc::clone(&store), Arc::new(BagOfWordsEmbedder::new(512)), 5);
        wide.add_course_metadata(&course("Alpha Course", 1)).await.unwrap();
        wide.add_course_metadata(&course("MCP Course", 1)).await.unwrap();

        let narrow = VectorStore::new(store, Arc::new(BagOfWordsEmbedder::new(64)), 5);
        let err = narrow.resolve_course_name("MCP").await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));

        let results = narrow.search("tools", Some("MCP"), None, None).await;
        assert!(matches!(results.error, Some(RagError::Store(_))));
    }

    /// Declares more dimensions than it produces.
    struct MisreportingEmbedder;

    #[async_trait]
    impl Embedder for MisreportingEmbedder {
        fn model_name(&self) -> &str {
            "misreporting"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 4]).collect())
        }
    }

    #[tokio::test]
    async fn test_embedder_output_must_match_declared_dims() {
        let vs = VectorStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MisreportingEmbedder),
            5,
        );
        let err = vs
            .add_course_content(&[chunk(MCP, Some(1), 0, "text")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 8"));
        assert!(vs.add_course_metadata(&course(MCP, 1)).await.is_err());
        assert_eq!(vs.course_count().await.unwrap(), 0);
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn upsert(&self, _: &str, _: &[Record]) -> Result<()> {
            bail!("Database connection failed")
        }
        async fn get(&self, _: &str, _: Option<&[String]>) -> Result<Vec<Record>> {
            bail!("Database connection failed")
        }
        async fn query(
            &self,
            _: &str,
            _: &[f32],
            _: usize,
            _: Option<&Filter>,
        ) -> Result<Vec<Hit>> {
            bail!("Database connection failed")
        }
        async fn count(&self, _: &str) -> Result<usize> {
            bail!("Database connection failed")
        }
        async fn clear(&self, _: &str) -> Result<()> {
            bail!("Database connection failed")
        }
    }

    #[tokio::test]
    async fn test_store_failure_becomes_error_result() {
        let vs = VectorStore::new(
            Arc::new(BrokenStore),
            Arc::new(BagOfWordsEmbedder::default()),
            5,
        );
        let results = vs.search("anything", None, None, None).await;
        let err = results.error.unwrap();
        assert!(matches!(err, RagError::Store(_)));
        assert!(err.to_string().contains("Database connection failed"));
    }
}
