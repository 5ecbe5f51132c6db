//! Query orchestration and course ingestion.
//!
//! [`RagSystem`] wires the course store, tool manager, language model,
//! and sessions together. A query runs one bounded tool-use protocol:
//!
//! ```text
//! AwaitingFirst ──text──────────────────────────────▶ Done
//!       │
//!       └─tool_use─▶ ToolDispatch ─▶ AwaitingFinal ──▶ Done
//! ```
//!
//! Tools are offered only on the first call; the second call never offers
//! them, so at most one round of tool use happens per query. Only a model
//! failure escapes [`RagSystem::query`]; tool problems reach the model as
//! text.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use course_rag_core::document::DocumentProcessor;
use course_rag_core::embedding::Embedder;
use course_rag_core::error::RagError;
use course_rag_core::models::{Course, Source};
use course_rag_core::store::Store;
use course_rag_core::vector_store::VectorStore;

use crate::config::{Config, IngestConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::ingest::{load_course, scan_course_files};
use crate::llm::{AnthropicClient, ChatModel, ChatRequest, ChatResponse, ContentBlock, Message, Role};
use crate::migrate;
use crate::session::SessionManager;
use crate::sqlite_store::SqliteStore;
use crate::tools::{SourceLedger, ToolManager};

const SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about a catalog of course materials.

Tools:
- search_course_content: semantic search over lesson text. Use it for questions about \
specific course content or detailed educational material.
- get_course_outline: a course's title, link, instructor, and numbered lesson list. Use it \
for questions about what a course covers or how it is organised.

Use at most one round of tool calls per question. If a tool finds nothing, say so plainly.
Answer general-knowledge questions directly without tools.

Answers must be brief, accurate, and direct. Do not mention the tools, the search, or \
your reasoning process; give only the answer, with examples where they help.";

/// Answer and attribution for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

enum Phase {
    AwaitingFirst,
    ToolDispatch(ChatResponse),
    AwaitingFinal,
    Done(String),
}

pub struct RagSystem {
    vector_store: Arc<VectorStore>,
    processor: DocumentProcessor,
    tools: ToolManager,
    model: Arc<dyn ChatModel>,
    sessions: SessionManager,
    ingest: IngestConfig,
}

impl RagSystem {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let vector_store = Arc::new(
            VectorStore::new(store, embedder, config.retrieval.max_results)
                .with_batch_size(config.embedding.batch_size),
        );
        Self {
            tools: ToolManager::with_course_tools(Arc::clone(&vector_store)),
            vector_store,
            processor: DocumentProcessor::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ),
            model,
            sessions: SessionManager::new(config.session.max_history),
            ingest: config.ingest.clone(),
        }
    }

    /// SQLite store, configured embedder, and the Anthropic client.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let model: Arc<dyn ChatModel> = Arc::new(AnthropicClient::from_config(&config.llm)?);
        Ok(Self::new(config, store, embedder, model))
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    pub fn tool_manager(&self) -> &ToolManager {
        &self.tools
    }

    /// Answer `query`, optionally in the context of a rendered history.
    pub async fn query(
        &self,
        query: &str,
        history: Option<&str>,
    ) -> std::result::Result<QueryResponse, RagError> {
        let mut ledger = SourceLedger::new();
        let system = build_system_prompt(history);
        let mut messages = vec![Message::user_text(format!(
            "Answer this question about course materials: {}",
            query
        ))];

        let mut phase = Phase::AwaitingFirst;
        let answer = loop {
            phase = match phase {
                Phase::AwaitingFirst => {
                    let request = ChatRequest {
                        system: system.clone(),
                        messages: messages.clone(),
                        tools: self.tools.get_tool_definitions(),
                    };
                    let response = self.call_model(&request).await?;
                    if response.tool_calls().is_empty() {
                        Phase::Done(response.text())
                    } else {
                        Phase::ToolDispatch(response)
                    }
                }
                Phase::ToolDispatch(response) => {
                    let mut results = Vec::new();
                    for call in response.tool_calls() {
                        tracing::info!(tool = %call.name, input = %call.input, "tool call");
                        let text = self.tools.execute(&call.name, &call.input, &mut ledger).await;
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: call.id,
                            content: text,
                        });
                    }
                    messages.push(Message {
                        role: Role::Assistant,
                        content: response.replayable_content(),
                    });
                    messages.push(Message {
                        role: Role::User,
                        content: results,
                    });
                    Phase::AwaitingFinal
                }
                Phase::AwaitingFinal => {
                    let request = ChatRequest {
                        system: system.clone(),
                        messages: messages.clone(),
                        tools: Vec::new(),
                    };
                    let response = self.call_model(&request).await?;
                    Phase::Done(response.text())
                }
                Phase::Done(answer) => break answer,
            };
        };

        Ok(QueryResponse {
            answer,
            sources: ledger.take(),
        })
    }

    /// [`query`](Self::query) within a session, creating one when `None`.
    /// Returns the response and the session id used.
    pub async fn query_with_session(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<(QueryResponse, String)> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create_session()?,
        };
        let history = self.sessions.get_conversation_history(&session_id)?;
        let response = self.query(query, history.as_deref()).await?;
        self.sessions
            .add_exchange(&session_id, query, &response.answer)?;
        Ok((response, session_id))
    }

    async fn call_model(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, RagError> {
        tracing::debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "calling model"
        );
        self.model.complete(request).await.map_err(|e| {
            tracing::error!(error = %e, "model invocation failed");
            RagError::model(e)
        })
    }

    /// Ingest one document. Returns the parsed course and the number of
    /// chunks stored, which is `0` when the title already exists.
    pub async fn add_course_document(&self, path: &Path) -> Result<(Course, usize)> {
        let (course, chunks) = load_course(path, &self.processor)?;
        match self.vector_store.add_course(&course, &chunks).await? {
            Some(added) => {
                tracing::info!(title = %course.title, chunks = added, "course added");
                Ok((course, added))
            }
            None => {
                tracing::info!(title = %course.title, "course already exists, skipping");
                Ok((course, 0))
            }
        }
    }

    /// Ingest every course file in `folder`, skipping titles already
    /// stored. Returns `(courses_added, chunks_added)`.
    ///
    /// A missing folder adds nothing and leaves stored data alone, even
    /// with `clear_existing`.
    pub async fn add_course_folder(&self, folder: &Path, clear_existing: bool) -> Result<(usize, usize)> {
        if !folder.is_dir() {
            tracing::warn!(folder = %folder.display(), "course folder does not exist");
            return Ok((0, 0));
        }

        if clear_existing {
            tracing::info!("clearing existing course data");
            self.vector_store.clear_all_data().await?;
        }

        let mut existing: HashSet<String> = self
            .vector_store
            .existing_course_titles()
            .await?
            .into_iter()
            .collect();

        let mut courses_added = 0;
        let mut chunks_added = 0;

        for path in scan_course_files(folder, &self.ingest)? {
            let (course, chunks) = match load_course(&path, &self.processor) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable course file");
                    continue;
                }
            };

            if existing.contains(&course.title) {
                tracing::info!(title = %course.title, "course already exists, skipping");
                continue;
            }

            if let Some(added) = self.vector_store.add_course(&course, &chunks).await? {
                chunks_added += added;
                courses_added += 1;
                tracing::info!(title = %course.title, chunks = added, "course added");
            }
            existing.insert(course.title);
        }

        Ok((courses_added, chunks_added))
    }

    pub async fn course_analytics(&self) -> Result<CourseAnalytics> {
        let mut course_titles = self.vector_store.existing_course_titles().await?;
        course_titles.sort();
        Ok(CourseAnalytics {
            total_courses: self.vector_store.course_count().await?,
            course_titles,
        })
    }
}

fn build_system_prompt(history: Option<&str>) -> String {
    match history.filter(|h| !h.trim().is_empty()) {
        Some(h) => format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, h),
        None => SYSTEM_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_includes_history() {
        let prompt = build_system_prompt(Some("User: hi\nAssistant: hello"));
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.ends_with("Previous conversation:\nUser: hi\nAssistant: hello"));
        assert_eq!(build_system_prompt(None), SYSTEM_PROMPT);
        assert_eq!(build_system_prompt(Some("  ")), SYSTEM_PROMPT);
    }
}
