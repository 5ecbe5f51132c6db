//! Model-callable tools over the course store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               ToolManager                │
//! │  ┌──────────────────┐ ┌───────────────┐  │
//! │  │search_course_    │ │get_course_    │  │
//! │  │content           │ │outline        │  │
//! │  └──────────────────┘ └───────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     execute(name, args, &mut SourceLedger) → text
//! ```
//!
//! Tools never raise past the manager: unknown tools, bad arguments, and
//! store failures all come back as text the model can read. Attribution
//! travels in [`ToolOutput::sources`] and is collected into a
//! request-scoped [`SourceLedger`], so concurrent queries never see each
//! other's sources.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use course_rag_core::error::RagError;
use course_rag_core::models::Source;
use course_rag_core::vector_store::{SearchResults, VectorStore};

pub const SEARCH_TOOL: &str = "search_course_content";
pub const OUTLINE_TOOL: &str = "get_course_outline";

/// Text for the model plus the sources that back it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub sources: Vec<Source>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// Declaration sent to the model, in Anthropic tool-use shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, unique per manager.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema with `type: "object"`, `properties`, and `required`.
    fn parameters_schema(&self) -> Value;

    /// Run with arguments already checked against `required`.
    async fn execute(&self, params: &Value) -> Result<ToolOutput>;
}

// ═══════════════════════════════════════════════════════════════════════
// Source ledger
// ═══════════════════════════════════════════════════════════════════════

/// Per-query record of the most recent sources from each tool.
///
/// Each tool has one slot, overwritten by its latest call.
/// [`last_sources`](Self::last_sources) aggregates the slots in the order
/// tools first reported.
#[derive(Debug, Default)]
pub struct SourceLedger {
    slots: Vec<(String, Vec<Source>)>,
}

impl SourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tool_name: &str, sources: Vec<Source>) {
        match self.slots.iter_mut().find(|(name, _)| name == tool_name) {
            Some((_, slot)) => *slot = sources,
            None => self.slots.push((tool_name.to_string(), sources)),
        }
    }

    pub fn last_sources(&self) -> Vec<Source> {
        self.slots
            .iter()
            .flat_map(|(_, s)| s.iter().cloned())
            .collect()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// [`last_sources`](Self::last_sources) followed by [`reset`](Self::reset).
    pub fn take(&mut self) -> Vec<Source> {
        let sources = self.last_sources();
        self.reset();
        sources
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool manager
// ═══════════════════════════════════════════════════════════════════════

/// Registry mapping tool name to implementation.
#[derive(Default)]
pub struct ToolManager {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the course search and outline tools.
    pub fn with_course_tools(store: Arc<VectorStore>) -> Self {
        let mut manager = Self::new();
        manager.register(Arc::new(CourseSearchTool::new(Arc::clone(&store))));
        manager.register(Arc::new(CourseOutlineTool::new(store)));
        manager
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call by name and return the text for the model.
    ///
    /// Sources from a successful call are recorded in `ledger`. Every
    /// failure mode is rendered as text instead of an error.
    pub async fn execute(&self, name: &str, params: &Value, ledger: &mut SourceLedger) -> String {
        let Some(tool) = self.find(name) else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return format!("Tool '{}' not found", name);
        };

        if let Err(msg) = validate_args(&tool.parameters_schema(), params) {
            tracing::warn!(tool = name, error = %msg, "invalid tool arguments");
            return format!("Invalid arguments for tool '{}': {}", name, msg);
        }

        match tool.execute(params).await {
            Ok(output) => {
                tracing::debug!(tool = name, sources = output.sources.len(), "tool executed");
                ledger.record(name, output.sources);
                output.text
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool execution failed");
                format!("Tool '{}' failed: {}", name, e)
            }
        }
    }
}

/// Check that `params` is an object holding every `required` property.
fn validate_args(schema: &Value, params: &Value) -> std::result::Result<(), String> {
    let Some(obj) = params.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.as_slice())
        .unwrap_or_default();
    for field in required.iter().filter_map(Value::as_str) {
        match obj.get(field) {
            None | Some(Value::Null) => {
                return Err(format!("missing required parameter '{}'", field));
            }
            _ => {}
        }
    }
    Ok(())
}

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A non-negative integer that fits in `u32`, or a string holding one.
/// Absent and `null` are `Ok(None)`; anything else is an error message.
fn u32_param(params: &Value, key: &str) -> std::result::Result<Option<u32>, String> {
    let parsed = match params.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| format!("'{}' must be a non-negative integer", key))
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

/// Semantic search over course content with optional course and lesson filters.
pub struct CourseSearchTool {
    store: Arc<VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }

    async fn format_results(&self, results: &SearchResults) -> ToolOutput {
        let mut blocks = Vec::with_capacity(results.hits.len());
        let mut sources: Vec<Source> = Vec::new();

        for hit in &results.hits {
            let chunk = &hit.chunk;
            let header = match chunk.lesson_number {
                Some(n) => format!("[{} - Lesson {}]", chunk.course_title, n),
                None => format!("[{}]", chunk.course_title),
            };
            blocks.push(format!("{}\n{}", header, chunk.content));

            let label = chunk.source_label();
            if sources.iter().any(|s| s.label == label) {
                continue;
            }
            let link = match chunk.lesson_number {
                Some(n) => self.store.lesson_link(&chunk.course_title, n).await,
                None => self.store.course_link(&chunk.course_title).await,
            }
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "link lookup failed");
                None
            });
            sources.push(Source::new(label, link));
        }

        ToolOutput {
            text: blocks.join("\n\n"),
            sources,
        }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search course materials with smart course name matching and lesson filtering"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in the course content"
                },
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                },
                "lesson_number": {
                    "type": "integer",
                    "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: &Value) -> Result<ToolOutput> {
        let query = params.get("query").and_then(Value::as_str).unwrap_or("");
        let course_name = str_param(params, "course_name");
        let lesson_number = match u32_param(params, "lesson_number") {
            Ok(n) => n,
            Err(msg) => {
                return Ok(ToolOutput::text(format!(
                    "Invalid arguments for tool '{}': {}",
                    SEARCH_TOOL, msg
                )))
            }
        };

        let results = self
            .store
            .search(query, course_name, lesson_number, None)
            .await;

        if let Some(err) = &results.error {
            return Ok(ToolOutput::text(err.to_string()));
        }

        if results.is_empty() {
            let mut filter_info = String::new();
            if let Some(c) = course_name {
                filter_info.push_str(&format!(" in course '{}'", c));
            }
            if let Some(n) = lesson_number {
                filter_info.push_str(&format!(" in lesson {}", n));
            }
            return Ok(ToolOutput::text(format!(
                "No relevant content found{}.",
                filter_info
            )));
        }

        Ok(self.format_results(&results).await)
    }
}

/// Course title, link, instructor, and lesson list for a fuzzy course name.
pub struct CourseOutlineTool {
    store: Arc<VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn name(&self) -> &str {
        OUTLINE_TOOL
    }

    fn description(&self) -> &str {
        "Get a course outline: title, link, instructor, and the numbered list of lessons"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Computer Use')"
                }
            },
            "required": ["course_name"]
        })
    }

    async fn execute(&self, params: &Value) -> Result<ToolOutput> {
        let name = str_param(params, "course_name").unwrap_or("");

        let title = match self.store.resolve_course_name(name).await {
            Ok(Some(t)) => t,
            Ok(None) => return Ok(ToolOutput::text(RagError::Resolution(name.into()).to_string())),
            Err(e) => return Ok(ToolOutput::text(RagError::store(e).to_string())),
        };

        let course = match self.store.course_metadata(&title).await {
            Ok(Some(c)) => c,
            Ok(None) => return Ok(ToolOutput::text(RagError::Resolution(name.into()).to_string())),
            Err(e) => return Ok(ToolOutput::text(RagError::store(e).to_string())),
        };

        let mut lines = vec![format!("Course Title: {}", course.title)];
        if let Some(link) = &course.course_link {
            lines.push(format!("Course Link: {}", link));
        }
        if let Some(instructor) = &course.instructor {
            lines.push(format!("Course Instructor: {}", instructor));
        }
        lines.push(format!("Lessons ({} total):", course.lessons.len()));
        for lesson in &course.lessons {
            lines.push(format!("Lesson {}: {}", lesson.lesson_number, lesson.title));
        }

        Ok(ToolOutput {
            text: lines.join("\n"),
            sources: vec![Source::new(course.title.clone(), course.course_link.clone())],
        })
    }
}
