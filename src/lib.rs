//! # Course RAG
//!
//! Question answering over a folder of course documents.
//!
//! Course files are parsed into a course outline plus overlapping text
//! chunks, embedded, and stored in two collections: a catalog with one
//! record per course and a content collection with one record per chunk.
//! A query goes to a language model together with two tools, a semantic
//! content search and a course outline lookup. The model decides whether
//! to call them; the answer comes back with the sources the tools used.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────────────┐
//! │ Course docs │──▶│  Processor  │──▶│  SQLite records    │
//! │ txt/pdf/docx│   │ Chunk+Embed │   │ catalog | content  │
//! └─────────────┘   └─────────────┘   └─────────┬──────────┘
//!                                               │
//!                   ┌──────────┐   ┌─────────┐  │
//!     query ───────▶│ RagSystem│◀─▶│  Tools  │◀─┘
//!                   └────┬─────┘   └─────────┘
//!                        ▼
//!                   ┌──────────┐
//!                   │  Model   │
//!                   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! courserag init
//! courserag ingest ./docs
//! courserag search "tool calling" --course MCP --lesson 1
//! courserag query "What does lesson 1 of the MCP course cover?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite collection store |
//! | [`embedding`] | Embedding providers |
//! | [`extract`] | Text extraction from PDF and DOCX |
//! | [`ingest`] | Course folder scanning |
//! | [`tools`] | Model-callable tools and the tool manager |
//! | [`llm`] | Language model client |
//! | [`session`] | Conversation sessions |
//! | [`rag`] | Query orchestration |
//!
//! Models, chunking, the store trait, and the dual-collection vector store
//! live in `course-rag-core`.

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod rag;
pub mod session;
pub mod sqlite_store;
pub mod tools;
