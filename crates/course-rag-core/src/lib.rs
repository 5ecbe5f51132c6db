//! # Course RAG Core
//!
//! Backend-agnostic logic for the course assistant: course data models,
//! document parsing and chunking, the embedding and collection store
//! traits, and the dual-collection [`vector_store::VectorStore`].
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Native
//! backends (SQLite, remote embedding APIs) live in the `course-rag`
//! application crate and plug in through [`store::Store`] and
//! [`embedding::Embedder`].

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod models;
pub mod store;
pub mod vector_store;
