//! # Course RAG CLI (`courserag`)
//!
//! ## Usage
//!
//! ```bash
//! courserag --config ./config/courserag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `courserag init` | Create the SQLite database and run schema migrations |
//! | `courserag ingest <folder>` | Load every course document in a folder |
//! | `courserag query "<text>"` | Answer one question |
//! | `courserag chat` | Answer questions from stdin within one session |
//! | `courserag search "<text>"` | Run the content search tool without the model |
//! | `courserag courses` | List stored courses |
//!
//! `query` and `chat` need `ANTHROPIC_API_KEY` in the environment.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use course_rag::config;
use course_rag::migrate;
use course_rag::rag::{QueryResponse, RagSystem};
use course_rag::tools::{SourceLedger, SEARCH_TOOL};

/// Course RAG CLI: question answering over course materials.
#[derive(Parser)]
#[command(
    name = "courserag",
    about = "Course RAG: question answering over course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/courserag.toml`. A missing file means all
    /// defaults.
    #[arg(long, global = true, default_value = "./config/courserag.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest every course document in a folder.
    ///
    /// Courses whose title is already stored are skipped.
    Ingest {
        /// Folder holding `.txt`, `.pdf`, and `.docx` course files.
        folder: PathBuf,

        /// Delete all stored courses before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Answer a question about the stored courses.
    Query {
        /// The question.
        text: String,
    },

    /// Read questions from stdin, one per line, sharing one session.
    Chat,

    /// Search course content directly, without the model.
    Search {
        /// Search text.
        query: String,

        /// Course name; partial names are resolved to the closest title.
        #[arg(long)]
        course: Option<String>,

        /// Restrict results to one lesson number.
        #[arg(long)]
        lesson: Option<u32>,
    },

    /// List stored courses.
    Courses,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
        config::parse_config("")?
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { folder, clear } => {
            let rag = RagSystem::from_config(&cfg).await?;
            let (courses, chunks) = rag.add_course_folder(&folder, clear).await?;
            println!("Added {} courses with {} chunks.", courses, chunks);
        }
        Commands::Query { text } => {
            let rag = RagSystem::from_config(&cfg).await?;
            let response = rag.query(&text, None).await?;
            print_response(&response);
        }
        Commands::Chat => {
            let rag = RagSystem::from_config(&cfg).await?;
            let mut session_id: Option<String> = None;
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (response, id) = rag.query_with_session(line, session_id.as_deref()).await?;
                session_id = Some(id);
                print_response(&response);
                println!();
            }
        }
        Commands::Search {
            query,
            course,
            lesson,
        } => {
            let rag = RagSystem::from_config(&cfg).await?;
            let mut params = json!({ "query": query });
            if let Some(course) = course {
                params["course_name"] = json!(course);
            }
            if let Some(lesson) = lesson {
                params["lesson_number"] = json!(lesson);
            }
            let mut ledger = SourceLedger::new();
            let text = rag
                .tool_manager()
                .execute(SEARCH_TOOL, &params, &mut ledger)
                .await;
            print_response(&QueryResponse {
                answer: text,
                sources: ledger.take(),
            });
        }
        Commands::Courses => {
            let rag = RagSystem::from_config(&cfg).await?;
            let analytics = rag.course_analytics().await?;
            println!("{} courses", analytics.total_courses);
            for title in analytics.course_titles {
                println!("  {}", title);
            }
        }
    }

    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            match &source.link {
                Some(link) => println!("  {} <{}>", source.label, link),
                None => println!("  {}", source.label),
            }
        }
    }
}
