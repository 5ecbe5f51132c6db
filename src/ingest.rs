//! Course folder scanning and document loading.
//!
//! Walks a folder for files matching the `[ingest]` include globs (minus
//! excludes), reads each through [`extract`](crate::extract), and parses
//! it into a course and its chunks. Storage is left to
//! [`RagSystem`](crate::rag::RagSystem).

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use course_rag_core::document::DocumentProcessor;
use course_rag_core::models::{Course, CourseChunk};

use crate::config::IngestConfig;
use crate::extract::read_document;

/// Course files under `root`, sorted by relative path.
pub fn scan_course_files(root: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Read and parse one course document.
pub fn load_course(path: &Path, processor: &DocumentProcessor) -> Result<(Course, Vec<CourseChunk>)> {
    let text = read_document(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("No file name in {}", path.display()))?;
    Ok(processor.process_document(&text, &stem))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_matches_include_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("notes.md"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), "x").unwrap();

        let files = scan_course_files(dir.path(), &IngestConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_scan_respects_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "x").unwrap();
        std::fs::write(dir.path().join("draft.txt"), "x").unwrap();
        let config = IngestConfig {
            exclude_globs: vec!["draft*".to_string()],
            ..IngestConfig::default()
        };
        let files = scan_course_files(dir.path(), &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }

    #[test]
    fn test_load_course_uses_stem_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose_notes.txt");
        std::fs::write(&path, "Some loose notes. More notes.").unwrap();
        let (course, chunks) = load_course(&path, &DocumentProcessor::new(800, 100)).unwrap();
        assert_eq!(course.title, "loose_notes");
        assert_eq!(chunks.len(), 1);
    }
}
