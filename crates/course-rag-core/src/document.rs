//! Course document parsing.
//!
//! Turns the text of one course document into a [`Course`] plus its
//! [`CourseChunk`]s. Documents follow a line-oriented convention:
//!
//! ```text
//! Course Title: Building Towards Computer Use with Anthropic
//! Course Link: https://www.deeplearning.ai/short-courses/...
//! Course Instructor: Colt Steele
//!
//! Lesson 0: Introduction
//! Lesson Link: https://learn.deeplearning.ai/...
//! Welcome to the course. ...
//!
//! Lesson 1: Overview
//! ...
//! ```
//!
//! Keys are matched case-insensitively. When the `Course Title:` line is
//! missing, the file stem becomes the title and the whole text is a single
//! unnamed lesson. When there are no lesson markers, the body after the
//! header is a single unnamed lesson.

use crate::chunk::chunk_text;
use crate::models::{Course, CourseChunk, Lesson};

/// Parses course documents and splits lesson bodies into chunks.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Parse one document. `file_stem` is the fallback course title.
    ///
    /// Chunk indices count from zero across the whole course, not per
    /// lesson, so `(course_title, chunk_index)` is unique.
    pub fn process_document(&self, text: &str, file_stem: &str) -> (Course, Vec<CourseChunk>) {
        let lines: Vec<&str> = text.lines().collect();
        let header = parse_header(&lines);

        let Some(header) = header else {
            let course = Course::new(file_stem);
            let chunks = self.chunk_block(&course.title, None, text, 0);
            return (course, chunks);
        };

        let mut course = Course::new(header.title);
        course.course_link = header.course_link;
        course.instructor = header.instructor;

        let body = &lines[header.consumed..];

        if !body.iter().any(|l| parse_lesson_marker(l).is_some()) {
            let text = body.join("\n");
            let chunks = self.chunk_block(&course.title, None, &text, 0);
            return (course, chunks);
        }

        let mut chunks = Vec::new();
        let mut current: Option<Lesson> = None;
        let mut buffer: Vec<&str> = Vec::new();

        let mut i = 0;
        while i < body.len() {
            let line = body[i];
            if let Some((number, title)) = parse_lesson_marker(line) {
                if let Some(lesson) = current.take() {
                    self.flush_lesson(&mut course, &mut chunks, lesson, &buffer);
                }
                buffer.clear();

                let mut lesson = Lesson {
                    lesson_number: number,
                    title,
                    lesson_link: None,
                };
                if let Some(link) = body.get(i + 1).and_then(|l| strip_key(l, "Lesson Link:")) {
                    lesson.lesson_link = Some(link.to_string());
                    i += 1;
                }
                current = Some(lesson);
            } else if current.is_some() {
                buffer.push(line);
            }
            i += 1;
        }

        if let Some(lesson) = current.take() {
            self.flush_lesson(&mut course, &mut chunks, lesson, &buffer);
        }

        (course, chunks)
    }

    fn flush_lesson(
        &self,
        course: &mut Course,
        chunks: &mut Vec<CourseChunk>,
        lesson: Lesson,
        body: &[&str],
    ) {
        let text = body.join("\n");
        let start = chunks.len();
        let mut lesson_chunks =
            self.chunk_block(&course.title, Some(lesson.lesson_number), &text, start);
        chunks.append(&mut lesson_chunks);

        if course.lesson(lesson.lesson_number).is_none() {
            course.lessons.push(lesson);
        }
    }

    fn chunk_block(
        &self,
        course_title: &str,
        lesson_number: Option<u32>,
        text: &str,
        first_index: usize,
    ) -> Vec<CourseChunk> {
        chunk_text(text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, content)| CourseChunk {
                content,
                course_title: course_title.to_string(),
                lesson_number,
                chunk_index: first_index + i,
            })
            .collect()
    }
}

struct Header {
    title: String,
    course_link: Option<String>,
    instructor: Option<String>,
    /// Number of leading lines that belong to the header.
    consumed: usize,
}

fn parse_header(lines: &[&str]) -> Option<Header> {
    let mut title = None;
    let mut course_link = None;
    let mut instructor = None;
    let mut consumed = 0;

    for line in lines {
        if line.trim().is_empty() {
            consumed += 1;
        } else if let Some(v) = strip_key(line, "Course Title:") {
            title = Some(v.to_string());
            consumed += 1;
        } else if let Some(v) = strip_key(line, "Course Link:") {
            course_link = non_empty(v);
            consumed += 1;
        } else if let Some(v) = strip_key(line, "Course Instructor:") {
            instructor = non_empty(v);
            consumed += 1;
        } else {
            break;
        }
    }

    let title = title.filter(|t| !t.is_empty())?;
    Some(Header {
        title,
        course_link,
        instructor,
        consumed,
    })
}

/// `Lesson <n>: <title>` → `(n, title)`.
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let rest = strip_key(line, "Lesson ")?;
    let (number, title) = rest.split_once(':')?;
    let number = number.trim().parse::<u32>().ok()?;
    Some((number, title.trim().to_string()))
}

/// Case-insensitive key prefix match returning the trimmed value.
fn strip_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let line = line.trim_start();
    if line.len() < key.len() || !line.is_char_boundary(key.len()) {
        return None;
    }
    if line[..key.len()].eq_ignore_ascii_case(key) {
        Some(line[key.len()..].trim())
    } else {
        None
    }
}

fn non_empty(v: &str) -> Option<String> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Course Title: MCP: Build Rich-Context AI Apps
Course Link: https://example.com/mcp
Course Instructor: Elie Schoppik

Lesson 0: Introduction
Lesson Link: https://example.com/mcp/0
Welcome to the course. We will build MCP servers.

Lesson 1: Why MCP
Lesson Link: https://example.com/mcp/1
MCP standardizes how applications provide context. It was released by Anthropic.

Lesson 2: Architecture
Clients connect to servers. Servers expose tools and resources.
";

    #[test]
    fn test_parses_header_and_lessons() {
        let p = DocumentProcessor::new(800, 100);
        let (course, chunks) = p.process_document(SAMPLE, "mcp");

        assert_eq!(course.title, "MCP: Build Rich-Context AI Apps");
        assert_eq!(course.course_link.as_deref(), Some("https://example.com/mcp"));
        assert_eq!(course.instructor.as_deref(), Some("Elie Schoppik"));
        assert_eq!(course.lessons.len(), 3);
        assert_eq!(course.lessons[1].title, "Why MCP");
        assert_eq!(
            course.lessons[1].lesson_link.as_deref(),
            Some("https://example.com/mcp/1")
        );
        assert!(course.lessons[2].lesson_link.is_none());

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].lesson_number, Some(1));
        assert!(chunks[1].content.starts_with("MCP standardizes"));
        assert!(!chunks[1].content.contains("Lesson Link"));
    }

    #[test]
    fn test_chunk_indices_are_global_per_course() {
        let p = DocumentProcessor::new(40, 0);
        let (_, chunks) = p.process_document(SAMPLE, "mcp");
        assert!(chunks.len() > 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.course_title, "MCP: Build Rich-Context AI Apps");
        }
    }

    #[test]
    fn test_no_header_falls_back_to_file_stem() {
        let p = DocumentProcessor::new(800, 100);
        let (course, chunks) =
            p.process_document("Just some notes. Nothing structured here.", "notes");
        assert_eq!(course.title, "notes");
        assert!(course.lessons.is_empty());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].lesson_number, None);
    }

    #[test]
    fn test_header_without_lessons() {
        let p = DocumentProcessor::new(800, 100);
        let text = "course title: Plain Course\ncourse instructor: Someone\n\nBody text here.";
        let (course, chunks) = p.process_document(text, "plain");
        assert_eq!(course.title, "Plain Course");
        assert_eq!(course.instructor.as_deref(), Some("Someone"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Body text here.");
        assert_eq!(chunks[0].lesson_number, None);
    }

    #[test]
    fn test_text_before_first_lesson_is_ignored() {
        let p = DocumentProcessor::new(800, 100);
        let text = "Course Title: C\nPreamble line.\nLesson 1: One\nBody one.";
        let (course, chunks) = p.process_document(text, "c");
        assert_eq!(course.lessons.len(), 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Body one.");
    }

    #[test]
    fn test_empty_document() {
        let p = DocumentProcessor::new(800, 100);
        let (course, chunks) = p.process_document("", "empty");
        assert_eq!(course.title, "empty");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_lesson_marker_parsing() {
        assert_eq!(
            parse_lesson_marker("Lesson 3: Tools"),
            Some((3, "Tools".to_string()))
        );
        assert_eq!(parse_lesson_marker("Lesson Link: http://x"), None);
        assert_eq!(parse_lesson_marker("Lessons learned: none"), None);
    }
}
