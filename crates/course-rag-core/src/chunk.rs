//! Sentence-respecting text chunker with character overlap.
//!
//! Splits lesson text into windows of at most `chunk_size` characters.
//! Consecutive windows share whole trailing sentences totalling at most
//! `chunk_overlap` characters, so context carries across boundaries
//! without ever cutting a sentence in half when it can be avoided.
//!
//! # Algorithm
//!
//! 1. Collapse all whitespace runs to a single space and trim.
//! 2. Split into sentences after `.`, `!` or `?` followed by a space and an
//!    uppercase letter (short abbreviations such as `Mr.` or `e.g.` do not
//!    end a sentence).
//! 3. Hard-split any sentence longer than `chunk_size` at the last space
//!    inside the window (or mid-word if there is none).
//! 4. Greedily pack sentences into a window until the next one would
//!    exceed `chunk_size`.
//! 5. Start the next window at the trailing sentences of the previous one
//!    that fit in `chunk_overlap`, always advancing by at least one
//!    sentence.
//!
//! # Example
//!
//! ```rust
//! use course_rag_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("First sentence. Second sentence.", 800, 100);
//! assert_eq!(chunks, vec!["First sentence. Second sentence.".to_string()]);
//! ```

/// Split text into overlapping, sentence-aligned windows.
///
/// Returns an empty vector for blank input. Every returned window is at
/// most `chunk_size` characters long.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let units: Vec<&str> = split_sentences(&normalized)
        .into_iter()
        .flat_map(|s| hard_split(s, chunk_size))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < units.len() {
        let mut size = 0;
        let mut end = start;
        while end < units.len() {
            let sep = if end > start { 1 } else { 0 };
            let add = char_len(units[end]) + sep;
            if end > start && size + add > chunk_size {
                break;
            }
            size += add;
            end += 1;
        }

        chunks.push(units[start..end].join(" "));

        if end >= units.len() {
            break;
        }

        let mut overlap_size = 0;
        let mut overlap_units = 0;
        for k in (start..end).rev() {
            let sep = if k < end - 1 { 1 } else { 0 };
            let add = char_len(units[k]) + sep;
            if overlap_size + add > chunk_overlap {
                break;
            }
            overlap_size += add;
            overlap_units += 1;
        }

        start = (end - overlap_units).max(start + 1);
    }

    chunks
}

/// Collapse whitespace runs to single spaces and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split whitespace-normalized text into sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if c == ' ' && matches!(prev, Some('.') | Some('!') | Some('?')) {
            let next_upper = iter.peek().map(|(_, n)| n.is_uppercase()).unwrap_or(false);
            if next_upper && !ends_with_abbreviation(&text[start..i]) {
                sentences.push(&text[start..i]);
                start = i + 1;
            }
        }
        prev = Some(c);
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// `Mr.`-style titles and `e.g.`-style dotted abbreviations.
fn ends_with_abbreviation(sentence: &str) -> bool {
    let word = sentence.rsplit(' ').next().unwrap_or(sentence);
    let cs: Vec<char> = word.chars().collect();
    match cs.len() {
        3 => cs[0].is_uppercase() && cs[1].is_lowercase() && cs[2] == '.',
        4 => {
            cs[0].is_alphanumeric() && cs[1] == '.' && cs[2].is_alphanumeric() && cs[3] == '.'
        }
        _ => false,
    }
}

/// Break a unit longer than `max_chars` at word boundaries.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = sentence;

    while char_len(remaining) > max_chars {
        let limit = byte_index_of_char(remaining, max_chars);
        // Allow a split exactly at the window edge when a space follows it.
        let window = if remaining[limit..].starts_with(' ') {
            &remaining[..=limit]
        } else {
            &remaining[..limit]
        };
        match window.rfind(' ') {
            Some(pos) if pos > 0 => {
                pieces.push(&remaining[..pos]);
                remaining = &remaining[pos + 1..];
            }
            _ => {
                pieces.push(&remaining[..limit]);
                remaining = &remaining[limit..];
            }
        }
    }

    if !remaining.is_empty() {
        pieces.push(remaining);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th char, or `s.len()` if shorter.
fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stitch chunks back together by dropping the shared prefix of each
    /// window with the tail of the previous one.
    fn deoverlap(chunks: &[String]) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
                continue;
            }
            let prev = &chunks[i - 1];
            let mut shared = 0;
            for (pos, _) in chunk.match_indices(' ') {
                if prev.ends_with(&chunk[..pos]) {
                    shared = pos;
                }
            }
            if shared == 0 {
                out.push(' ');
                out.push_str(chunk);
            } else {
                out.push_str(&chunk[shared..]);
            }
        }
        out
    }

    fn numbered_sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join("  \n ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 800, 100);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 800, 100).is_empty());
        assert!(chunk_text("   \n\t ", 800, 100).is_empty());
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One thing. Two things! Three? four stays.");
        assert_eq!(s, vec!["One thing.", "Two things!", "Three? four stays."]);
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let s = split_sentences("Ask Mr. Smith about it. Use e.g. Python here.");
        assert_eq!(s, vec!["Ask Mr. Smith about it.", "Use e.g. Python here."]);
    }

    #[test]
    fn test_windows_respect_max_size() {
        let text = numbered_sentences(60);
        let chunks = chunk_text(&text, 120, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 120, "chunk too long: {}", c);
        }
    }

    #[test]
    fn test_deoverlap_reconstructs_normalized_text() {
        let text = numbered_sentences(40);
        let chunks = chunk_text(&text, 150, 60);
        assert!(chunks.len() > 2);
        assert_eq!(deoverlap(&chunks), normalize_whitespace(&text));
    }

    #[test]
    fn test_zero_overlap_reconstructs() {
        let text = numbered_sentences(25);
        let chunks = chunk_text(&text, 100, 0);
        assert_eq!(chunks.join(" "), normalize_whitespace(&text));
    }

    #[test]
    fn test_consecutive_windows_share_sentence() {
        let text = numbered_sentences(10);
        let chunks = chunk_text(&text, 100, 60);
        let first_tail = split_sentences(&chunks[0]).last().copied().unwrap();
        assert!(chunks[1].starts_with(first_tail));
    }

    #[test]
    fn test_long_sentence_is_hard_split() {
        let long = (0..100).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&long, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50);
        }
        assert_eq!(chunks.join(" "), long);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐ │ Hello world │ └──────────────────┘";
        let chunks = chunk_text(text, 7, 2);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 7);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_sentences(30);
        assert_eq!(chunk_text(&text, 90, 30), chunk_text(&text, 90, 30));
    }
}
