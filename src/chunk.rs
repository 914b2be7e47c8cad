//! Paragraph-boundary text splitter.
//!
//! Splits extracted document text into fragments that respect a
//! `max_tokens` limit. Splitting happens on paragraph boundaries (`\n\n`)
//! first; a paragraph longer than the limit is cut at the last newline or
//! space before the limit.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into non-blank fragments of at most `max_tokens * 4`
/// characters. A paragraph over the limit is cut at the last newline or
/// space that fits, or mid-word when there is none. Blank input yields no
/// fragments.
pub fn split_fragments(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        let would_be = if current.is_empty() {
            para_chars
        } else {
            current_chars + 2 + para_chars
        };

        if would_be > max_chars && !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if para_chars > max_chars {
            hard_split(trimmed, max_chars, &mut fragments);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
                current_chars += 2;
            }
            current.push_str(trimmed);
            current_chars += para_chars;
        }
    }

    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        // Byte offset just past the first `max_chars` characters.
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}
