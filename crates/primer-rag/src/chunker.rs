//! Paragraph-aware chunking: merge paragraphs into bounded passages with
//! a trailing overlap carried between consecutive passages.

/// Chunker configuration. All lengths are in characters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Minimum passage length; shorter windows are not emitted except to
    /// guarantee progress on tiny documents (default: 800).
    pub min_chars: usize,
    /// Maximum passage length before the window closes (default: 1200).
    pub max_chars: usize,
    /// Overlap carried from one passage into the next (default: 150).
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chars: 800,
            max_chars: 1200,
            overlap_chars: 150,
        }
    }
}

/// Split document text into ordered passages. Deterministic and pure;
/// passages never span the document boundary.
#[must_use]
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let paragraphs = split_paragraphs(text);
    if paragraphs.is_empty() {
        return vec![text.trim().to_owned()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    // Trailing paragraphs within overlap_chars, seeded into the next window.
    let mut overlap: Vec<&str> = Vec::new();
    let mut overlap_len = 0usize;

    for paragraph in paragraphs {
        // +2 accounts for the "\n\n" joiner.
        let p_len = paragraph.chars().count() + 2;

        if current_len + p_len <= config.max_chars {
            current.push(paragraph);
            current_len += p_len;
            overlap.push(paragraph);
            overlap_len += p_len;
            while overlap_len > config.overlap_chars && overlap.len() > 1 {
                let removed = overlap.remove(0);
                overlap_len -= removed.chars().count() + 2;
            }
        } else if current.is_empty() {
            // Single paragraph longer than max: no boundary to respect.
            hard_slice(paragraph, config, &mut chunks);
            overlap.clear();
            overlap_len = 0;
        } else {
            let joined = current.join("\n\n");
            if joined.chars().count() >= config.min_chars || chunks.is_empty() {
                chunks.push(joined);
            }
            // The overflowing paragraph is not re-queued; the next window
            // starts from the overlap alone.
            current = overlap.clone();
            current_len = overlap_len;
        }
    }

    if !current.is_empty() {
        let joined = current.join("\n\n");
        if !joined.is_empty() && (joined.chars().count() >= config.min_chars || chunks.is_empty()) {
            chunks.push(joined);
        }
    }

    chunks
}

/// Slice an oversized paragraph into max-sized pieces with overlap-sized
/// back-steps between them.
fn hard_slice(paragraph: &str, config: &ChunkerConfig, chunks: &mut Vec<String>) {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut start = 0usize;
    while start < chars.len() {
        let end = usize::min(start + config.max_chars, chars.len());
        if end - start >= config.min_chars || chunks.is_empty() {
            chunks.push(chars[start..end].iter().collect());
        }
        start = if end < chars.len() {
            end - config.overlap_chars
        } else {
            chars.len()
        };
    }
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if !paragraphs.is_empty() {
        return paragraphs;
    }
    // No blank-line boundaries: fall back to single lines.
    text.split('\n')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
