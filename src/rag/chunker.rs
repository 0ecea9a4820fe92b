//! Sentence-aware text chunking

/// Chunks shorter than this are dropped as noise
pub const MIN_CHUNK_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window size in characters
    pub size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    pub const fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    /// Smaller context windows get smaller chunks
    pub fn for_context_window(context_window: usize) -> Self {
        match context_window {
            0..=1024 => Self::new(256, 64),
            1025..=2048 => Self::new(512, 128),
            _ => Self::new(1024, 256),
        }
    }
}

/// A slice of the source text, with character offsets into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

fn is_break(chars: &[char], i: usize) -> bool {
    match chars[i] {
        '\n' => true,
        '.' | '!' | '?' => chars.get(i + 1).map_or(true, |next| next.is_whitespace()),
        _ => false,
    }
}

/// Splits `text` into overlapping windows of `params.size` characters
///
/// A window that would end mid-sentence is cut after the last sentence or
/// line break in its second half instead. The next window starts `overlap`
/// characters before the previous cut, so consecutive chunks never leave a
/// gap. Pieces under [`MIN_CHUNK_CHARS`] are dropped unless the whole text is
/// that short.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = params.size.max(1);
    let overlap = params.overlap.min(size - 1);

    if text.trim().is_empty() {
        return Vec::new();
    }
    if len < MIN_CHUNK_CHARS {
        return vec![TextChunk {
            content: text.trim().to_string(),
            start: 0,
            end: len,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + size).min(len);

        if end < len && !is_break(&chars, end - 1) {
            let half = start + size / 2;
            if let Some(cut) = (half..end).rev().find(|&i| is_break(&chars, i)) {
                end = cut + 1;
            }
        }

        let content: String = chars[start..end].iter().collect::<String>().trim().to_string();
        if content.chars().count() >= MIN_CHUNK_CHARS {
            chunks.push(TextChunk {
                content,
                start,
                end,
            });
        }

        if end >= len {
            break;
        }
        start = match end.checked_sub(overlap) {
            Some(next) if next > start => next,
            _ => end,
        };
    }

    chunks
}
