//! Context budgeting and prompt assembly

use super::RagChunk;

/// Rough characters-per-token ratio used for every budget calculation
pub const CHARS_PER_TOKEN: usize = 3;

/// Tokens kept free for the question and instructions
pub const PROMPT_RESERVE_TOKENS: usize = 200;

const CHUNK_SEPARATOR: &str = "\n\n";

/// Characters of retrieved context that fit next to the prompt
pub fn context_budget_chars(context_window: usize) -> usize {
    context_window.saturating_sub(PROMPT_RESERVE_TOKENS) * CHARS_PER_TOKEN
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Cuts `context` to the budget of `context_window`
pub fn truncate_context(context: &str, context_window: usize) -> String {
    let budget = context_budget_chars(context_window);
    match context.char_indices().nth(budget) {
        Some((byte_index, _)) => context[..byte_index].to_string(),
        None => context.to_string(),
    }
}

/// Joins chunks in rank order until the next one would overflow the budget
///
/// Chunks are never split.
pub fn assemble_context(chunks: &[RagChunk], context_window: usize) -> String {
    let budget = context_budget_chars(context_window);
    let separator_len = CHUNK_SEPARATOR.chars().count();

    let mut context = String::new();
    let mut used = 0;
    for chunk in chunks {
        let added = chunk.content.chars().count() + if used == 0 { 0 } else { separator_len };
        if used + added > budget {
            break;
        }
        if used > 0 {
            context.push_str(CHUNK_SEPARATOR);
        }
        context.push_str(&chunk.content);
        used += added;
    }
    context
}

/// Fixed grounding instruction around `context` and `question`
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question based ONLY on the following context. \
         If the context does not contain the answer, say that you don't know.\n\n\
         Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

/// Fills a server-provided template
///
/// `{context}` is replaced; `{question}` is replaced when present and the
/// question is appended otherwise.
pub fn apply_template(template: &str, context: &str, question: &str) -> String {
    let filled = template.replace("{context}", context);
    if filled.contains("{question}") {
        filled.replace("{question}", question)
    } else {
        format!("{}\n\nQuestion: {}\n\nAnswer:", filled, question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn chunk(content: &str) -> RagChunk {
        RagChunk {
            id: "c".to_string(),
            document_id: None,
            source: "doc".to_string(),
            content: content.to_string(),
            similarity: 1.0,
            metadata: serde_json::Value::Null,
        }
    }

    #[parameterized(
        window_1024 = { 1024, 2472 },
        window_2048 = { 2048, 5544 },
        window_200 = { 200, 0 },
        window_100 = { 100, 0 },
    )]
    fn test_budget(window: usize, expected: usize) {
        assert_eq!(context_budget_chars(window), expected);
    }

    #[test]
    fn test_truncate_long_context() {
        let context = "a".repeat(10_000);
        let truncated = truncate_context(&context, 1024);
        assert_eq!(truncated.chars().count(), (1024 - 200) * 3);
    }

    #[test]
    fn test_truncate_keeps_short_context() {
        assert_eq!(truncate_context("short", 1024), "short");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let context = "é".repeat(5000);
        let truncated = truncate_context(&context, 1024);
        assert_eq!(truncated.chars().count(), 2472);
    }

    #[test]
    fn test_assemble_never_splits_chunks() {
        let chunks = vec![chunk(&"a".repeat(1000)), chunk(&"b".repeat(1000)), chunk(&"c".repeat(1000))];
        let context = assemble_context(&chunks, 1024);

        assert_eq!(context, format!("{}\n\n{}", "a".repeat(1000), "b".repeat(1000)));
        assert!(estimate_tokens(&context) <= 1024 - 200);
    }

    #[test]
    fn test_assemble_stops_at_first_overflow() {
        let chunks = vec![chunk(&"a".repeat(3000)), chunk("small")];
        assert_eq!(assemble_context(&chunks, 1024), "");
    }

    #[test]
    fn test_assembled_context_within_budget_for_many_windows() {
        let chunks: Vec<RagChunk> = (0..50).map(|i| chunk(&"w".repeat(100 + i * 37))).collect();
        for window in [256, 512, 1024, 2048, 4096] {
            let context = assemble_context(&chunks, window);
            assert!(context.chars().count() / CHARS_PER_TOKEN <= window - PROMPT_RESERVE_TOKENS);
        }
    }

    #[test]
    fn test_prompt_contains_grounding_instruction() {
        let prompt = build_prompt("ctx", "why?");
        assert!(prompt.contains("based ONLY on the following context"));
        assert!(prompt.contains("Context:\nctx"));
        assert!(prompt.contains("Question: why?"));
    }

    #[test]
    fn test_apply_template() {
        assert_eq!(
            apply_template("C: {context} Q: {question}", "x", "y"),
            "C: x Q: y"
        );
        assert!(apply_template("Use {context}", "x", "y").ends_with("Question: y\n\nAnswer:"));
    }
}
