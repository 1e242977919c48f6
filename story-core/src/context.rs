//! Conditioning text for the next passage.
//!
//! Each rejected attempt moves one rung down a fixed ladder of context
//! windows. Changing what the model sees is the only lever the loop has for
//! steering it away from a repetitive continuation.

/// Number of context strategies before the ladder runs out.
pub const LADDER_LEN: usize = 4;

/// Text to present to the generator on attempt `retry_count` (0-based),
/// or `None` when every strategy has been tried.
///
/// | retry | window                      |
/// |-------|-----------------------------|
/// | 0     | premise + last 2 chapters   |
/// | 1     | premise + last 3 chapters   |
/// | 2     | last chapter                |
/// | 3     | premise + last chapter      |
pub fn build_context(chapters: &[String], premise: &str, retry_count: usize) -> Option<String> {
    let parts: Vec<&str> = match retry_count {
        0 => with_premise(premise, last_n(chapters, 2)),
        1 => with_premise(premise, last_n(chapters, 3)),
        2 => last_n(chapters, 1).iter().map(String::as_str).collect(),
        3 => with_premise(premise, last_n(chapters, 1)),
        _ => return None,
    };

    Some(parts.join(" "))
}

fn last_n(chapters: &[String], n: usize) -> &[String] {
    &chapters[chapters.len().saturating_sub(n)..]
}

fn with_premise<'a>(premise: &'a str, tail: &'a [String]) -> Vec<&'a str> {
    std::iter::once(premise)
        .chain(tail.iter().map(String::as_str))
        .collect()
}
