//! Rolling summary maintenance.
//!
//! The summary is a bounded digest of the whole story. It starts as the
//! first few sentences of the seed text and is then re-derived by the
//! generator each time a chapter is accepted. Whatever comes back is held to
//! [`SUMMARY_LIMIT`] characters and always ends with [`ELLIPSIS`].

use crate::generator::{GenerateError, TextGenerator};
use crate::prompts;
use thiserror::Error;
use tracing::debug;

/// Hard ceiling on summary length, in characters.
pub const SUMMARY_LIMIT: usize = 750;

/// Marker every summary ends with.
pub const ELLIPSIS: &str = "...";

/// Sentences of seed text used for the initial summary.
const INITIAL_SENTENCES: usize = 3;

/// Abbreviations whose period is kept in front of the ellipsis.
const ABBREVIATIONS: &[&str] = &["Dr.", "Mr.", "Ms.", "Mrs.", "Jr.", "Sr.", "St.", "etc."];

/// Errors from summary maintenance.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summary generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Generator returned an empty summary")]
    EmptyResponse,
}

/// Shorten `text` to at most `limit` characters.
///
/// Text over the limit keeps its first `limit - 3` characters followed by
/// `"..."`. Counts characters, not bytes.
pub fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(ELLIPSIS);
    clipped
}

/// Replace whatever run of periods ends `text` with exactly `"..."`.
///
/// Text ending in one of the known abbreviations keeps that abbreviation's
/// period, so `"Dr."` becomes `"Dr...."`. Applying this twice gives the same
/// result as applying it once.
pub fn normalize_ending(text: &str) -> String {
    let stem = text.trim_end_matches('.');
    let dots = text.len() - stem.len();

    let keeps_period = match dots {
        3 => return text.to_string(),
        1 => ends_with_abbreviation(text),
        n if n >= 4 => ends_with_abbreviation(&text[..stem.len() + 1]),
        _ => false,
    };

    if keeps_period {
        format!("{stem}.{ELLIPSIS}")
    } else {
        format!("{stem}{ELLIPSIS}")
    }
}

fn ends_with_abbreviation(text: &str) -> bool {
    ABBREVIATIONS.iter().any(|abbr| text.ends_with(abbr))
}

/// Trim, normalize and bound `text` to a valid summary.
///
/// The result is at most [`SUMMARY_LIMIT`] characters and ends with `"..."`.
pub fn fit_summary(text: &str) -> String {
    let normalized = normalize_ending(text.trim());
    if normalized.chars().count() <= SUMMARY_LIMIT {
        return normalized;
    }
    normalize_ending(&clip(&normalized, SUMMARY_LIMIT))
}

/// Summary derived from the first sentences of the seed chapters.
pub fn initial_summary(chapters: &[String]) -> String {
    let full_text = chapters.join(" ");
    let opening = full_text
        .split(". ")
        .take(INITIAL_SENTENCES)
        .collect::<Vec<_>>()
        .join(". ");

    let mut summary = opening.trim().to_string();
    if !summary.ends_with('.') {
        summary.push('.');
    }
    fit_summary(&summary)
}

/// Ask the generator to fold `new_chapter` into `current_summary`.
pub async fn enhance<G: TextGenerator + ?Sized>(
    generator: &G,
    model: &str,
    current_summary: &str,
    new_chapter: &str,
) -> Result<String, SummaryError> {
    let prompt = prompts::summary_update(current_summary, new_chapter);
    let response = generator.generate(model, &prompt).await?;

    let revised = response.trim();
    if revised.is_empty() {
        return Err(SummaryError::EmptyResponse);
    }

    let fitted = fit_summary(revised);
    debug!(
        raw_chars = revised.chars().count(),
        fitted_chars = fitted.chars().count(),
        "Summary revised"
    );
    Ok(fitted)
}
