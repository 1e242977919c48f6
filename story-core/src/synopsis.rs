//! Final synopsis and main character extraction.
//!
//! Runs once per story. A sample of chapters plus the final summary is
//! turned into a back-cover synopsis, and the synopsis alone is then used to
//! describe the protagonist.

use crate::generator::{generate_trimmed, GenerateError, TextGenerator};
use crate::prompts;
use crate::summary::clip;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Longest synopsis kept, in characters.
pub const SYNOPSIS_LIMIT: usize = 900;

/// Longest character description kept, in characters.
pub const CHARACTER_LIMIT: usize = 250;

/// Stories shorter than this are sampled whole.
const SAMPLE_THRESHOLD: usize = 8;

/// Chapters always taken from each end of a longer story.
const EDGE_CHAPTERS: usize = 3;

/// Chapters drawn at random from between the edges.
const INTERIOR_PICKS: usize = 2;

#[derive(Debug, Error)]
pub enum SynopsisError {
    #[error("Synopsis generation failed: {0}")]
    Synopsis(#[source] GenerateError),

    #[error("Main character generation failed: {0}")]
    Character(#[source] GenerateError),
}

/// Output of the synopsis builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synopsis {
    pub synopsis: String,
    pub main_character: String,
}

/// Chapters shown to the generator when writing the synopsis.
///
/// Short stories are returned whole. Otherwise: the first three chapters,
/// the last three, then two distinct chapters picked at random from the
/// rest.
pub fn select_excerpt<'a, R: Rng + ?Sized>(chapters: &'a [String], rng: &mut R) -> Vec<&'a str> {
    if chapters.len() < SAMPLE_THRESHOLD {
        return chapters.iter().map(String::as_str).collect();
    }

    let len = chapters.len();
    let interior = len - 2 * EDGE_CHAPTERS;

    let mut excerpt: Vec<&str> = Vec::with_capacity(2 * EDGE_CHAPTERS + INTERIOR_PICKS);
    excerpt.extend(chapters[..EDGE_CHAPTERS].iter().map(String::as_str));
    excerpt.extend(chapters[len - EDGE_CHAPTERS..].iter().map(String::as_str));
    excerpt.extend(
        rand::seq::index::sample(rng, interior, INTERIOR_PICKS)
            .into_iter()
            .map(|i| chapters[EDGE_CHAPTERS + i].as_str()),
    );
    excerpt
}

/// Write the synopsis, then the main character description.
pub async fn build<G, R>(
    generator: &G,
    model: &str,
    chapters: &[String],
    summary: &str,
    rng: &mut R,
) -> Result<Synopsis, SynopsisError>
where
    G: TextGenerator + ?Sized,
    R: Rng + ?Sized,
{
    let excerpt = select_excerpt(chapters, rng).join(" ");
    debug!(excerpt = %excerpt, "Selected chapters for synopsis");

    let prompt = prompts::synopsis(&excerpt, summary);
    let synopsis = generate_trimmed(generator, model, &prompt)
        .await
        .map_err(SynopsisError::Synopsis)?;
    let synopsis = clip(&synopsis, SYNOPSIS_LIMIT);

    let prompt = prompts::main_character(&synopsis);
    let main_character = generate_trimmed(generator, model, &prompt)
        .await
        .map_err(SynopsisError::Character)?;
    let main_character = clip(&main_character, CHARACTER_LIMIT);

    Ok(Synopsis {
        synopsis,
        main_character,
    })
}
