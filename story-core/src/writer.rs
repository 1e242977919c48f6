//! StoryWriter - the generation loop.
//!
//! Each iteration reloads the story, asks the generator for the next
//! passage, and keeps it only if it is not a near-copy of a recent chapter.
//! Rejected candidates are retried with a different context window. When
//! the loop ends, for whatever reason, the synopsis and main character are
//! written to the story file.

use crate::config::{ConfigError, StoryConfig};
use crate::context::build_context;
use crate::generator::{generate_trimmed, TextGenerator};
use crate::persist::{PersistError, StoryFile, StoryState};
use crate::phase::phase_of;
use crate::prompts;
use crate::similarity::similarity;
use crate::summary::{self, clip};
use crate::synopsis::{self, SynopsisError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that prevent a run from being finalized.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// The loop ended but the synopsis could not be written. The chapters
    /// are on disk; `stop` and `stats` describe how the loop went.
    #[error("Failed to finalize story ({stop:?}): {source}")]
    Finalize {
        stop: StopReason,
        stats: RunStats,
        source: SynopsisError,
    },
}

impl StoryError {
    /// How the loop ended, if it got that far.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            StoryError::Finalize { stop, .. } => Some(stop),
            _ => None,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every iteration ran.
    Completed,

    /// Every context strategy produced a duplicate.
    ContextExhausted { iteration: usize },

    /// The generator failed or returned nothing.
    ServiceUnavailable { iteration: usize, reason: String },
}

impl StopReason {
    pub fn is_completed(&self) -> bool {
        matches!(self, StopReason::Completed)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Chapters appended.
    pub accepted: usize,
    /// Candidates rejected as near-copies.
    pub duplicates: usize,
    /// Iterations that ran out of retries without a chapter.
    pub abandoned: usize,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct StoryOutcome {
    /// Final persisted state, synopsis included.
    pub state: StoryState,
    pub stop: StopReason,
    pub stats: RunStats,
}

/// Verdict on a candidate passage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Novelty {
    /// No recent chapter scored above the threshold.
    Novel { max_score: f64 },
    /// `recent_index` counts back from the newest chapter, starting at 0.
    Duplicate { score: f64, recent_index: usize },
}

impl Novelty {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Novelty::Duplicate { .. })
    }
}

/// One try at producing the next chapter.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub retry: usize,
    pub context: String,
    pub candidate: String,
    pub novelty: Novelty,
}

/// Compare `candidate` against `recent` chapters, newest first.
///
/// Stops at the first chapter scoring strictly above `threshold`.
pub fn assess_novelty(candidate: &str, recent: &[String], threshold: f64) -> Novelty {
    let mut max_score: f64 = 0.0;
    for (recent_index, previous) in recent.iter().rev().enumerate() {
        let score = similarity(candidate, previous);
        debug!(recent_index, score, "Similarity against recent chapter");
        if score > threshold {
            return Novelty::Duplicate {
                score,
                recent_index,
            };
        }
        max_score = max_score.max(score);
    }
    Novelty::Novel { max_score }
}

enum Iteration {
    Accepted,
    Abandoned,
    Stopped(StopReason),
}

/// Drives a story run against a generator and a story file.
pub struct StoryWriter<G> {
    generator: G,
    config: StoryConfig,
    store: StoryFile,
    rng: StdRng,
}

impl<G: TextGenerator> StoryWriter<G> {
    pub fn new(generator: G, config: StoryConfig, store: StoryFile) -> Self {
        Self {
            generator,
            config,
            store,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed the chapter sampling used for the synopsis.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn store(&self) -> &StoryFile {
        &self.store
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Start a new story from `premise`, replacing any existing story file.
    pub async fn run(&mut self, premise: &str) -> Result<StoryOutcome, StoryError> {
        self.config.validate()?;
        if premise.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "premise",
                message: "must not be empty".to_string(),
            }
            .into());
        }

        let state = self.store.create(premise).await?;
        info!(
            path = %self.store.path().display(),
            model = %self.config.model,
            total = self.config.total_iterations,
            "Starting story"
        );
        debug!(summary = %state.summary, "Initial summary");

        self.drive(0).await
    }

    /// Continue the story already in the story file.
    ///
    /// Picks up at iteration `chapters.len() - 1`, the number of accepted
    /// chapters. A story that already has every chapter is only finalized
    /// again.
    ///
    /// The iteration index itself is not stored. If the earlier run abandoned
    /// any iterations, resuming starts that many iterations before where it
    /// stopped, so the run as a whole executes more than `total_iterations`
    /// iterations and the resumed ones are scheduled into earlier phases.
    pub async fn resume(&mut self) -> Result<StoryOutcome, StoryError> {
        self.config.validate()?;

        let state = self.store.load().await?;
        let start = state.accepted();
        info!(
            path = %self.store.path().display(),
            accepted = start,
            total = self.config.total_iterations,
            "Resuming story"
        );

        self.drive(start).await
    }

    async fn drive(&mut self, start: usize) -> Result<StoryOutcome, StoryError> {
        let total = self.config.total_iterations;
        let mut stats = RunStats::default();
        let mut stop = StopReason::Completed;

        for iteration in start..total {
            match self.iterate(iteration, &mut stats).await? {
                Iteration::Accepted => stats.accepted += 1,
                Iteration::Abandoned => {
                    stats.abandoned += 1;
                    warn!(iteration = iteration + 1, "Retries exhausted, skipping iteration");
                }
                Iteration::Stopped(reason) => {
                    warn!(reason = ?reason, "Stopping early");
                    stop = reason;
                    break;
                }
            }
        }

        let state = self.finalize(&stop, stats).await?;
        info!(
            chapters = state.chapters.len(),
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            abandoned = stats.abandoned,
            completed = stop.is_completed(),
            "Story finished"
        );

        Ok(StoryOutcome { state, stop, stats })
    }

    async fn iterate(
        &mut self,
        iteration: usize,
        stats: &mut RunStats,
    ) -> Result<Iteration, StoryError> {
        let state = self.store.load().await?;
        let total = self.config.total_iterations;
        let phase = phase_of(iteration, total);

        info!(
            iteration = iteration + 1,
            total,
            phase = %phase,
            progress = %format!("{:.2}%", (iteration + 1) as f64 / total as f64 * 100.0),
            "Writing chapter"
        );

        let mut retry = 0;
        while retry <= self.config.max_retries {
            let Some(context) = build_context(&state.chapters, state.premise(), retry) else {
                warn!(iteration = iteration + 1, retry, "Exhausted all context strategies");
                return Ok(Iteration::Stopped(StopReason::ContextExhausted { iteration }));
            };

            let prompt = prompts::continuation(&self.config.persona, &context, &state.summary, phase);
            debug!(retry, prompt = %prompt, "Requesting chapter");

            let candidate =
                match generate_trimmed(&self.generator, &self.config.model, &prompt).await {
                    Ok(text) => clip(&text, self.config.max_chapter_chars),
                    Err(e) => {
                        return Ok(Iteration::Stopped(StopReason::ServiceUnavailable {
                            iteration,
                            reason: e.to_string(),
                        }))
                    }
                };

            let novelty = assess_novelty(
                &candidate,
                state.recent(self.config.novelty_window),
                self.config.novelty_threshold,
            );
            let attempt = Attempt {
                retry,
                context,
                candidate,
                novelty,
            };

            if let Novelty::Duplicate { score, recent_index } = attempt.novelty {
                stats.duplicates += 1;
                warn!(retry = attempt.retry, score, recent_index, "Duplicate chapter, retrying");
                retry += 1;
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }

            debug!(retry = attempt.retry, context = %attempt.context, chapter = %attempt.candidate, "Chapter accepted");
            return self.accept(state, attempt.candidate, iteration).await;
        }

        Ok(Iteration::Abandoned)
    }

    async fn accept(
        &mut self,
        mut state: StoryState,
        chapter: String,
        iteration: usize,
    ) -> Result<Iteration, StoryError> {
        let revised =
            match summary::enhance(&self.generator, &self.config.model, &state.summary, &chapter)
                .await
            {
                Ok(revised) => revised,
                Err(e) => {
                    return Ok(Iteration::Stopped(StopReason::ServiceUnavailable {
                        iteration,
                        reason: e.to_string(),
                    }))
                }
            };

        let drift = similarity(&state.summary, &revised);
        let unchanged = drift > self.config.summary_drift_threshold;
        info!(
            drift = %format!("{drift:.4}"),
            threshold = self.config.summary_drift_threshold,
            unchanged,
            "Summary updated"
        );
        debug!(summary = %revised, "Current summary");

        state.chapters.push(chapter);
        state.summary = revised;
        self.store.save(&state).await?;

        Ok(Iteration::Accepted)
    }

    async fn finalize(
        &mut self,
        stop: &StopReason,
        stats: RunStats,
    ) -> Result<StoryState, StoryError> {
        let mut state = self.store.load().await?;

        let result = synopsis::build(
            &self.generator,
            &self.config.model,
            &state.chapters,
            &state.summary,
            &mut self.rng,
        )
        .await
        .map_err(|source| StoryError::Finalize {
            stop: stop.clone(),
            stats,
            source,
        })?;
        debug!(synopsis = %result.synopsis, main_character = %result.main_character, "Synopsis written");

        state.complete_synopsis = Some(result.synopsis);
        state.main_character = Some(result.main_character);
        self.store.save(&state).await?;

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_novel_candidate() {
        let recent = chapters(&[
            "The fog rolled over the harbor at dawn.",
            "A bell rang somewhere inside the church.",
        ]);
        let verdict = assess_novelty("Her brother never came back from the mine.", &recent, 0.8);
        assert!(!verdict.is_duplicate());
    }

    #[test]
    fn test_exact_copy_is_duplicate() {
        let recent = chapters(&["older chapter text", "The fog rolled over the harbor at dawn."]);
        let verdict = assess_novelty("The fog rolled over the harbor at dawn.", &recent, 0.8);
        assert!(matches!(verdict, Novelty::Duplicate { recent_index: 0, .. }));
    }

    #[test]
    fn test_older_copy_reports_index() {
        let recent = chapters(&["The fog rolled over the harbor at dawn.", "Something else entirely now."]);
        let verdict = assess_novelty("The fog rolled over the harbor at dawn.", &recent, 0.8);
        assert!(matches!(verdict, Novelty::Duplicate { recent_index: 1, .. }));
    }

    #[test]
    fn test_threshold_is_strict() {
        let recent = chapters(&["same words"]);
        assert!(!assess_novelty("same words", &recent, 1.0).is_duplicate());
    }

    #[test]
    fn test_no_history_is_novel() {
        assert_eq!(assess_novelty("anything", &[], 0.8), Novelty::Novel { max_score: 0.0 });
    }

    #[test]
    fn test_stop_reason() {
        assert!(StopReason::Completed.is_completed());
        assert!(!StopReason::ContextExhausted { iteration: 0 }.is_completed());
    }
}
