//! Story persistence.
//!
//! A run keeps its whole state in one pretty-printed JSON document. The
//! document is re-read at the start of every iteration and replaced after
//! every accepted chapter, so an interrupted run can be inspected or resumed.

use crate::summary::initial_summary;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed story file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Story file {0} has no chapters")]
    EmptyStory(PathBuf),
}

/// Everything a run has produced so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryState {
    /// Accepted passages in order. The first is the premise.
    #[serde(rename = "story_chapters")]
    pub chapters: Vec<String>,

    /// Rolling summary of the chapters.
    #[serde(rename = "story_summary")]
    pub summary: String,

    /// Back-cover synopsis, written when the run finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_synopsis: Option<String>,

    /// Description of the protagonist, written when the run finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_character: Option<String>,
}

impl StoryState {
    /// A fresh story holding only the premise.
    pub fn seeded(premise: impl Into<String>) -> Self {
        let chapters = vec![premise.into()];
        let summary = initial_summary(&chapters);
        Self {
            chapters,
            summary,
            complete_synopsis: None,
            main_character: None,
        }
    }

    /// The premise the story was seeded with.
    pub fn premise(&self) -> &str {
        self.chapters.first().map(String::as_str).unwrap_or_default()
    }

    /// Chapters accepted after the premise.
    pub fn accepted(&self) -> usize {
        self.chapters.len().saturating_sub(1)
    }

    /// Up to `n` most recent chapters, oldest first.
    pub fn recent(&self, n: usize) -> &[String] {
        &self.chapters[self.chapters.len().saturating_sub(n)..]
    }

    pub fn is_finalized(&self) -> bool {
        self.complete_synopsis.is_some() && self.main_character.is_some()
    }

    /// Serialize to pretty JSON. Non-ASCII text is written as is.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a story document, rejecting documents without chapters.
    pub fn from_json(content: &str, path: &Path) -> Result<Self, PersistError> {
        let state: Self = serde_json::from_str(content).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => PersistError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            _ => PersistError::Json(e),
        })?;

        if state.chapters.is_empty() {
            return Err(PersistError::EmptyStory(path.to_path_buf()));
        }
        Ok(state)
    }
}

/// Location of a run's story document.
#[derive(Debug, Clone)]
pub struct StoryFile {
    path: PathBuf,
}

impl StoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read and validate the story document.
    pub async fn load(&self) -> Result<StoryState, PersistError> {
        let content = fs::read_to_string(&self.path).await?;
        StoryState::from_json(&content, &self.path)
    }

    /// Replace the story document.
    ///
    /// The new content goes to a temporary file in the same directory which
    /// is then renamed over the old one, so readers see either the previous
    /// document or the new one and never a partial write.
    pub async fn save(&self, state: &StoryState) -> Result<(), PersistError> {
        let content = state.to_json()?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, content.as_bytes()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        Ok(())
    }

    /// Write a freshly seeded story and return it.
    pub async fn create(&self, premise: &str) -> Result<StoryState, PersistError> {
        let state = StoryState::seeded(premise);
        self.save(&state).await?;
        Ok(state)
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    replace_with(path, |file| file.write_all(content))
}

/// Fill a temporary file next to `path` with `fill`, then rename it over
/// `path`. On any error the temporary file is removed and `path` is untouched.
fn replace_with(
    path: &Path,
    fill: impl FnOnce(&mut std::fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
