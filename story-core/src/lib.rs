//! Iterative long-form story generation.
//!
//! This crate provides:
//! - A generation loop that grows a story one short passage at a time
//! - Near-duplicate rejection using TF-IDF cosine similarity
//! - A bounded rolling summary re-derived after every accepted passage
//! - A final back-cover synopsis and main character description
//! - Crash-safe persistence of the whole story after every step
//!
//! # Quick Start
//!
//! ```ignore
//! use ollama::Ollama;
//! use story_core::{StoryConfig, StoryFile, StoryWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoryConfig::new("llama3")
//!         .with_persona("Stephen King")
//!         .with_total_iterations(20);
//!
//!     let store = StoryFile::new("storylines/story.json");
//!     let mut writer = StoryWriter::new(Ollama::from_env()?, config, store);
//!
//!     let outcome = writer.run("a beautiful girl...").await?;
//!     println!("{}", outcome.state.complete_synopsis.unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod generator;
pub mod persist;
pub mod phase;
pub mod prompts;
pub mod similarity;
pub mod summary;
pub mod synopsis;
pub mod testing;
pub mod writer;

// Primary public API
pub use config::{ConfigError, StoryConfig};
pub use generator::{GenerateError, TextGenerator};
pub use persist::{PersistError, StoryFile, StoryState};
pub use phase::{phase_of, Phase};
pub use similarity::similarity;
pub use summary::SummaryError;
pub use synopsis::{Synopsis, SynopsisError};
pub use testing::ScriptedGenerator;
pub use writer::{RunStats, StopReason, StoryError, StoryOutcome, StoryWriter};
