//! Write a story against a local Ollama server.
//!
//! Settings come from the TOML file named by `STORY_CONFIG` (if set), then
//! `STORY_*` environment variables. The story is written to `STORY_OUTPUT`
//! (default `storylines/story.json`); set `STORY_RESUME=1` to continue it
//! instead of starting over.
//!
//! Run with: `RUST_LOG=story_core=debug cargo run -p story-core --example write_story`

use ollama::Ollama;
use story_core::{StopReason, StoryConfig, StoryFile, StoryWriter};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Result<StoryConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("STORY_CONFIG") {
        Ok(path) => StoryConfig::from_toml_file(path)?,
        Err(_) => StoryConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = load_config()?;
    let output = std::env::var("STORY_OUTPUT").unwrap_or_else(|_| "storylines/story.json".into());
    let resume = std::env::var("STORY_RESUME").is_ok_and(|v| v == "1");

    let client = Ollama::from_env()?.with_model(&config.model);
    let premise = config.premise.clone();
    let mut writer = StoryWriter::new(client, config, StoryFile::new(&output));

    let outcome = if resume {
        writer.resume().await?
    } else {
        writer.run(&premise).await?
    };

    match &outcome.stop {
        StopReason::Completed => println!("Story complete."),
        StopReason::ContextExhausted { iteration } => {
            println!("Stopped at iteration {}: no fresh continuation found.", iteration + 1)
        }
        StopReason::ServiceUnavailable { iteration, reason } => {
            println!("Stopped at iteration {}: {reason}", iteration + 1)
        }
    }

    println!(
        "{} chapters ({} accepted, {} duplicates rejected, {} iterations skipped)",
        outcome.state.chapters.len(),
        outcome.stats.accepted,
        outcome.stats.duplicates,
        outcome.stats.abandoned,
    );
    if let Some(synopsis) = &outcome.state.complete_synopsis {
        println!("\nSynopsis:\n{synopsis}");
    }
    if let Some(character) = &outcome.state.main_character {
        println!("\nMain character:\n{character}");
    }
    println!("\nSaved to {output}");

    Ok(())
}
