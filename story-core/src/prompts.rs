//! Prompt templates.

use crate::phase::Phase;

/// Appended to every continuation prompt.
pub const CONSTRAINT_REMINDER: &str =
    "Remember, the response should be only 2 or 3 sentences with a maximum of 100 words in total.";

/// Ask for the next passage of the story.
pub fn continuation(persona: &str, context: &str, summary: &str, phase: Phase) -> String {
    format!(
        "We are writing a story together in the style of {persona}. \
         Continue the following story creatively, making bold assumptions about what could happen next. \
         Address core issues of the storyline and transition smoothly to the next scene. \
         Maintain an imaginative style fitting {persona}'s narrative while keeping responses to \
         2 or 3 sentences and a maximum of 100 words. \
         Each response should imply {ending}. The current story is: {context}. \
         Here is a summary of the story so far: {summary}. \
         {instructions} {CONSTRAINT_REMINDER}",
        ending = phase.ending_hint(),
        instructions = phase.instructions(),
    )
}

/// Ask for the rolling summary to absorb a new chapter.
pub fn summary_update(current_summary: &str, latest_addition: &str) -> String {
    format!(
        "Here is the current summary of the story: \"{current_summary}\". \
         The latest addition to the story is: \"{latest_addition}\". \
         Can you enhance the overall summary with it without changing and limiting the overall summary to 4-5 sentences \
         and 750 characters? Ensure the summary encourages someone to read more. If the new addition adds no value, \
         don't change it. Only return the revised summary in your response, nothing else."
    )
}

/// Ask for a back-cover synopsis from sampled chapters and the final summary.
pub fn synopsis(excerpt: &str, summary: &str) -> String {
    format!(
        "Please read the following lines from the story: \"{excerpt}\" and the following summary: \"{summary}\". \
         Using these, create a captivating synopsis that reads like the cover of a book, enticing someone to read the entire story. \
         Keep the synopsis limited to 6-7 sentences and less than 900 characters. Return only the synopsis, nothing else."
    )
}

/// Ask for a description of the protagonist, given only the synopsis.
pub fn main_character(synopsis: &str) -> String {
    format!(
        "Create and describe in detail the main character 250 characters or less, \
         reply with ONLY the description. Here is a complete synopsis: {synopsis}."
    )
}
