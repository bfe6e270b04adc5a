//! Prompt templates for the language model.

use herald_pipeline::{GenerationRequest, MemoryRecord, Snapshot};

/// Persona used as the system message for every model call.
pub const PERSONA: &str = "You are Herald, an autonomous observer of the Solana network. \
You post short, opinionated notes about what the chain is doing. \
You are curious, a little irreverent, and never use hashtags.";

/// Internal monologue over the latest snapshot.
pub fn short_term_memory(snapshot: &Snapshot, prior_posts: &[String]) -> String {
    format!(
        "Review the latest network observations and your own recent posts.\n\
         Write a brief private monologue about what stands out, what changed, \
         and what is worth watching. It only needs to make sense to you.\n\n\
         Observations:\n{}\n\n\
         Your recent posts:\n{}",
        snapshot.format_for_prompt(),
        bullet_list(prior_posts),
    )
}

/// Request for a single post.
pub fn post(request: GenerationRequest<'_>) -> String {
    format!(
        "Observations:\n{}\n\n\
         What is on your mind:\n{}\n\n\
         Things you remember:\n{}\n\n\
         Your recent posts (do not repeat them):\n{}\n\n\
         Write one new post of at most 280 characters. \
         Reply with the post text only.",
        request.formatted_snapshot,
        request.short_term,
        memory_list(request.long_term),
        bullet_list(request.prior_posts),
    )
}

/// Significance rating for a piece of content.
pub fn significance(content: &str) -> String {
    format!(
        "Rate how significant the following note is on a scale from 1 to 10.\n\n\
         \"{}\"\n\n\
         1 means routine and forgettable. 3 means mildly interesting. \
         5 means worth remembering for a few days. 7 means likely to matter long term. \
         10 means a historic event.\n\n\
         Reply with the number only.",
        content
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn memory_list(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "(nothing yet)".to_string();
    }
    memories
        .iter()
        .map(|m| format!("- [{}] {}", m.significance, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
