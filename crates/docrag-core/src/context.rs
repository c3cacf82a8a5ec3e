//! Similarity-filtered context assembly for LLM prompts.

use std::collections::HashSet;

use crate::types::ScoredChunk;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.25;

/// Output of [`assemble`]. An empty survivor set is reported explicitly so
/// callers never prompt a model with an empty context block.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledContext {
    Relevant {
        /// Surviving chunk texts in rank order, separated by a blank line.
        context: String,
        /// Distinct filenames in first-occurrence order.
        sources: Vec<String>,
    },
    NoRelevantContext,
}

impl AssembledContext {
    pub fn is_relevant(&self) -> bool {
        matches!(self, AssembledContext::Relevant { .. })
    }
}

/// Keep results scoring at least `threshold`, join their texts and collect
/// their source filenames.
pub fn assemble(results: &[ScoredChunk], threshold: f32) -> AssembledContext {
    let mut parts: Vec<&str> = Vec::new();
    let mut sources = Vec::new();
    let mut seen = HashSet::new();

    // NaN scores fail the comparison and are dropped.
    for result in results.iter().filter(|r| r.similarity_score >= threshold) {
        if !result.text.is_empty() {
            parts.push(&result.text);
        }
        if !result.filename.is_empty() && seen.insert(result.filename.as_str()) {
            sources.push(result.filename.clone());
        }
    }

    if parts.is_empty() {
        return AssembledContext::NoRelevantContext;
    }
    AssembledContext::Relevant { context: parts.join("\n\n"), sources }
}
