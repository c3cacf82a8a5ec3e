//! Answer composition over retrieval results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use docrag_core::context::{assemble, AssembledContext};
use docrag_core::error::{Error, Result};

use crate::retrieve::RetrievalPipeline;

pub const NO_CONTEXT_REPLY: &str = "Sorry, i don't have enough information to answer this question.";
pub const NO_CONTEXT_NOTE: &str = "(Note: No relevant documents were found, try rephrasing your question.)";
pub const CONTEXT_UNAVAILABLE_NOTE: &str =
    "(Note: This response was generated without document context as the retrieval service is unavailable.)";

/// Text completion by an LLM.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Answered from retrieved context.
    Grounded,
    /// Nothing cleared the similarity threshold; the model was not called.
    NoRelevantContext,
    /// Retrieval failed; answered without context.
    ContextUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
    pub mode: AnswerMode,
}

pub fn grounded_prompt(context: &str, question: &str) -> String {
    format!(
        "Instruction: Answer the question based on the context below.\n\
         If you don't know the answer based on the context, say \
         \"I don't have enough information to answer this question.\"\n\n\
         Context: {context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

pub fn bare_prompt(question: &str) -> String {
    format!("Question: {question}\n\nAnswer:")
}

pub struct Answerer {
    retrieval: Arc<RetrievalPipeline>,
    completer: Arc<dyn Completer>,
    top_k: usize,
    threshold: f32,
}

impl Answerer {
    pub fn new(retrieval: Arc<RetrievalPipeline>, completer: Arc<dyn Completer>, top_k: usize, threshold: f32) -> Self {
        Self { retrieval, completer, top_k, threshold }
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let results = match self.retrieval.search(question, self.top_k).await {
            Ok(results) => results,
            Err(Error::MissingQuery) => return Err(Error::MissingQuery),
            Err(e) => {
                warn!("Retrieval failed, answering without context: {}", e);
                let reply = self.completer.complete(&bare_prompt(question)).await?;
                return Ok(Answer {
                    answer: format!("{reply}\n\n{CONTEXT_UNAVAILABLE_NOTE}"),
                    sources: Vec::new(),
                    mode: AnswerMode::ContextUnavailable,
                });
            }
        };

        match assemble(&results, self.threshold) {
            AssembledContext::Relevant { context, sources } => {
                let mut reply = self.completer.complete(&grounded_prompt(&context, question)).await?;
                if !sources.is_empty() {
                    let lines: Vec<String> = sources.iter().map(|s| format!("- {s}")).collect();
                    reply.push_str("\n\nSources:\n");
                    reply.push_str(&lines.join("\n"));
                }
                Ok(Answer { answer: reply, sources, mode: AnswerMode::Grounded })
            }
            AssembledContext::NoRelevantContext => {
                info!("No result above {} for '{}'", self.threshold, question);
                Ok(Answer {
                    answer: format!("{NO_CONTEXT_REPLY}\n\n{NO_CONTEXT_NOTE}"),
                    sources: Vec::new(),
                    mode: AnswerMode::NoRelevantContext,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_prompt_layout() {
        let p = grounded_prompt("ctx", "why?");
        assert!(p.starts_with("Instruction: Answer the question based on the context below.\nIf you don't know"));
        assert!(p.contains("\n\nContext: ctx\n\nQuestion: why?\n\nAnswer:"));
        assert!(p.ends_with("Answer:"));
    }

    #[test]
    fn bare_prompt_layout() {
        assert_eq!(bare_prompt("hi"), "Question: hi\n\nAnswer:");
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(serde_json::to_value(AnswerMode::NoRelevantContext).unwrap(), "no_relevant_context");
    }
}
