//! docrag-answer
//!
//! Turns retrieved chunks into an answer with numbered references. Generators
//! are tried in order; the extractive generator always answers last.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use docrag_core::error::Result;
use docrag_core::traits::VectorIndexer;
use docrag_core::types::RetrievedChunk;
use docrag_vector::Retriever;

pub mod citations;
pub mod generator;

pub use citations::{dedupe_refs, reference_lines, strip_inline_refs};
pub use generator::{ExtractiveGenerator, Generator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub chunk_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub references: Vec<String>,
    pub sources: Vec<SourceRef>,
}

pub struct AnswerPipeline {
    generators: Vec<Box<dyn Generator>>,
    fallback: ExtractiveGenerator,
}

impl Default for AnswerPipeline {
    fn default() -> Self { Self::new(Vec::new()) }
}

impl AnswerPipeline {
    pub fn new(generators: Vec<Box<dyn Generator>>) -> Self {
        Self { generators, fallback: ExtractiveGenerator }
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).chain(std::iter::once(self.fallback.name())).collect()
    }

    /// Answer text from the first available generator that succeeds.
    /// Generated text has inline `[n]` markers removed.
    pub fn generate(&self, question: &str, context: &[RetrievedChunk]) -> (String, &str) {
        for generator in &self.generators {
            if !generator.is_available() {
                debug!("Generator {} unavailable, skipping", generator.name());
                continue;
            }
            match generator.generate(question, context) {
                Ok(text) => {
                    info!("Answer generated by {}", generator.name());
                    return (strip_inline_refs(&text), generator.name());
                }
                Err(e) => warn!("Generator {} failed: {:#}", generator.name(), e),
            }
        }
        let text = self
            .fallback
            .generate(question, context)
            .unwrap_or_else(|_| generator::NO_CONTEXT_ANSWER.to_string());
        (text, self.fallback.name())
    }

    pub fn answer(&self, question: &str, context: &[RetrievedChunk]) -> Answer {
        let (answer, _) = self.generate(question, context);
        Answer {
            question: question.to_string(),
            answer,
            references: dedupe_refs(reference_lines(context)),
            sources: context
                .iter()
                .map(|c| SourceRef { source: c.source.clone(), chunk_index: c.chunk_index, score: c.score })
                .collect(),
        }
    }

    /// Retrieve `top_k` chunks for `question` and answer from them.
    pub fn ask<I: VectorIndexer>(&self, retriever: &Retriever<I>, question: &str, top_k: usize) -> Result<Answer> {
        let context = retriever.retrieve(question, top_k)?;
        Ok(self.answer(question, &context))
    }
}
