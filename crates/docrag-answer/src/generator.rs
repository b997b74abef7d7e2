use anyhow::Result;

use docrag_core::types::RetrievedChunk;

pub const NO_CONTEXT_ANSWER: &str = "No relevant passages were found for this question.";

/// Produces answer text from a question and its retrieved context.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backing model or service is configured at all.
    fn is_available(&self) -> bool { true }

    fn generate(&self, question: &str, context: &[RetrievedChunk]) -> Result<String>;
}

/// Returns the retrieved passages verbatim, separated by blank lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerator;

impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str { "extractive" }

    fn generate(&self, _question: &str, context: &[RetrievedChunk]) -> Result<String> {
        if context.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }
        Ok(context.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n"))
    }
}
