//! Retrieval-augmented question answering.

use crate::{
    embedding::Embedder,
    error::Result,
    knowledge_base::Retriever,
    llm::TextGenerator,
    params::ParameterOverrides,
    vector_store::ScoredChunk,
};

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer \
the question at the end. If you don't know the answer, just say that you \
don't know, don't try to make up an answer.";

/// An answer and the chunks it was generated from, most relevant first.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// Put every chunk into a single prompt ahead of the question.
///
/// # Examples
///
/// ```
/// use docqa::qa::build_prompt;
///
/// let prompt = build_prompt(&["Paris is in France."], "Where is Paris?");
/// assert!(prompt.contains("France.\n\nQuestion: Where is Paris?"));
/// assert!(prompt.ends_with("Helpful Answer:"));
/// ```
pub fn build_prompt(context: &[&str], question: &str) -> String {
    let context = context.join("\n\n");
    format!(
        "{PROMPT_PREAMBLE}\n\n{context}\n\n\
         Question: {question}\nHelpful Answer:"
    )
}

/// Answers questions from the retriever's chunks with one model call each.
pub struct QaChain<E, G> {
    retriever: Retriever<E>,
    llm: G,
    overrides: ParameterOverrides,
}

impl<E: Embedder, G: TextGenerator> QaChain<E, G> {
    pub fn new(retriever: Retriever<E>, llm: G) -> Self {
        Self {
            retriever,
            llm,
            overrides: ParameterOverrides::default(),
        }
    }

    /// Parameter overrides passed with every generation.
    pub fn with_overrides(mut self, overrides: ParameterOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn answer(&mut self, query: &str) -> Result<Answer> {
        let sources = self.retriever.retrieve(query)?;
        let context: Vec<&str> =
            sources.iter().map(|s| s.chunk.text.as_str()).collect();
        let prompt = build_prompt(&context, query);
        tracing::debug!(%prompt, "prompt");

        let text = self.llm.generate(&prompt, None, &self.overrides)?;
        Ok(Answer { text, sources })
    }

    pub fn llm(&self) -> &G {
        &self.llm
    }

    pub fn into_llm(self) -> G {
        self.llm
    }
}

impl<E, G> std::fmt::Debug for QaChain<E, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaChain")
            .field("retriever", &self.retriever)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}
