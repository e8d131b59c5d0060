//! The interactive question loop behind `docqa chat`.

use std::io::{BufRead, Write};

use crate::{
    embedding::Embedder,
    error::Result,
    llm::TextGenerator,
    qa::{Answer, QaChain},
};

pub const PROMPT: &str = "What's on your mind: ";
pub const EXIT_COMMAND: &str = "exit";

/// Ask for questions on `input` and print answers to `output` until the
/// user types `exit` or input ends. Returns the number of questions
/// answered.
///
/// The first error from answering a question ends the loop.
pub fn run<E, G, R, W>(
    chain: &mut QaChain<E, G>,
    mut input: R,
    mut output: W,
    hide_sources: bool,
) -> Result<usize>
where
    E: Embedder,
    G: TextGenerator,
    R: BufRead,
    W: Write,
{
    let mut answered = 0;
    let mut line = String::new();

    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        let query = line.trim_end_matches(['\r', '\n']);
        if query == EXIT_COMMAND {
            break;
        }
        if query.trim().is_empty() {
            continue;
        }

        let answer = chain.answer(query)?;
        print_answer(&mut output, &answer, hide_sources)?;
        answered += 1;
    }

    tracing::debug!(answered, "leaving chat");
    Ok(answered)
}

/// Write the answer text, followed by its sources unless hidden.
pub fn print_answer(
    output: &mut impl Write,
    answer: &Answer,
    hide_sources: bool,
) -> Result<()> {
    writeln!(output, "{}", answer.text.trim())?;
    if hide_sources {
        return Ok(());
    }

    let rule = sources_rule();
    writeln!(output, "{rule}")?;
    for source in &answer.sources {
        writeln!(output, "\n> SOURCE: {}:", source.chunk.source())?;
        writeln!(output, "{}", source.chunk.text)?;
    }
    writeln!(output, "{rule}")?;
    Ok(())
}

fn sources_rule() -> String {
    let hashes = "#".repeat(30);
    format!("{hashes} Sources {hashes}")
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{
        config::Config,
        data_dir::DataDir,
        error::Error,
        knowledge_base::KnowledgeBase,
        params::ParameterOverrides,
    };

    #[derive(Default)]
    struct CountingEmbedder {
        queries: Cell<usize>,
    }

    impl Embedder for CountingEmbedder {
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.queries.set(self.queries.get() + 1);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[derive(Default)]
    struct Canned {
        calls: usize,
    }

    impl TextGenerator for Canned {
        fn generate(
            &mut self,
            _: &str,
            _: Option<&[String]>,
            _: &ParameterOverrides,
        ) -> Result<String> {
            self.calls += 1;
            Ok("Paris.".to_string())
        }
    }

    struct Broken;

    impl TextGenerator for Broken {
        fn generate(
            &mut self,
            _: &str,
            _: Option<&[String]>,
            _: &ParameterOverrides,
        ) -> Result<String> {
            Err(Error::ModelUnavailable("tiny".into()))
        }
    }

    fn with_chain<G: TextGenerator>(
        llm: G,
        input: &str,
        hide_sources: bool,
    ) -> (Result<usize>, String, usize, G) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(&DataDir::resolve(Some(tmp.path())).unwrap());
        std::fs::create_dir_all(&config.source_dir).unwrap();
        std::fs::write(
            config.source_dir.join("france.txt"),
            "The capital of France is Paris.",
        )
        .unwrap();

        let embedder = CountingEmbedder::default();
        let kb = KnowledgeBase::new(&config);
        kb.ingest(&config.source_dir, &embedder).unwrap();
        let retriever = kb.get_retriever(&embedder).unwrap();
        let mut chain = QaChain::new(retriever, llm);

        let mut output = Vec::new();
        let result =
            run(&mut chain, input.as_bytes(), &mut output, hide_sources);
        let queries = embedder.queries.get();
        (
            result,
            String::from_utf8(output).unwrap(),
            queries,
            chain.into_llm(),
        )
    }

    #[test]
    fn exit_ends_without_retrieval_or_generation() {
        let (result, output, queries, llm) =
            with_chain(Canned::default(), "exit\n", false);

        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, PROMPT);
        assert_eq!(queries, 0);
        assert_eq!(llm.calls, 0);
    }

    #[test]
    fn end_of_input_ends_loop() {
        let (result, _, queries, llm) =
            with_chain(Canned::default(), "", false);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(queries, 0);
        assert_eq!(llm.calls, 0);
    }

    #[test]
    fn answers_and_lists_sources() {
        let (result, output, queries, llm) = with_chain(
            Canned::default(),
            "\nWhat is the capital of France?\nexit\n",
            false,
        );

        assert_eq!(result.unwrap(), 1);
        assert_eq!(queries, 1);
        assert_eq!(llm.calls, 1);

        let rule = sources_rule();
        assert_eq!(output.matches(&rule).count(), 2);
        assert!(output.contains("Paris.\n"));
        let listed = "france.txt:\nThe capital of France is Paris.";
        assert!(output.contains(listed));
        assert_eq!(output.matches(PROMPT).count(), 3);
    }

    #[test]
    fn hide_sources_prints_answer_only() {
        let (result, output, _, _) =
            with_chain(Canned::default(), "capital?\nexit\n", true);

        assert_eq!(result.unwrap(), 1);
        assert!(output.contains("Paris.\n"));
        assert!(!output.contains("SOURCE"));
    }

    #[test]
    fn printed_answer_is_trimmed() {
        let answer = Answer {
            text: "  Paris.\n\n".to_string(),
            sources: Vec::new(),
        };
        let mut output = Vec::new();
        print_answer(&mut output, &answer, true).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Paris.\n");
    }

    #[test]
    fn answer_errors_end_the_loop() {
        let (result, _, queries, _) =
            with_chain(Broken, "first?\nsecond?\n", false);

        assert!(matches!(result, Err(Error::ModelUnavailable(_))));
        assert_eq!(queries, 1);
    }
}
