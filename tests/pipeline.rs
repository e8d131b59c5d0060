use std::{
    cell::Cell,
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
    process::Command,
};

use docqa::{
    Config,
    DataDir,
    Error,
    KnowledgeBase,
    download::ModelDownloader,
    embedding::Embedder,
    llm::{InferenceEngine, LocalModel, TextGenerator},
    params::{ModelParameters, ParameterOverrides},
    qa::QaChain,
    repl,
};

const DIM: usize = 128;

/// Bag of lowercase words hashed into `DIM` buckets.
struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed_documents(
        &self,
        texts: &[String],
    ) -> docqa::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_words(t)).collect())
    }
}

fn hash_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        v[(hasher.finish() % DIM as u64) as usize] += 1.0;
    }
    v
}

/// Engine that answers with the last context line before the question.
#[derive(Default)]
struct ContextEcho {
    prompts: Vec<String>,
    params: Vec<ModelParameters>,
}

impl InferenceEngine for ContextEcho {
    fn complete(
        &mut self,
        prompt: &str,
        _stop: &[String],
        params: &ModelParameters,
    ) -> docqa::Result<String> {
        self.prompts.push(prompt.to_string());
        self.params.push(*params);
        let context = prompt
            .split("\n\nQuestion:")
            .next()
            .and_then(|head| head.rsplit("\n\n").next())
            .unwrap_or_default();
        Ok(format!(" {context} "))
    }
}

#[derive(Default)]
struct NoNetwork {
    calls: Cell<usize>,
}

impl ModelDownloader for NoNetwork {
    fn download(&self, url: &str, _dest: &Path) -> docqa::Result<u64> {
        self.calls.set(self.calls.get() + 1);
        Err(Error::Network(format!("{url}: offline")))
    }
}

fn setup(
    root: &Path,
    files: &[(&str, &str)],
) -> Result<Config, Box<dyn std::error::Error>> {
    let data_dir = DataDir::resolve(Some(root))?;
    let mut config = Config::new(&data_dir);
    config.model.name = "tiny".to_string();

    for (name, text) in files {
        let path = config.source_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
    }
    Ok(config)
}

fn install_model(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.model.folder)?;
    std::fs::write(config.model.path(), b"weights")?;
    Ok(())
}

#[test]
fn ingest_and_answer_with_sources() -> Result<(), Box<dyn std::error::Error>>
{
    let tmp = tempfile::tempdir()?;
    let config = setup(
        tmp.path(),
        &[
            ("geo/france.txt", "The capital of France is Paris."),
            ("geo/spain.txt", "Madrid is the capital city of Spain."),
            ("notes.md", "Remember to water the plants on Sunday."),
        ],
    )?;
    install_model(&config)?;

    let kb = KnowledgeBase::new(&config);
    let report = kb.ingest(&config.source_dir, &HashingEmbedder)?;
    assert_eq!(report.documents, 3);
    assert_eq!(report.entries, report.chunks);

    let downloader = NoNetwork::default();
    let llm = LocalModel::open(&config.model, &downloader, |_| {
        Ok(ContextEcho::default())
    })?;
    assert_eq!(downloader.calls.get(), 0);

    let mut chain = QaChain::new(kb.get_retriever(HashingEmbedder)?, llm)
        .with_overrides(ParameterOverrides {
            max_tokens: Some(16),
            ..Default::default()
        });

    let answer = chain.answer("What is the capital of France?")?;
    let top = &answer.sources[0].chunk;
    assert_eq!(top.text, "The capital of France is Paris.");
    assert!(top.source().ends_with("france.txt"));
    assert_eq!(answer.sources.len(), 3);
    assert!(answer.text.starts_with(' ') && answer.text.ends_with(' '));
    Ok(())
}

#[test]
fn chat_session_through_local_model() -> Result<(), Box<dyn std::error::Error>>
{
    let tmp = tempfile::tempdir()?;
    let config = setup(
        tmp.path(),
        &[("france.txt", "The capital of France is Paris.")],
    )?;
    install_model(&config)?;

    let kb = KnowledgeBase::new(&config);
    kb.ingest(&config.source_dir, &HashingEmbedder)?;

    let downloader = NoNetwork::default();
    let llm = LocalModel::open(&config.model, &downloader, |_| {
        Ok(ContextEcho::default())
    })?;
    let mut chain = QaChain::new(kb.get_retriever(HashingEmbedder)?, llm);

    let mut output = Vec::new();
    let input = "What is the capital of France?\n\nexit\nnever asked\n";
    let answered = repl::run(&mut chain, input.as_bytes(), &mut output, false)?;
    assert_eq!(answered, 1);

    let output = String::from_utf8(output)?;
    assert!(output.contains("The capital of France is Paris."));
    assert!(output.contains("> SOURCE: "));
    assert!(!output.contains("never asked"));
    Ok(())
}

#[test]
fn unavailable_model_fails_each_question()
-> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let mut config = setup(
        tmp.path(),
        &[("france.txt", "The capital of France is Paris.")],
    )?;
    config.model.allow_download = true;

    let kb = KnowledgeBase::new(&config);
    kb.ingest(&config.source_dir, &HashingEmbedder)?;

    let downloader = NoNetwork::default();
    let mut llm = LocalModel::open(&config.model, &downloader, |_| {
        Ok(ContextEcho::default())
    })?;
    assert_eq!(downloader.calls.get(), 1);
    assert!(!llm.is_available());
    assert!(!config.model.path().exists());

    let err = llm
        .generate("prompt", None, &ParameterOverrides::default())
        .unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable(_)));

    let mut chain = QaChain::new(kb.get_retriever(HashingEmbedder)?, llm);
    let err = chain.answer("Where is Paris?").unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable(_)));
    Ok(())
}

#[test]
fn status_reports_empty_root() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;

    let output = docqa_command()?
        .arg("--root")
        .arg(tmp.path())
        .args(["status", "--json"])
        .output()?;
    assert!(output.status.success(), "status failed: {output:?}");

    let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(status["store"]["exists"], false);
    assert_eq!(status["store"]["entries"], 0);
    assert_eq!(status["model_present"], false);
    assert_eq!(status["parameters"]["max_tokens"], 200);
    Ok(())
}

#[test]
fn ask_before_ingest_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;

    let output = docqa_command()?
        .arg("--root")
        .arg(tmp.path())
        .args(["ask", "What is the capital of France?"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("docqa ingest"), "stderr: {stderr}");
    Ok(())
}

fn docqa_command() -> Result<Command, Box<dyn std::error::Error>> {
    let mut command = Command::new(docqa_bin()?);
    command
        .env_remove("DOCQA_ROOT")
        .env_remove("DOCQA_MODEL")
        .env_remove("DOCQA_EMBEDDING_MODEL")
        .env("DOCQA_LOG", "error");
    Ok(command)
}

fn docqa_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_docqa") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("docqa");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
