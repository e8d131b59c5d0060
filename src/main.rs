use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use docqa::{
    Config,
    DataDir,
    KnowledgeBase,
    cli::{AskArgs, ChatArgs, Cli, Command, IngestArgs, ModelArgs},
    config::Backend,
    download::HttpDownloader,
    embedding::BertEmbedder,
    engine::CandleLlama,
    error::{self, Error},
    knowledge_base::StoreStatus,
    llm::LocalModel,
    params::ModelParameters,
    qa::{Answer, QaChain},
    repl,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

type Chain = QaChain<BertEmbedder, LocalModel<CandleLlama>>;

const LOG_ENV_VAR: &str = "DOCQA_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> error::Result<()> {
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.root.as_deref())?;
    let mut config = Config::from_env(&data_dir);
    if let Some(model) = &cli.model {
        config.model.name = model.clone();
    }
    if let Some(model) = &cli.embedding_model {
        config.embedding_model = model.clone();
    }
    config.model.allow_download = cli.allow_download;

    match &cli.command {
        Command::Ingest(args) => cmd_ingest(config, args, !cli.quiet)?,
        Command::Chat(args) => cmd_chat(config, args, !cli.quiet)?,
        Command::Ask(args) => cmd_ask(config, args, !cli.quiet)?,
        Command::Status(args) => cmd_status(&config, &data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_ingest(
    mut config: Config,
    args: &IngestArgs,
    progress: bool,
) -> error::Result<()> {
    if let Some(size) = args.chunk_size {
        config.chunking.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunking.overlap = overlap;
    }
    if let Some(source) = &args.source {
        config.source_dir = source.clone();
    }
    config.recursive = !args.no_recursive;
    config.validate()?;

    let embedder = BertEmbedder::open(&config.embedding_model)?;
    let kb = KnowledgeBase::new(&config).with_progress(progress);
    let report = kb.ingest(&config.source_dir, &embedder)?;

    eprintln!(
        "Ingested {} document(s) into {} chunk(s); {} entries stored in {}",
        report.documents,
        report.chunks,
        report.entries,
        kb.store_dir().display()
    );
    Ok(())
}

fn apply_model_args(
    config: &mut Config,
    args: &ModelArgs,
) -> error::Result<()> {
    config.model.backend = args.backend.parse::<Backend>()?;
    if let Some(host) = &args.download_host {
        config.model.download_host = host.clone();
    }
    if let Some(tokenizer) = &args.tokenizer {
        config.model.tokenizer = tokenizer.clone();
    }
    if let Some(k) = args.target_source_chunks {
        config.target_source_chunks = k;
    }
    config.hide_sources = args.hide_sources;
    config.validate()
}

/// Open the store first so a missing index fails before any model loads.
fn open_chain(
    config: &Config,
    args: &ModelArgs,
    progress: bool,
) -> error::Result<Chain> {
    let kb = KnowledgeBase::new(config);
    if !kb.store_dir().is_dir() {
        return Err(Error::StoreMissing(kb.store_dir().to_path_buf()));
    }

    let embedder = BertEmbedder::open(&config.embedding_model)?;
    let retriever = kb.get_retriever(embedder)?;

    let downloader = HttpDownloader::new(progress)?;
    let tokenizer = config.model.tokenizer.as_str();
    let backend = config.model.backend;
    let llm = LocalModel::open(&config.model, &downloader, |path: &Path| {
        match backend {
            Backend::Llama => CandleLlama::load(path, tokenizer),
        }
    })?;
    if !llm.is_available() {
        tracing::warn!(
            model = %llm.path().display(),
            "language model unavailable; questions will fail"
        );
    }

    Ok(QaChain::new(retriever, llm)
        .with_overrides(args.generation.overrides()))
}

fn cmd_chat(
    mut config: Config,
    args: &ChatArgs,
    progress: bool,
) -> error::Result<()> {
    apply_model_args(&mut config, &args.model)?;
    let mut chain = open_chain(&config, &args.model, progress)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    repl::run(&mut chain, stdin.lock(), stdout.lock(), config.hide_sources)?;

    chain.into_llm().close();
    Ok(())
}

#[derive(Serialize)]
struct AskResponse<'a> {
    query: &'a str,
    answer: &'a str,
    sources: Vec<SourceEntry<'a>>,
}

#[derive(Serialize)]
struct SourceEntry<'a> {
    id: &'a str,
    source: &'a str,
    score: f32,
    text: &'a str,
}

fn cmd_ask(
    mut config: Config,
    args: &AskArgs,
    progress: bool,
) -> error::Result<()> {
    apply_model_args(&mut config, &args.model)?;
    let mut chain = open_chain(&config, &args.model, progress)?;
    let answer = chain.answer(&args.query)?;

    if args.json {
        print_answer_json(&args.query, &answer, config.hide_sources)?;
    } else {
        let mut stdout = std::io::stdout().lock();
        repl::print_answer(&mut stdout, &answer, config.hide_sources)?;
    }

    chain.into_llm().close();
    Ok(())
}

fn print_answer_json(
    query: &str,
    answer: &Answer,
    hide_sources: bool,
) -> error::Result<()> {
    let sources = if hide_sources {
        Vec::new()
    } else {
        answer
            .sources
            .iter()
            .map(|s| SourceEntry {
                id: &s.id.short,
                source: s.chunk.source(),
                score: s.score,
                text: &s.chunk.text,
            })
            .collect()
    };
    let response = AskResponse {
        query,
        answer: answer.text.trim(),
        sources,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    root: &'a Path,
    source_dir: &'a Path,
    embedding_model: &'a str,
    model: &'a str,
    model_path: PathBuf,
    model_present: bool,
    store: StoreStatus,
    parameters: &'a ModelParameters,
}

fn cmd_status(
    config: &Config,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let store = KnowledgeBase::new(config).status()?;
    let model_path = config.model.path();
    let model_present = model_path.is_file();

    if json {
        let response = StatusResponse {
            root: data_dir.root(),
            source_dir: &config.source_dir,
            embedding_model: &config.embedding_model,
            model: &config.model.name,
            model_present,
            model_path,
            store,
            parameters: &config.model.parameters,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Root: {}", data_dir.root().display());
        println!("Sources: {}", config.source_dir.display());
        println!("Embedding model: {}", config.embedding_model);
        println!(
            "Language model: {} ({})",
            model_path.display(),
            if model_present { "present" } else { "missing" }
        );
        if store.exists {
            println!(
                "Vector store: {} ({} entries, dimension {})",
                store.store_dir.display(),
                store.entries,
                store
                    .dimension
                    .map_or_else(|| "unknown".to_string(), |d| d.to_string())
            );
        } else {
            println!(
                "Vector store: {} (not built; run `docqa ingest`)",
                store.store_dir.display()
            );
        }
    }
    Ok(())
}
