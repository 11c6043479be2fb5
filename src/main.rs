//! librarian - command-line entry point.
//!
//! Runs one request over a document, or an interactive session that supports
//! clarification answers and continuation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use librarian_team::agents::{LibrarianTeam, TeamSettings};
use librarian_team::config::Config;
use librarian_team::document::{
    Document, DocumentFormat, DocumentSink, DocumentSource, FsDocumentStore,
};
use librarian_team::llm::AnthropicClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Continuations requested automatically in single-request mode.
const MAX_AUTO_CONTINUATIONS: usize = 8;

/// Process documents with a team of model-backed specialists.
#[derive(Parser, Debug)]
#[command(name = "librarian")]
#[command(version)]
struct Args {
    /// Input document (.txt, .md, .html, .docx)
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Processing request; required unless --interactive
    #[arg(short, long)]
    request: Option<String>,

    /// Write the answer here (.md, .html, .docx; anything else is plain text)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Start an interactive session
    #[arg(long)]
    interactive: bool,

    /// Print document metadata before processing
    #[arg(long)]
    metadata: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Worker calls in flight at once (overrides LIBRARIAN_MAX_CONCURRENT_TASKS)
    #[arg(long)]
    max_concurrent_tasks: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let default_filter = if args.verbose {
        "librarian_team=debug,librarian=debug"
    } else {
        "librarian_team=info,librarian=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if !args.interactive && args.request.is_none() {
        anyhow::bail!("--request is required unless --interactive is set");
    }

    let mut config = Config::from_env()?;
    if let Some(limit) = args.max_concurrent_tasks {
        config.max_concurrent_tasks = limit;
    }
    config.validate()?;
    info!(
        "Loaded configuration: model={}, max_concurrent_tasks={}",
        config.model, config.max_concurrent_tasks
    );

    let store = FsDocumentStore;
    let document = store
        .load(&args.input)
        .await
        .with_context(|| format!("Could not read {}", args.input.display()))?;
    info!(
        path = %args.input.display(),
        chars = document.content.chars().count(),
        "Document loaded"
    );
    if args.metadata {
        print_metadata(&document);
    }

    let client = AnthropicClient::new(
        config.api_key.clone(),
        config.model.clone(),
        config.max_tokens,
    )
    .with_api_url(config.api_url.clone());
    let mut team = LibrarianTeam::new(Arc::new(client), TeamSettings::from(&config));

    let title = args
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Document")
        .to_string();
    let mut answer_file = args
        .output
        .as_deref()
        .map(|path| AnswerFile::new(&store, path, title));

    if args.interactive {
        return interactive(&mut team, &document, answer_file.as_mut()).await;
    }

    let request = args.request.unwrap_or_default();
    let mut answer = team.process_document(&request, &document.content).await?;
    let mut continuations = 0;
    while team.awaiting_continuation() {
        if continuations == MAX_AUTO_CONTINUATIONS {
            warn!("Answer still truncated after {} continuations", continuations);
            break;
        }
        team.continue_processing().await?;
        continuations += 1;
    }

    match team.compiled_answer() {
        Some(compiled) => answer = compiled.to_string(),
        None => eprintln!("Clarification needed; rerun with --interactive to answer."),
    }
    println!("{answer}");
    if let Some(file) = answer_file.as_mut() {
        file.save_compiled(&team).await?;
    }
    Ok(())
}

async fn interactive(
    team: &mut LibrarianTeam,
    document: &Document,
    mut answer_file: Option<&mut AnswerFile<'_>>,
) -> anyhow::Result<()> {
    println!("Interactive session. Commands: continue, history, clarify: <answer>, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        let result = match line {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "continue" => team.continue_processing().await,
            "history" => {
                for message in team.history() {
                    println!("[{:?}] {}", message.role, message.content);
                }
                continue;
            }
            _ => {
                if let Some(answer) = line.strip_prefix("clarify:") {
                    team.answer_clarification(answer.trim()).await
                } else if !team.pending_clarifications().is_empty() {
                    team.answer_clarification(line).await
                } else {
                    team.process_document(line, &document.content).await
                }
            }
        };

        match result {
            Ok(answer) => {
                println!("{answer}");
                if let Some(file) = answer_file.as_deref_mut() {
                    if let Err(e) = file.save_compiled(team).await {
                        eprintln!("Error: {e:#}");
                    }
                }
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

fn print_metadata(document: &Document) {
    for (key, value) in &document.metadata {
        println!("{key}: {value}");
    }
}

/// Output file that receives the compiled answer whenever it changes.
struct AnswerFile<'a> {
    store: &'a FsDocumentStore,
    path: &'a Path,
    title: String,
    saved: Option<String>,
}

impl<'a> AnswerFile<'a> {
    fn new(store: &'a FsDocumentStore, path: &'a Path, title: String) -> Self {
        Self {
            store,
            path,
            title,
            saved: None,
        }
    }

    /// Write the team's accumulated answer. Listings and status replies
    /// leave the file alone.
    async fn save_compiled(&mut self, team: &LibrarianTeam) -> anyhow::Result<()> {
        let Some(compiled) = team.compiled_answer() else {
            return Ok(());
        };
        if self.saved.as_deref() == Some(compiled) {
            return Ok(());
        }

        let format = DocumentFormat::for_output(self.path);
        self.store
            .save(compiled, self.path, format, &self.title)
            .await
            .with_context(|| format!("Could not write {}", self.path.display()))?;
        info!(path = %self.path.display(), format = ?format, "Answer saved");
        self.saved = Some(compiled.to_string());
        Ok(())
    }
}
