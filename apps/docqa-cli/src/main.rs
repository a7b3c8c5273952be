use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use docqa_core::config::{expand_path, Config};
use docqa_pipeline::{format_trace_summary, AdvancedOptions, Orchestrator, QueryOptions};
use docqa_query::RewriteStrategy;
use docqa_retrieval::{ChunkStore, EmbeddingSearcher, HashEmbedder};

mod llm;

const DEFAULT_CHUNKS_FILE: &str = "data/chunks.jsonl";

fn usage(prog: &str) -> ExitCode {
    eprintln!("Usage: {prog} <command> [args...]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ask \"<query>\" [--top-k N] [--strategy S] [--no-hybrid] [--no-rerank]");
    eprintln!("  ask-advanced \"<query>\" [--top-k N] [--budget N] [--no-reasoning] [--no-trace]");
    eprintln!("  reload <chunks.jsonl>");
    eprintln!("  status");
    ExitCode::FAILURE
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let chunks_file: String = config.get_or("data.chunks_file", DEFAULT_CHUNKS_FILE.to_string());
    let store = Arc::new(ChunkStore::new(expand_path(&chunks_file)));
    let semantic = Arc::new(EmbeddingSearcher::new(
        Arc::clone(&store),
        Arc::new(HashEmbedder::default()),
    ));
    let generator = llm::generator_from_config(config)?;
    Ok(Orchestrator::new(
        store,
        semantic,
        Arc::new(llm::LexicalScorer),
        generator,
    ))
}

/// Pull `--flag value` style options out of the argument list. Boolean
/// flags are consumed in place; unknown flags abort with an error.
struct Flags {
    args: Vec<String>,
}

impl Flags {
    fn new(args: Vec<String>) -> Self {
        Self { args }
    }

    fn take_bool(&mut self, name: &str) -> bool {
        if let Some(pos) = self.args.iter().position(|a| a == name) {
            self.args.remove(pos);
            true
        } else {
            false
        }
    }

    fn take_value(&mut self, name: &str) -> anyhow::Result<Option<String>> {
        if let Some(pos) = self.args.iter().position(|a| a == name) {
            if pos + 1 >= self.args.len() {
                anyhow::bail!("{name} requires a value");
            }
            self.args.remove(pos);
            Ok(Some(self.args.remove(pos)))
        } else {
            Ok(None)
        }
    }

    fn take_usize(&mut self, name: &str) -> anyhow::Result<Option<usize>> {
        match self.take_value(name)? {
            Some(v) => Ok(Some(v.parse().map_err(|_| {
                anyhow::anyhow!("{name} expects a number, got '{v}'")
            })?)),
            None => Ok(None),
        }
    }

    fn positional(&mut self) -> Option<String> {
        if self.args.is_empty() {
            None
        } else {
            Some(self.args.remove(0))
        }
    }

    fn ensure_empty(&self) -> anyhow::Result<()> {
        if let Some(extra) = self.args.first() {
            anyhow::bail!("unexpected argument: {extra}");
        }
        Ok(())
    }
}

async fn cmd_ask(config: &Config, mut flags: Flags) -> anyhow::Result<()> {
    let mut options = QueryOptions::default();
    if let Some(top_k) = flags.take_usize("--top-k")? {
        options.top_k = top_k;
    }
    if let Some(strategy) = flags.take_value("--strategy")? {
        options.rewrite_strategy = RewriteStrategy::parse(&strategy)
            .ok_or_else(|| anyhow::anyhow!("unknown rewrite strategy '{strategy}'"))?;
    }
    if flags.take_bool("--no-hybrid") {
        options.use_hybrid = false;
    }
    if flags.take_bool("--no-rerank") {
        options.use_reranking = false;
    }
    let Some(query) = flags.positional() else {
        anyhow::bail!("ask requires a query");
    };
    flags.ensure_empty()?;

    let orchestrator = build_orchestrator(config)?;
    let result = orchestrator.orchestrate(&query, &options).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_ask_advanced(config: &Config, mut flags: Flags) -> anyhow::Result<()> {
    let mut options = AdvancedOptions::default();
    if let Some(top_k) = flags.take_usize("--top-k")? {
        options.top_k = top_k;
    }
    if let Some(budget) = flags.take_usize("--budget")? {
        options.token_budget = budget;
    }
    if flags.take_bool("--no-reasoning") {
        options.enable_reasoning = false;
    }
    if flags.take_bool("--no-trace") {
        options.enable_tracing = false;
    }
    let Some(query) = flags.positional() else {
        anyhow::bail!("ask-advanced requires a query");
    };
    flags.ensure_empty()?;

    let orchestrator = build_orchestrator(config)?;
    let result = orchestrator.orchestrate_advanced(&query, &options).await;

    if let Some(trace) = &result.trace {
        eprintln!("{}", format_trace_summary(trace));
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_reload(config: &Config, mut flags: Flags) -> anyhow::Result<()> {
    let Some(path) = flags.positional() else {
        anyhow::bail!("reload requires a path to a chunks.jsonl file");
    };
    flags.ensure_empty()?;

    let orchestrator = build_orchestrator(config)?;
    let count = orchestrator.set_index_path(expand_path(&path))?;
    println!("Reloaded {count} chunks from {path}");
    Ok(())
}

fn cmd_status(config: &Config, flags: &Flags) -> anyhow::Result<()> {
    flags.ensure_empty()?;
    let orchestrator = build_orchestrator(config)?;
    let status = orchestrator.index_status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        return usage(&prog);
    }
    let command = args.remove(0);
    let flags = Flags::new(args);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match command.as_str() {
        "ask" => cmd_ask(&config, flags).await,
        "ask-advanced" => cmd_ask_advanced(&config, flags).await,
        "reload" => cmd_reload(&config, flags).await,
        "status" => cmd_status(&config, &flags),
        _ => {
            eprintln!("Unknown command: {command}");
            return usage(&prog);
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
