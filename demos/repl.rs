//! Interactive REPL for watching context budgeting at work.
//!
//! Usage:
//!   ANTHROPIC_API_KEY=sk-... cargo run --example repl
//!   ANTHROPIC_API_KEY=sk-... cargo run --example repl -- --strategy middle-removal
//!   ANTHROPIC_API_KEY=sk-... cargo run --example repl -- --context-window 4000 --threshold 0.5
//!   ANTHROPIC_API_KEY=sk-... cargo run --example repl -- --history-dir ./sessions
//!
//! Separate inputs with ';' to queue several messages for one turn and watch
//! them coalesce. Shrink --context-window to force compaction quickly.
//! Ctrl-C or type "exit" / "quit" to leave.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use harbor_context::{
    create_compaction_strategy, estimate_history, AnthropicGenerator, CompactionConfig,
    CompactionOutcome, ContextSession, FileHistoryStore, HeuristicEstimator, Message,
    MemoryHistoryStore, ModelLimits, Role, StrategyContext, StrategyRegistry, TextGenerator,
    TokenUsage,
};

#[derive(Parser)]
#[command(name = "repl", about = "Chat REPL with context-window budgeting")]
struct Cli {
    /// Model to use
    #[arg(long, default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Compaction strategy: "noop", "middle-removal", or "reactive-overflow"
    #[arg(long, default_value = "reactive-overflow")]
    strategy: String,

    /// Fraction of usable tokens that triggers compaction
    #[arg(long, default_value_t = 0.8)]
    threshold: f64,

    /// Context window size in tokens
    #[arg(long, default_value_t = 200_000)]
    context_window: u32,

    /// Max output tokens per reply
    #[arg(long, default_value_t = 4096)]
    max_output: u32,

    /// Persist history as JSON under this directory instead of in memory
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// API base URL
    #[arg(long)]
    base_url: Option<String>,
}

const REPLY_SYSTEM_PROMPT: &str = "You are a helpful assistant. Continue the conversation; \
reply to the newest user message.";

fn transcript(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Role::System => format!("System: {}", m.text()),
            Role::User => format!("User: {}", m.text()),
            Role::Assistant => format!("Assistant: {}", m.text()),
            Role::Tool => format!("Tool result: {}", m.text()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("error: ANTHROPIC_API_KEY not set");
        std::process::exit(1);
    });
    let mut generator = AnthropicGenerator::new(&api_key, &cli.model);
    if let Some(ref url) = cli.base_url {
        generator = generator.with_base_url(url);
    }
    let generator = Arc::new(generator);

    let config = CompactionConfig::new(&cli.strategy).with_threshold_percent(cli.threshold);
    let ctx = StrategyContext::new()
        .with_generator(generator.clone())
        .with_session_id("repl");
    let strategy = match create_compaction_strategy(&config, &ctx, &StrategyRegistry::builtin()) {
        Ok(strategy) => strategy,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let limits = ModelLimits::new(cli.context_window, cli.max_output);
    let session = match cli.history_dir {
        Some(ref dir) => ContextSession::new("repl", FileHistoryStore::new(dir), limits),
        None => ContextSession::new("repl", MemoryHistoryStore::new(), limits),
    }
    .with_compaction(strategy);

    eprintln!("harbor-context repl");
    eprintln!("model: {}", cli.model);
    eprintln!("strategy: {} (threshold {})", cli.strategy, cli.threshold);
    eprintln!("window: {} tokens", cli.context_window);
    eprintln!("---");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("\x1b[1;36myou>\x1b[0m ");
        io::stderr().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "exit" | "quit" | "/q") {
            break;
        }

        // ';' separates submissions so coalescing is visible in one line
        for part in trimmed.split(';') {
            let part = part.trim();
            if !part.is_empty() {
                session.submit_text(part);
            }
        }
        let queued = session.queued();

        match session.begin_turn().await {
            Ok(Some(_)) => {}
            Ok(None) => continue,
            Err(e) => {
                eprintln!("\x1b[1;31merror:\x1b[0m {e}");
                continue;
            }
        }
        if queued > 1 {
            eprintln!("\x1b[35m  [coalesced {queued} inputs into one turn]\x1b[0m");
        }

        let history = match session.history().await {
            Ok(history) => history,
            Err(e) => {
                eprintln!("\x1b[1;31merror:\x1b[0m {e}");
                continue;
            }
        };
        let reply = match generator
            .generate(REPLY_SYSTEM_PROMPT, &transcript(&history), cli.max_output)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("\x1b[1;31merror:\x1b[0m {e}");
                continue;
            }
        };

        eprint!("\x1b[1;32magent>\x1b[0m ");
        println!("{reply}");

        if let Err(e) = session.record_response(Message::assistant(&reply)).await {
            eprintln!("\x1b[1;31merror:\x1b[0m {e}");
            continue;
        }

        // The REPL has no full inference client reporting usage, so feed the
        // estimator's view of the stored history as the usage signal.
        let history = session.history().await.unwrap_or_default();
        let input_tokens = estimate_history(&HeuristicEstimator, &history);
        eprintln!("\x1b[2m  [~{input_tokens} tokens in context]\x1b[0m");

        let usage = TokenUsage::new(input_tokens, 0);
        match session.maybe_compact(&usage, &CancellationToken::new()).await {
            Ok(CompactionOutcome::Applied(report)) => {
                eprintln!(
                    "\x1b[35m  [compacted via {}: {} → {} tokens, {} messages replaced]\x1b[0m",
                    report.strategy,
                    report.tokens_before,
                    report.tokens_after,
                    report.messages_removed
                );
            }
            Ok(CompactionOutcome::Rejected(report)) => {
                eprintln!(
                    "\x1b[33m  [compaction discarded: {} → {} tokens]\x1b[0m",
                    report.tokens_before, report.tokens_after
                );
            }
            Ok(CompactionOutcome::Skipped) => {}
            Err(e) => {
                eprintln!("\x1b[1;31mcompaction error:\x1b[0m {e}");
            }
        }
    }

    eprintln!("bye.");
}
