//! KEEL runtime demo CLI.
//!
//! Wires the real KEEL components (policy table, executor, artifact store,
//! trace recorder, idempotency cache, conversation memory) to a handful of
//! mock capabilities.
//!
//! Usage:
//!   cargo run -p demo -- run
//!   cargo run -p demo -- --config demo/keel.toml run --parallel
//!   cargo run -p demo -- replay
//!   cargo run -p demo -- memory

mod capabilities;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use keel_contracts::{
    config::RuntimeConfig,
    error::KeelResult,
    ids::{SessionId, TurnId},
    memory::ConversationTurn,
};
use keel_store::IdempotencyKey;
use keel_trace::SpanNode;

use runtime::Runtime;

// ── CLI definition ────────────────────────────────────────────────────────────

/// KEEL agentic task-execution runtime demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "KEEL runtime demo",
    long_about = "Runs a sample plan through the KEEL executor, replays a cached\n\
                  answer, and exercises conversation memory."
)]
struct Cli {
    /// Runtime config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the sample plan and print the execution report as JSON.
    Run {
        /// Run the steps of each level concurrently.
        #[arg(long)]
        parallel: bool,
        /// Repository the plan inspects.
        #[arg(long, default_value = "keel-rs/keel")]
        repo: String,
    },
    /// Answer the same turn twice to show the idempotency cache.
    Replay,
    /// Record a few turns and print the conversation context.
    Memory {
        #[arg(long, default_value = "demo-session")]
        session: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Command::Run { parallel, repo } => run_plan(config, parallel, &repo),
        Command::Replay => replay(config),
        Command::Memory { session } => memory(config, &session),
    });

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> KeelResult<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => Ok(RuntimeConfig::default()),
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn run_plan(mut config: RuntimeConfig, parallel: bool, repo: &str) -> KeelResult<()> {
    config.executor.parallel_levels |= parallel;
    let runtime = Runtime::from_config(&config)?;

    let session_id = SessionId::generate();
    let turn_id = TurnId::generate();
    let plan = capabilities::sample_plan(repo);

    for (n, level) in keel_core::schedule(&plan).iter().enumerate() {
        let ids: Vec<&str> = level.iter().map(|id| id.as_str()).collect();
        println!("Level {}: {}", n, ids.join(", "));
    }
    let report = runtime.executor.run(&plan, &session_id, &turn_id);
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!();
    println!("Trace for turn {}:", turn_id);
    for root in runtime.tracer.store().span_tree(&turn_id) {
        print_span(&root, 1);
    }
    println!();
    println!("Artifacts stored: {}", runtime.artifacts.len());
    Ok(())
}

fn print_span(node: &SpanNode, depth: usize) {
    let duration = node
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "open".to_string());
    let marker = if node.failed { "  [failed]" } else { "" };
    println!(
        "{:indent$}{} ({}) {}{}",
        "",
        node.name,
        node.actor,
        duration,
        marker,
        indent = depth * 2
    );
    for child in &node.children {
        print_span(child, depth + 1);
    }
}

fn replay(config: RuntimeConfig) -> KeelResult<()> {
    let runtime = Runtime::from_config(&config)?;
    let session_id = SessionId::generate();
    let turn_id = TurnId::generate();
    let plan = capabilities::sample_plan("keel-rs/keel");

    let mut executions = 0;
    for attempt in 1..=2 {
        let key = IdempotencyKey::new(session_id.clone(), turn_id.clone(), "answer");
        let answer = runtime.answers.get_or_compute(key, || {
            executions += 1;
            let report = runtime.executor.run(&plan, &session_id, &turn_id);
            serde_json::to_value(report.result("summarize"))
        })?;
        println!(
            "Request {}: answer_id={} cached={} value={}",
            attempt, answer.answer_id, answer.hit, answer.value
        );
    }

    let next_turn = IdempotencyKey::new(session_id, TurnId::generate(), "answer");
    let fresh = runtime.answers.get(&next_turn).is_none();
    println!("Plan executions: {}", executions);
    println!("New turn misses the cache: {}", fresh);
    Ok(())
}

fn memory(config: RuntimeConfig, session: &str) -> KeelResult<()> {
    let runtime = Runtime::from_config(&config)?;
    let memory = &runtime.memory;
    let session_id = SessionId::from(session);

    memory.add_turn(
        &session_id,
        ConversationTurn::new("How healthy is keel-rs/keel?", "It looks healthy."),
    );
    memory.add_turn(
        &session_id,
        ConversationTurn::new("Who maintains it?", "Which owner did you mean?")
            .with_metadata(json!({ "needs_disambiguation": true })),
    );
    memory.set_summary(&session_id, "User is evaluating keel-rs/keel.");
    memory.set_preference(&session_id, "tone", "brief");

    println!("Backend: {}", memory.backend_name());
    println!("{}", serde_json::to_string_pretty(&memory.context(&session_id))?);
    Ok(())
}
