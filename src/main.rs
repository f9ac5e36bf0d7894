//! swarmgate CLI
//!
//! Runs an agent conversation against a policy-gated tool sandbox. With a
//! message argument it processes one turn and exits; without one it drops
//! into a REPL. Consent requests are answered interactively.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use swarmgate_core::events::{TurnStage, UpdateSender};
use swarmgate_core::exec::ToolCoordinator;
use swarmgate_core::llm::{AgentProfile, OpenAiClient};
use swarmgate_core::orchestrator::{TurnOutcome, TurnProcessor};
use swarmgate_core::sandbox::{LocalSandbox, SandboxService};
use swarmgate_core::session::SessionHandle;
use swarmgate_core::{AppConfig, SessionRegistry};

#[derive(Parser)]
#[command(name = "swarmgate", about = "Policy-gated agent orchestration", version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, default_value = "swarmgate.yml")]
    config: PathBuf,

    /// Override the sandbox working directory
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Override the model name
    #[arg(long)]
    model: Option<String>,

    /// Message for a single turn; omit for a REPL
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarmgate=info,swarmgate_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(workdir) = cli.workdir {
        config.workdir = workdir;
    }
    if let Some(model) = cli.model {
        config.provider.model = model;
    }

    std::fs::create_dir_all(&config.workdir)
        .with_context(|| format!("creating workdir {}", config.workdir.display()))?;

    let sandbox = Arc::new(LocalSandbox::new(&config.workdir)?);
    let provider = Arc::new(OpenAiClient::new(config.provider.clone())?);
    let (updates, mut update_rx) = UpdateSender::channel();
    tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            if let Some(stage) = update.stage {
                tracing::debug!(stage = stage_label(stage), "turn stage");
            }
            if let Some(thought) = &update.thought {
                tracing::debug!(thought = %thought, "model reasoning");
            }
            for entry in &update.network_log_append {
                tracing::debug!(
                    tool = %entry.tool,
                    ok = entry.ok,
                    duration_ms = entry.duration_ms,
                    "tool executed"
                );
            }
            for decision in &update.gating_log_append {
                tracing::info!(
                    tool = %decision.tool_name,
                    allowed = decision.allowed,
                    reason = %decision.reason,
                    "gate"
                );
            }
        }
    });

    updates.send(swarmgate_core::SessionUpdate {
        sandbox_status: Some(sandbox.status().await),
        ..Default::default()
    });
    let coordinator = Arc::new(ToolCoordinator::new(sandbox, provider, updates));
    let processor = TurnProcessor::new(coordinator);

    let registry = SessionRegistry::new();
    let (session_id, session) =
        registry.create(config.policy.clone(), AgentProfile::standard());
    {
        let mut guard = session.lock().await;
        guard.configure_budget(config.budget.price_in_per_m, config.budget.price_out_per_m);
        guard.configure_cache(
            config.cache.max_entries,
            config.cache.ttl_sec,
            config.cache.error_ttl_sec,
        );
    }
    tracing::info!(session = %session_id, workdir = %config.workdir.display(), "ready");

    let interrupt = session.lock().await.interrupt_flag();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            interrupt.store(true, Ordering::SeqCst);
            eprintln!("\n[interrupt requested]");
        }
    });

    if !cli.message.is_empty() {
        let message = cli.message.join(" ");
        run_turn(&processor, &session, &message).await?;
        return Ok(());
    }

    // REPL
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        run_turn(&processor, &session, line).await?;
    }
    Ok(())
}

async fn run_turn(processor: &TurnProcessor, session: &SessionHandle, message: &str) -> Result<()> {
    let mut outcome = {
        let mut guard = session.lock().await;
        for proposal in guard.routing.route(message) {
            tracing::debug!(
                tool = %proposal.tool,
                confidence = proposal.confidence,
                reason = %proposal.reason,
                "route proposal"
            );
        }
        processor.process_turn(&mut guard, message).await
    };

    loop {
        match outcome {
            TurnOutcome::Completed {
                reply, suggestions, ..
            } => {
                println!("{}", reply);
                if !suggestions.is_empty() {
                    println!("\nsuggestions:");
                    for s in &suggestions {
                        println!("  - {}", s);
                    }
                }
                return Ok(());
            }
            TurnOutcome::AwaitingConsent(pending) => {
                println!("\n{}", pending.prompt);
                println!("planned calls:");
                for call in &pending.plan {
                    println!("  {} {}", call.tool, call.args);
                }
                let approved = ask_yes_no("approve? [y/N] ")?;
                let mut guard = session.lock().await;
                outcome = processor.resume_after_consent(&mut guard, approved).await;
            }
            TurnOutcome::Interrupted => {
                println!("[turn interrupted]");
                let mut guard = session.lock().await;
                guard.clear_interrupt();
                return Ok(());
            }
        }
    }
}

fn ask_yes_no(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn stage_label(stage: TurnStage) -> &'static str {
    match stage {
        TurnStage::Streaming => "streaming",
        TurnStage::ToolExecuting => "running tools",
        TurnStage::Synthesizing => "synthesizing",
        TurnStage::AwaitingConsent => "awaiting consent",
        TurnStage::Interrupted => "interrupted",
        TurnStage::Done => "done",
    }
}
