use automatosx::exec::ParallelAgent;
use automatosx::{AppConfig, ExecutionOptions, Orchestrator};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Run an agent (or a dependency graph of agents) on a task.
#[derive(Debug, Parser)]
#[command(name = "automatosx", version, about)]
struct Args {
    /// Agent name or display name
    agent: String,

    /// The task to execute
    task: String,

    /// Configuration file; defaults to .automatosx/config.json when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Attach to an existing session
    #[arg(long)]
    session: Option<uuid::Uuid>,

    /// Runtime timeout override in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Force a specific provider
    #[arg(long)]
    provider: Option<String>,

    /// Additional agents forming a dependency graph, as name[:dep1,dep2]
    #[arg(long = "with")]
    with_agents: Vec<String>,

    /// Keep running later stages and independent agents after a failure
    #[arg(long)]
    continue_on_failure: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("automatosx=info")),
        )
        .init();

    let args = Args::parse();
    let current_dir = std::env::current_dir()?;

    let config = match args.config {
        Some(ref path) => AppConfig::load(path)?,
        None => {
            let default_path = automatosx::env::config_file_path(&current_dir);
            if default_path.is_file() {
                AppConfig::load(&default_path)?
            } else {
                AppConfig::default()
            }
        }
    };

    let orchestrator = Orchestrator::initialize(config, &current_dir)?;
    let options = ExecutionOptions {
        session_id: args.session,
        runtime_timeout_ms: args.timeout_ms,
        provider_override: args.provider.clone(),
        continue_on_failure: args.continue_on_failure,
        ..Default::default()
    };

    if args.with_agents.is_empty() {
        match orchestrator
            .controller()
            .run_agent(&args.agent, &args.task, &options)
            .await
        {
            Ok(result) => {
                println!("{}", result.response.content);
                if !result.success() {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                let report = e.report();
                eprintln!("Error ({}): {}", report.code, report.message);
                for suggestion in &report.suggestions {
                    eprintln!("  hint: {}", suggestion);
                }
                std::process::exit(1);
            }
        }
    } else {
        let mut agents = vec![ParallelAgent::new(args.agent.clone())];
        for spec in &args.with_agents {
            agents.push(parse_agent_spec(spec));
        }
        info!("Running {} agents as a dependency graph", agents.len());

        match orchestrator
            .controller()
            .run_parallel(agents, &args.task, &options)
            .await
        {
            Ok(result) => {
                for entry in &result.timeline {
                    println!(
                        "{:10} level {} {:?} ({} ms)",
                        entry.agent, entry.level, entry.status, entry.duration_ms
                    );
                }
                if !result.success {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Error ({}): {}", e.code(), e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Parse `name` or `name:dep1,dep2` into a graph member
fn parse_agent_spec(spec: &str) -> ParallelAgent {
    match spec.split_once(':') {
        Some((name, deps)) => ParallelAgent::new(name).with_dependencies(
            deps.split(',')
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        None => ParallelAgent::new(spec),
    }
}
