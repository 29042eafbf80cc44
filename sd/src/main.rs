//! sd - per-agent task scheduler
//!
//! CLI entry point for running agent schedules and inspecting their history.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use agentsched::agent::{AgentCall, CommandAgent};
use agentsched::cli::{Cli, Command, OutputFormat};
use agentsched::config::Config;
use agentsched::domain::{ExecutionRecord, ExecutionStatus, Priority};
use agentsched::events::{EventBus, EventSink, create_event_bus};
use agentsched::execlog::{read_execution_records, tally};
use agentsched::schedule::ScheduleConfig;
use agentsched::scheduler::AgentScheduler;

/// How often `dispatch` checks whether its task has been logged
const DISPATCH_WAIT_STEP: Duration = Duration::from_millis(50);

fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", level);
            tracing::Level::INFO
        }
    }
}

fn log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentsched")
        .join("logs")
        .join("sd.log")
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO
    let level = cli_log_level.or(config_log_level).map_or(tracing::Level::INFO, parse_level);
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let path = log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
    }
    let log_file = fs::File::create(&path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { agents } => cmd_run(&config, &agents).await,
        Command::Dispatch {
            agent,
            prompt,
            priority,
            wait_ms,
        } => cmd_dispatch(&config, &agent, &prompt, priority, Duration::from_millis(wait_ms)).await,
        Command::Sources { agent } => cmd_sources(&config, agent.as_deref()),
        Command::Logs { agent, lines, format } => cmd_logs(&config, &agent, lines, format),
        Command::Stats { agent, format } => cmd_stats(&config, &agent, format),
    }
}

fn agent_call(config: &Config) -> Result<Arc<dyn AgentCall>> {
    if config.agent_command.program.is_empty() {
        return Err(eyre::eyre!(
            "No agent command configured. Set agent-command.program in the config file."
        ));
    }
    Ok(Arc::new(CommandAgent::new(config.agent_command.clone())))
}

/// Mirror bus notifications into the log
fn spawn_event_logger(bus: &Arc<EventBus>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    info!(event = %event.event_name, agent = %event.agent_name, payload = %event.payload, "Scheduler event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn cmd_run(config: &Config, names: &[String]) -> Result<()> {
    debug!(?names, "cmd_run: called");
    let selected = config.select_agents(names)?;
    if selected.is_empty() {
        return Err(eyre::eyre!("No agents configured"));
    }

    let agent = agent_call(config)?;
    let bus = create_event_bus();
    spawn_event_logger(&bus);
    let sink: Arc<dyn EventSink> = bus.clone();

    let mut schedulers = Vec::with_capacity(selected.len());
    for agent_config in selected {
        let scheduler = AgentScheduler::new(
            &agent_config.name,
            Arc::clone(&agent),
            config.scheduler_options(Some(Arc::clone(&sink))),
        );
        scheduler
            .configure(&agent_config.schedule)
            .with_context(|| format!("Invalid schedule for agent '{}'", agent_config.name))?;
        scheduler.start();
        println!(
            "{} {} ({} sources)",
            "▶".green(),
            agent_config.name.cyan(),
            scheduler.get_sources().len()
        );
        schedulers.push(scheduler);
    }

    println!("Running {} agent(s). Press Ctrl-C to stop.", schedulers.len());
    wait_for_shutdown().await?;

    for scheduler in &schedulers {
        scheduler.stop();
        println!("{} {}", "■".yellow(), scheduler.agent_name());
    }
    info!("All schedulers stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl-C received");
    }

    Ok(())
}

async fn cmd_dispatch(config: &Config, agent_name: &str, prompt: &str, priority: Priority, wait: Duration) -> Result<()> {
    debug!(%agent_name, %priority, ?wait, "cmd_dispatch: called");
    let scheduler = AgentScheduler::new(agent_name, agent_call(config)?, config.scheduler_options(None));
    scheduler.start();
    let task = scheduler.dispatch_with_priority(prompt, priority);

    let deadline = tokio::time::Instant::now() + wait;
    let record = loop {
        let logged = scheduler
            .get_logs(Some(usize::MAX))
            .into_iter()
            .find(|r| r.task_id == task.id);
        if let Some(record) = logged {
            break Some(record);
        }
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(DISPATCH_WAIT_STEP).await;
    };
    scheduler.stop();

    let Some(record) = record else {
        return Err(eyre::eyre!("Timed out after {}ms waiting for task {}", wait.as_millis(), task.id));
    };
    print_record(&record);
    if record.status == ExecutionStatus::Failed {
        return Err(eyre::eyre!("Task {} failed", task.id));
    }
    Ok(())
}

fn print_sources(name: &str, schedule: &ScheduleConfig, config: &Config) -> Result<()> {
    let scheduler = AgentScheduler::new(name, Arc::new(CommandAgent::new(config.agent_command.clone())), config.scheduler_options(None));
    scheduler
        .configure(schedule)
        .with_context(|| format!("Invalid schedule for agent '{}'", name))?;

    println!("{}", name.cyan().bold());
    let sources = scheduler.get_sources();
    if sources.is_empty() {
        println!("  {}", "(no sources)".dimmed());
    }
    for source in sources {
        let state = if source.active { "active".green() } else { "inactive".dimmed() };
        println!("  {:<10} {:<24} {}", source.source_type, source.id, state);
    }
    Ok(())
}

fn cmd_sources(config: &Config, agent: Option<&str>) -> Result<()> {
    debug!(?agent, "cmd_sources: called");
    let names: Vec<String> = agent.map(str::to_string).into_iter().collect();
    let selected = config.select_agents(&names)?;
    if selected.is_empty() {
        println!("No agents configured");
    }
    for agent_config in selected {
        print_sources(&agent_config.name, &agent_config.schedule, config)?;
    }
    Ok(())
}

fn status_label(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Completed => status.as_str().green(),
        ExecutionStatus::Failed => status.as_str().red(),
        ExecutionStatus::Running => status.as_str().yellow(),
    }
}

fn print_record(record: &ExecutionRecord) {
    let duration = record.duration_ms.map(|ms| format!(" {}ms", ms)).unwrap_or_default();
    println!(
        "{} {} [{}]{} {}",
        record.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        status_label(record.status),
        record.source,
        duration,
        record.prompt
    );
    if let Some(result) = &record.result {
        println!("  {}", result);
    }
    if let Some(error) = &record.error {
        println!("  {}", error.red());
    }
}

fn cmd_logs(config: &Config, agent: &str, lines: usize, format: OutputFormat) -> Result<()> {
    debug!(%agent, lines, %format, "cmd_logs: called");
    let records = read_execution_records(config.persist_dir(), agent)
        .with_context(|| format!("Failed to read execution log for '{}'", agent))?;
    let skip = records.len().saturating_sub(lines);
    let records = &records[skip..];

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No execution records for {}", agent);
            }
            for record in records {
                print_record(record);
            }
        }
    }
    Ok(())
}

fn cmd_stats(config: &Config, agent: &str, format: OutputFormat) -> Result<()> {
    debug!(%agent, %format, "cmd_stats: called");
    let records = read_execution_records(config.persist_dir(), agent)
        .with_context(|| format!("Failed to read execution log for '{}'", agent))?;
    let stats = tally(&records);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("{} ({} records)", agent.cyan().bold(), records.len());
            for (status, count) in &stats {
                println!("  {:<10} {}", status_label(*status), count);
            }
        }
    }
    Ok(())
}
