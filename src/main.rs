use clap::Parser;
use colored::*;
use eyre::{eyre, Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::commands::{Commands, RoadmapCommands, StateCommands, WorktreeCommands};
use cli::Cli;
use phaser::config::Config;
use phaser::git::GitBackend;
use phaser::phase::PhaseId;
use phaser::roadmap::{self, RoadmapPhase};
use phaser::scheduler::{analyze, DagAnalysis};
use phaser::statedoc::{ActivePhasesView, ClaimRegistry, PhaseRowUpdate};
use phaser::worktree::WorktreeLifecycle;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("phaser")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("phaser.log");
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Print a serializable result: compact JSON with --raw, pretty otherwise.
fn emit<T: Serialize>(value: &T, raw: bool) -> Result<()> {
    if raw {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn parse_phase(raw: &str) -> Result<PhaseId> {
    raw.parse().map_err(|e: String| eyre!(e))
}

fn run_application(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;

    // Bootstrap backend (default timeout) just to locate the repo root for
    // config resolution; the real backend honors the configured timeout.
    let repo_root = GitBackend::new(Config::default().git.command_timeout_secs).repo_root(&cwd);
    let config =
        Config::load(cli.config.as_deref(), &repo_root).context("Failed to load configuration")?;
    let backend = GitBackend::new(config.git.command_timeout_secs);

    if cli.verbose {
        println!("{}", format!("repo root: {}", repo_root.display()).yellow());
    }

    match &cli.command {
        Commands::Worktree { command } => {
            handle_worktree_command(command, &cwd, &repo_root, &backend, &config, cli.raw)
        }
        Commands::Roadmap { command } => match command {
            RoadmapCommands::AnalyzeDag => handle_analyze_dag(&repo_root, cli.raw),
        },
        Commands::State { command } => handle_state_command(command, &repo_root, cli.raw),
    }
}

fn handle_worktree_command(
    command: &WorktreeCommands,
    cwd: &Path,
    repo_root: &Path,
    backend: &GitBackend,
    config: &Config,
    raw: bool,
) -> Result<()> {
    let registry = ClaimRegistry::new(cwd, backend, config);
    let lifecycle = WorktreeLifecycle::new(repo_root, backend, config);

    match command {
        WorktreeCommands::Create { phase, base } => {
            let phase = parse_phase(phase)?;
            registry.clean_silent();
            let phase_name = roadmap::load_phases(repo_root)
                .ok()
                .and_then(|phases| phases.into_iter().find(|p| p.id == phase).map(|p| p.name));
            let outcome = lifecycle.create(phase, base.as_deref(), phase_name)?;
            emit(&outcome, raw)
        }
        WorktreeCommands::Claim { phase } => {
            let outcome = registry.claim(parse_phase(phase)?)?;
            emit(&outcome, raw)
        }
        WorktreeCommands::Release { phase } => {
            let outcome = registry.release(parse_phase(phase)?)?;
            emit(&outcome, raw)
        }
        WorktreeCommands::UpdatePlan { phase, plan } => {
            let outcome = registry.update_plan(parse_phase(phase)?, plan)?;
            emit(&outcome, raw)
        }
        WorktreeCommands::Clean => {
            let outcome = registry.clean()?;
            emit(&outcome, raw)
        }
        WorktreeCommands::Status => {
            let rows = registry.status()?;
            emit(&rows, raw)
        }
        WorktreeCommands::Merge { phase, into } => {
            let outcome = lifecycle.merge(parse_phase(phase)?, into.as_deref())?;
            if outcome.conflicts && !raw {
                println!("{}", "Merge stopped on conflicts:".red());
                for file in &outcome.conflict_files {
                    println!("  {}", file);
                }
                return Ok(());
            }
            emit(&outcome, raw)
        }
        WorktreeCommands::Stash { phase } => {
            let outcome = lifecycle.stash(parse_phase(phase)?)?;
            emit(&outcome, raw)
        }
        WorktreeCommands::ListManifest => {
            let manifest = lifecycle.list_manifest()?;
            emit(&manifest, raw)
        }
        WorktreeCommands::VerifyResult {
            phase,
            tier,
            result,
            blockers,
        } => {
            let outcome =
                registry.verify_result(parse_phase(phase)?, tier, result, blockers.as_deref())?;
            emit(&outcome, raw)
        }
    }
}

#[derive(Serialize)]
struct AnalyzeDagReport {
    roadmap: Vec<RoadmapPhase>,
    #[serde(flatten)]
    analysis: DagAnalysis,
}

fn handle_analyze_dag(repo_root: &Path, raw: bool) -> Result<()> {
    let phases = roadmap::load_phases(repo_root)?;
    let nodes: Vec<_> = phases.iter().map(|p| p.to_node()).collect();
    let analysis = analyze(&nodes);

    if raw {
        return emit(
            &AnalyzeDagReport {
                roadmap: phases,
                analysis,
            },
            raw,
        );
    }

    render_analysis(&analysis);
    Ok(())
}

fn render_analysis(analysis: &DagAnalysis) {
    println!("{}", "DAG Analysis:".bold());
    println!();

    match &analysis.waves {
        Some(waves) => {
            for wave in waves {
                let labels: Vec<String> = wave
                    .phases
                    .iter()
                    .map(|p| {
                        if analysis.completed.contains(p) {
                            format!("Phase {} (complete)", p)
                        } else {
                            format!("Phase {}", p)
                        }
                    })
                    .collect();
                println!("{} {}", format!("Wave {}:", wave.wave).cyan(), labels.join(", "));
            }
        }
        None => {
            let message = analysis.validation.cycle_error.as_deref().unwrap_or("cycle detected");
            println!("{} {}", "ERROR:".red(), message);
        }
    }

    if !analysis.ready.is_empty() {
        let ready: Vec<String> = analysis.ready.iter().map(|p| format!("Phase {}", p)).collect();
        println!();
        println!("{} {}", "Ready to execute:".green(), ready.join(", "));
    }
    if !analysis.blocked.is_empty() {
        let blocked: Vec<String> = analysis
            .blocked
            .iter()
            .map(|b| {
                let waiting: Vec<String> = b.waiting_on.iter().map(|w| format!("Phase {}", w)).collect();
                format!("Phase {} (waiting on {})", b.phase, waiting.join(", "))
            })
            .collect();
        println!("{} {}", "Blocked:".yellow(), blocked.join(", "));
    }
    if !analysis.validation.missing_refs.is_empty() {
        println!();
        println!("{}", "Warnings:".yellow());
        for missing in &analysis.validation.missing_refs {
            println!(
                "  Phase {} references non-existent Phase {}",
                missing.phase, missing.references
            );
        }
    }
}

fn handle_state_command(command: &StateCommands, repo_root: &Path, raw: bool) -> Result<()> {
    let view = ActivePhasesView::new(repo_root);
    match command {
        StateCommands::ActivePhases => {
            let rows = view.read()?;
            emit(&rows, raw)
        }
        StateCommands::UpdatePhaseRow {
            phase,
            status,
            worker,
            plans,
            name,
            last_update,
        } => {
            let outcome = view.upsert(
                parse_phase(phase)?,
                PhaseRowUpdate {
                    name: name.clone(),
                    status: status.clone(),
                    worker: worker.clone(),
                    plans: plans.clone(),
                    last_update: last_update.clone(),
                },
            )?;
            emit(&outcome, raw)
        }
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    run_application(&cli)
}
