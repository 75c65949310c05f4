use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chatlog_core::{
    ChatlogError, EditorRoots, ExportFormat, ExportOptions, ExportReport, export_all,
    export_workspace, list_sessions, list_workspaces, search_sessions,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT_DIR: &str = "./chatlog_export";
const DEFAULT_EXPORT_ALL_DIR: &str = "./work/chatlog_export_all";

#[derive(Debug, Parser)]
#[command(
    name = "chatlog",
    version,
    about = "List and export editor chat sessions"
)]
struct Cli {
    /// Editor user-data directory (the one containing User/workspaceStorage)
    #[arg(long, global = true)]
    vscode_path: Option<PathBuf>,

    /// Directory exports are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Export format: html, json, jsonl (raw copy) or text
    #[arg(long, global = true, default_value = "html")]
    format: ExportFormat,

    /// Print listings and export summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List workspaces that have chat sessions
    Workspaces,
    /// List the sessions of one workspace, newest first
    Sessions { workspace_id: String },
    /// Export sessions of one workspace: an id, a comma-separated list, or *
    Export {
        workspace_id: String,
        session: String,
    },
    /// Export every session of every workspace
    ExportAll,
    /// Find sessions whose file contains the given text
    Search { text: String },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CHATLOG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Returns `Ok(false)` when an export finished with failed sessions.
fn run(cli: Cli) -> chatlog_core::Result<bool> {
    let roots = match &cli.vscode_path {
        Some(path) => EditorRoots::single(path),
        None => EditorRoots::from_env_or_home()?,
    };

    match &cli.command {
        Command::Workspaces => {
            let workspaces = list_workspaces(&roots);
            if cli.json {
                return print_json(&workspaces).map(|()| true);
            }
            if workspaces.is_empty() {
                println!("no workspaces with chat sessions found");
                return Ok(true);
            }

            let mut variants = workspaces
                .iter()
                .map(|workspace| workspace.variant.as_str())
                .collect::<Vec<_>>();
            variants.sort_unstable();
            variants.dedup();
            for variant in variants {
                println!("[{variant}]");
                for workspace in workspaces.iter().filter(|w| w.variant == variant) {
                    println!(
                        "  {}  {} ({} sessions)",
                        workspace.id, workspace.name, workspace.session_count
                    );
                }
            }
        }
        Command::Sessions { workspace_id } => {
            let sessions = list_sessions(&roots, workspace_id)?;
            if cli.json {
                return print_json(&sessions).map(|()| true);
            }
            for session in &sessions {
                println!(
                    "{}  {:>10}  {}  {} messages  {}",
                    session.id,
                    session.size_human,
                    session.modified.as_deref().unwrap_or("-"),
                    session.message_count,
                    session.title.as_deref().unwrap_or(""),
                );
            }
        }
        Command::Export {
            workspace_id,
            session,
        } => {
            let options = ExportOptions {
                output_dir: output_dir(&cli, DEFAULT_OUTPUT_DIR),
                format: cli.format,
            };
            let report = export_workspace(&roots, workspace_id, session, &options)?;
            print_report(&report, &options.output_dir, cli.json)?;
            return Ok(report.is_success());
        }
        Command::ExportAll => {
            let options = ExportOptions {
                output_dir: output_dir(&cli, DEFAULT_EXPORT_ALL_DIR),
                format: cli.format,
            };
            let report = export_all(&roots, &options);
            print_report(&report, &options.output_dir, cli.json)?;
            return Ok(report.is_success());
        }
        Command::Search { text } => {
            let matches = search_sessions(&roots, text);
            if cli.json {
                return print_json(&matches).map(|()| true);
            }
            if matches.is_empty() {
                println!("no sessions contain {text:?}");
            }
            for found in &matches {
                println!(
                    "{}/{}  {}  {}  [{}]",
                    found.workspace_id,
                    found.session_id,
                    found.workspace_name,
                    found.size_human,
                    found.variant
                );
            }
        }
    }

    Ok(true)
}

fn output_dir(cli: &Cli, default: &str) -> PathBuf {
    cli.output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(default))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> chatlog_core::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| ChatlogError::Serialization(err.to_string()))?;
    println!("{json}");
    Ok(())
}

fn print_report(report: &ExportReport, output_dir: &Path, json: bool) -> chatlog_core::Result<()> {
    if json {
        return print_json(report);
    }

    for path in &report.exported {
        println!("exported {}", path.display());
    }
    for failure in &report.failed {
        eprintln!("failed {}: {}", failure.session_id, failure.reason);
    }
    println!(
        "{} exported, {} skipped, {} failed -> {}",
        report.exported.len(),
        report.skipped.len(),
        report.failed.len(),
        output_dir.display()
    );
    Ok(())
}
