//! Command-line interface for medq tool backends

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use medq_tools::{DiscoveredTool, HealthReport, ToolClientManager, ToolsConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "medq")]
#[command(about = "Inspect and exercise medq tool backends", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults to MEDQ_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe every backend; exits non-zero when any is unhealthy
    Health,
    /// List the tools exposed by every backend
    Tools,
    /// Call one tool and print its response
    Call {
        /// Backend id, e.g. drug_db
        backend: String,
        /// Tool name
        tool: String,
        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    medq_utils::init_tracing_with("warn", cli.json_logs);

    let config = match &cli.config {
        Some(path) => ToolsConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ToolsConfig::from_env().context("Failed to load configuration from environment")?,
    };
    let manager = ToolClientManager::from_config(&config)?;

    let outcome = run(&cli, &manager).await;
    manager.shutdown().await;
    outcome
}

async fn run(cli: &Cli, manager: &ToolClientManager) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Health => {
            let report = manager.health_report().await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", health_table(&report));
                println!(
                    "{}/{} backends healthy ({} ms)",
                    report.healthy_count(),
                    report.statuses.len(),
                    report.elapsed_ms
                );
            }

            Ok(exit_code(report.is_healthy()))
        }
        Commands::Tools => {
            let tools = manager.discover_tools().await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else if tools.is_empty() {
                println!("No tools available");
            } else {
                println!("{}", tools_table(&tools));
            }

            Ok(ExitCode::SUCCESS)
        }
        Commands::Call {
            backend,
            tool,
            params,
        } => {
            let params: Value =
                serde_json::from_str(params).context("Tool parameters must be valid JSON")?;

            info!("Calling {} on {}", tool, backend);
            let response = manager.call_tool(backend, tool, params).await?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(exit_code(response.is_success()))
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn health_table(report: &HealthReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Backend", "Status", "Latency (ms)", "Tools", "Error"]);

    for (backend, status) in &report.statuses {
        table.add_row(vec![
            backend.clone(),
            status.status.to_string(),
            or_dash(status.latency_ms),
            or_dash(status.tool_count),
            or_dash(status.error.as_deref()),
        ]);
    }

    table
}

fn tools_table(tools: &[DiscoveredTool]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Backend", "Tool", "Description"]);

    for tool in tools {
        table.add_row(vec![
            tool.backend.as_str(),
            tool.metadata.name.as_str(),
            tool.metadata.description.as_str(),
        ]);
    }

    table
}
