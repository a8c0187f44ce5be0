//! Switchboard CLI - stdio MCP server and one-shot routing commands

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use switchboard_core::config::CONFIG_ENV_VAR;
use switchboard_core::prelude::*;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Route tasks and run workflows across MCP capability providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Echo calls instead of launching provider processes
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the routing tools over MCP on stdin/stdout
    Serve,
    /// Route a single task
    Route {
        /// Task category
        #[arg(short = 't', long)]
        task_type: String,
        /// What needs to be done
        #[arg(short, long)]
        description: String,
        #[arg(long)]
        complexity: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// The task needs codebase or documentation context
        #[arg(long)]
        context_required: bool,
        /// Extra metadata as key=value (value parsed as JSON when possible)
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, Value)>,
    },
    /// Run a declared workflow
    Run {
        /// Workflow name
        workflow: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Payload field as key=value (value parsed as JSON when possible)
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, Value)>,
    },
    /// List capability providers
    Providers {
        #[arg(long)]
        capability: Option<String>,
    },
    /// Show routing rules in priority order
    Rules {
        #[arg(long)]
        task_type: Option<String>,
    },
    /// List declared workflows
    Workflows,
    /// Load the configuration and report reference problems
    Validate,
    /// Version information
    Version,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("switchboard {}", env!("CARGO_PKG_VERSION"));
        println!("switchboard-core {}", switchboard_core::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let config = SwitchboardConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.integration_settings.log_level);
    // re-run so load-time warnings reach the subscriber
    config.validate()?;

    if let Commands::Validate = cli.command {
        let issues = config.reference_issues();
        println!(
            "{}: {} providers, {} rules, {} workflows",
            cli.config.display(),
            config.providers.len(),
            config.routing_rules.len(),
            config.workflows.len()
        );
        for issue in &issues {
            println!("  warning: {}", issue);
        }
        return Ok(if issues.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let mut builder = Switchboard::builder(config);
    if cli.dry_run {
        builder = builder.invoker(Arc::new(ScriptedInvoker::new()));
    }
    let switchboard = builder.build();

    let succeeded = match cli.command {
        Commands::Serve => {
            McpServer::new(Arc::new(switchboard))
                .run(StdioTransport::new())
                .await?;
            true
        }
        Commands::Route {
            task_type,
            description,
            complexity,
            target,
            context_required,
            metadata,
        } => {
            let mut task = TaskContext::new(task_type, description);
            task.complexity = complexity;
            task.target = target;
            if context_required {
                task.context_required = Some(true);
            }
            task.metadata = metadata.into_iter().collect::<Map<String, Value>>();

            let report = switchboard.route_task(task, Some(interrupt_token())).await;
            print_json(&report)?;
            report.success
        }
        Commands::Run {
            workflow,
            description,
            params,
        } => {
            let mut payload: Map<String, Value> = params.into_iter().collect();
            if let Some(description) = description {
                payload.insert("description".to_string(), Value::String(description));
            }

            let report = switchboard
                .execute_workflow(&workflow, Value::Object(payload), Some(interrupt_token()))
                .await;
            print_json(&report)?;
            report.success
        }
        Commands::Providers { capability } => {
            print_json(&switchboard.list_available_mcps(capability.as_deref()))?;
            true
        }
        Commands::Rules { task_type } => {
            print_json(&switchboard.get_routing_rules(task_type.as_deref()))?;
            true
        }
        Commands::Workflows => {
            print_json(&switchboard.list_workflows())?;
            true
        }
        Commands::Validate | Commands::Version => bail!("command already handled"),
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("library=tokio").unwrap(),
            ("library".to_string(), Value::String("tokio".to_string()))
        );
        assert_eq!(
            parse_key_value("needs_docs=true").unwrap(),
            ("needs_docs".to_string(), Value::Bool(true))
        );
        assert!(parse_key_value("no-separator").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "--config",
            "custom.yaml",
            "run",
            "bug_fix",
            "-d",
            "crash",
            "-p",
            "repository=switchboard",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.yaml"));
        match cli.command {
            Commands::Run { workflow, params, .. } => {
                assert_eq!(workflow, "bug_fix");
                assert_eq!(params.len(), 1);
            }
            _ => panic!("expected run"),
        }
    }
}
