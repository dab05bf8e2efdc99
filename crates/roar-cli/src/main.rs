//! `roar` (§6): command-line entry point.
//!
//! Grounded on `original_source/roar/cli/main.py`'s subcommand dispatch
//! table and `EffortlessMetrics-agent-backplane`'s `clap`-derive CLI
//! layout.

mod auth;
mod config;
mod dag;
mod env;
mod format;
mod init;
mod lineage;
mod log;
mod paths;
mod pop;
mod register;
mod reproduce;
mod reset;
mod run;
mod show;
mod status;

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Parser, Subcommand};
use roar_core::JobType;

#[derive(Parser)]
#[command(name = "roar", version, about = "Local lineage tracer and registration client for ML pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `.roar/` in the current directory.
    Init {
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long)]
        no: bool,
    },
    /// Trace a command and record it as a run step.
    Run {
        #[arg(short, long)]
        r#ref: Option<String>,
        #[arg(long = "set", value_parser = parse_key_val)]
        overrides: Vec<(String, String)>,
        #[arg(short, long)]
        quiet: bool,
        #[arg(long = "hash")]
        hash_algs: Vec<String>,
        #[arg(long)]
        step_name: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Trace a command and record it as a build step.
    Build {
        #[arg(short, long)]
        r#ref: Option<String>,
        #[arg(long = "set", value_parser = parse_key_val)]
        overrides: Vec<(String, String)>,
        #[arg(short, long)]
        quiet: bool,
        #[arg(long = "hash")]
        hash_algs: Vec<String>,
        #[arg(long)]
        step_name: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Submit the active session's lineage to the LaaS server.
    Register {
        artifact: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Preview or replay the pipeline that produced an artifact.
    Reproduce {
        hash_prefix: String,
        #[arg(long)]
        run: bool,
        #[arg(long)]
        out: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change `.roar/config.toml` values.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Render the active session's dependency graph.
    Dag {
        #[arg(long)]
        expanded: bool,
        #[arg(long)]
        stale_only: bool,
        #[arg(long)]
        show_artifacts: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show details for a job step, file, job UID, or artifact hash.
    Show { reference: Option<String> },
    /// Summarize the active session's DAG and tracked artifacts.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show the 20 most recent jobs in the active session.
    Log {
        #[arg(long)]
        json: bool,
    },
    /// Deactivate the current session and start a fresh one.
    Reset {
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Remove the most recent job from the active session.
    #[command(hide = true)]
    Pop {
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage persistent env vars injected into traced commands.
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
    /// Artifact lineage as reported by the LaaS server.
    #[command(hide = true)]
    Lineage {
        artifact: String,
        #[arg(long, default_value_t = 10)]
        depth: u32,
    },
    /// SSH-key discovery and LaaS authentication checks.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    List {
        #[arg(long)]
        json: bool,
    },
    Get {
        key: String,
        #[arg(long)]
        json: bool,
    },
    Set {
        key: String,
        value: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    Set {
        name: String,
        value: String,
        #[arg(long)]
        json: bool,
    },
    Get {
        name: String,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Unset {
        name: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    Register,
    Test,
    Status,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("ROAR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { yes, no } => init::cmd_init(yes, no),
        Commands::Run { r#ref, overrides, quiet, hash_algs, step_name, json, command } => {
            run::cmd_run(JobType::Run, r#ref, overrides.into_iter().collect::<BTreeMap<_, _>>(), command, quiet, hash_algs, step_name, json).await
        }
        Commands::Build { r#ref, overrides, quiet, hash_algs, step_name, json, command } => {
            run::cmd_run(JobType::Build, r#ref, overrides.into_iter().collect::<BTreeMap<_, _>>(), command, quiet, hash_algs, step_name, json).await
        }
        Commands::Register { artifact, dry_run, yes, json } => register::cmd_register(&artifact, dry_run, yes, json),
        Commands::Reproduce { hash_prefix, run, out, json } => reproduce::cmd_reproduce(&hash_prefix, run, out.as_deref(), json),
        Commands::Config { action } => match action {
            ConfigAction::List { json } => config::cmd_config_list(json),
            ConfigAction::Get { key, json } => config::cmd_config_get(&key, json),
            ConfigAction::Set { key, value, json } => config::cmd_config_set(&key, &value, json),
        },
        Commands::Dag { expanded, stale_only, show_artifacts, json } => {
            dag::cmd_dag(dag::DagOptions { expanded, stale_only, show_artifacts, json })
        }
        Commands::Show { reference } => show::cmd_show(reference.as_deref()),
        Commands::Status { json } => status::cmd_status(json),
        Commands::Log { json } => log::cmd_log(json),
        Commands::Reset { yes, json } => reset::cmd_reset(yes, json),
        Commands::Pop { yes, json } => pop::cmd_pop(yes, json),
        Commands::Env { action } => match action {
            EnvAction::Set { name, value, json } => env::cmd_env_set(&name, &value, json),
            EnvAction::Get { name, json } => env::cmd_env_get(&name, json),
            EnvAction::List { json } => env::cmd_env_list(json),
            EnvAction::Unset { name, json } => env::cmd_env_unset(&name, json),
        },
        Commands::Lineage { artifact, depth } => lineage::cmd_lineage(&artifact, depth),
        Commands::Auth { action } => match action {
            AuthAction::Register => auth::cmd_auth_register(),
            AuthAction::Test => auth::cmd_auth_test(),
            AuthAction::Status => auth::cmd_auth_status(),
        },
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
