mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use commands::LifecycleOp;
use output::{CliOutput, UserOutput};
use stack_agent::credentials::FileCredentialStore;
use stack_agent::{Error as AgentError, Settings, StacksManagerStore};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(agent_error) = e.downcast_ref::<AgentError>() {
            eprintln!("Error: {}", agent_error);
            if let Some(suggestion) = agent_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // A missing .env is fine; a malformed one is not.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let cli = Cli::parse();
    init_tracing()?;
    let out = CliOutput;

    // ── Commands that need no settings ──────────────────────────────
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    tracing::debug!("data dir {}", settings.data_dir.display());

    if let Commands::Keys(cmd) = cli.command {
        let keys = FileCredentialStore::new(settings.keys_dir());
        return commands::run_keys(cmd, &keys, cli.json, &out);
    }

    let store = StacksManagerStore::from_settings(settings)?;

    // ── Commands that need the store but no manager ─────────────────
    match cli.command {
        Commands::Contexts(cmd) => return commands::run_contexts(cmd, &store, cli.json, &out),
        Commands::Initializers => {
            for kind in store.initializers().kinds() {
                out.status(&format!("  {}", kind));
            }
            return Ok(());
        }
        _ => {}
    }

    let manager = store.get(&cli.context)?;
    let mut manager = manager.lock().await;

    match cli.command {
        Commands::List => commands::run_list(&mut manager, cli.json, &out).await?,
        Commands::Describe { name } => {
            commands::run_describe(&mut manager, &name, cli.json, &out).await?
        }
        Commands::Init {
            name,
            kind,
            params,
            compose_file,
            up,
        } => {
            let params = commands::parse_params(&params, compose_file.as_deref())?;
            commands::run_init(&mut manager, &name, &kind, params, up, &out).await?
        }
        Commands::Up {
            name,
            no_build,
            no_recreate,
        } => commands::run_up(&mut manager, &name, no_build, no_recreate, &out).await?,
        Commands::Down { name } => {
            commands::run_lifecycle(&mut manager, LifecycleOp::Down, &name, &out).await?
        }
        Commands::Stop { name } => {
            commands::run_lifecycle(&mut manager, LifecycleOp::Stop, &name, &out).await?
        }
        Commands::Restart { name } => {
            commands::run_lifecycle(&mut manager, LifecycleOp::Restart, &name, &out).await?
        }
        Commands::Ps { name } => {
            commands::run_lifecycle(&mut manager, LifecycleOp::Ps, &name, &out).await?
        }
        Commands::Destroy { name } => commands::run_destroy(&mut manager, &name, &out).await?,
        Commands::Sync { name } => commands::run_sync(&mut manager, &name, cli.json, &out).await?,
        Commands::Contexts(_)
        | Commands::Keys(_)
        | Commands::Initializers
        | Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Settings from the environment, with `--data-dir` taking precedence.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let data_dir = cli.data_dir.as_ref().map(|d| d.display().to_string());
    let settings = Settings::from_lookup(|key| {
        if key == "STACK_AGENT_DATA_DIR" && data_dir.is_some() {
            return data_dir.clone();
        }
        std::env::var(key).ok().filter(|v| !v.is_empty())
    })?;
    Ok(settings)
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
