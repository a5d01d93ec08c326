use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stack-agent")]
#[command(about = "Manage docker compose stacks across local and remote Docker engines")]
pub struct Cli {
    /// Docker context to operate on
    #[arg(short, long, global = true, env = "STACK_AGENT_CONTEXT", default_value = "local")]
    pub context: String,

    /// Data directory (overrides STACK_AGENT_DATA_DIR)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON where supported
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List managed stacks and compose projects found on the engine
    #[command(alias = "ls")]
    List,
    /// Show one stack and its containers
    Describe {
        /// Stack name
        name: String,
    },
    /// Create a managed stack
    Init {
        /// Stack name ([a-z0-9][a-z0-9_-]*)
        name: String,
        /// Initializer: scratch, template, template_repo, url, git, portainer
        #[arg(short, long, default_value = "scratch")]
        kind: String,
        /// Initializer parameter as key=value (can be repeated)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Read `compose_content` from a file
        #[arg(long, value_name = "PATH")]
        compose_file: Option<PathBuf>,
        /// Bring the stack up after creating it
        #[arg(long)]
        up: bool,
    },
    /// Bring a stack up
    Up {
        /// Stack name
        name: String,
        /// Do not build images before starting
        #[arg(long)]
        no_build: bool,
        /// Keep existing containers instead of recreating them
        #[arg(long)]
        no_recreate: bool,
    },
    /// Bring a stack down (unmanaged stacks are only stopped)
    Down {
        /// Stack name
        name: String,
    },
    /// Stop a stack
    Stop {
        /// Stack name
        name: String,
    },
    /// Restart a stack
    Restart {
        /// Stack name
        name: String,
    },
    /// Show compose ps for a managed stack
    Ps {
        /// Stack name
        name: String,
    },
    /// Remove a stack's containers and, for managed stacks, its files
    Destroy {
        /// Stack name
        name: String,
    },
    /// Re-fetch a managed stack's source and render its stack file
    Sync {
        /// Stack name
        name: String,
    },
    /// List available initializer kinds
    Initializers,
    /// Manage Docker contexts
    #[command(subcommand)]
    Contexts(ContextCommands),
    /// Manage stored SSH private keys
    #[command(subcommand)]
    Keys(KeyCommands),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ContextCommands {
    /// List known contexts
    #[command(alias = "ls")]
    List,
    /// Add a context and write it to the contexts file
    Add {
        /// Context id
        id: String,
        /// Engine URI (unix://, tcp://, ssh://user@host:port)
        host: String,
        /// SSH user (overrides the URI)
        #[arg(long)]
        ssh_user: Option<String>,
        /// SSH port (overrides the URI)
        #[arg(long)]
        ssh_port: Option<u16>,
        /// SSH identity file
        #[arg(long)]
        identity_file: Option<PathBuf>,
        /// Disable SSH agent forwarding for remote git
        #[arg(long)]
        no_agent_forward: bool,
        /// Data directory on the engine host
        #[arg(long)]
        data_home: Option<PathBuf>,
    },
    /// Remove a context from the contexts file
    Remove {
        /// Context id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// List stored key ids
    #[command(alias = "ls")]
    List,
    /// Store a private key under an id
    Add {
        /// Key id
        id: String,
        /// Key file to import
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Delete a stored key
    Remove {
        /// Key id
        id: String,
    },
}
