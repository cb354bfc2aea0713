use clap::{Args, Parser, Subcommand};

use crate::display::SortColumn;

#[derive(Parser)]
#[command(name = "burrow", about = "Dashboard for a remote SSH tunneling service", version)]
pub struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Origin serving the API (overrides config)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Use the local development API endpoint
    #[arg(long, global = true)]
    pub dev: bool,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show service info and aggregate stats
    Home {
        /// Keep refreshing until Ctrl-C
        #[arg(long, short)]
        watch: bool,
    },
    /// Manage port-forwarding tunnels
    #[command(alias = "tuns")]
    Tunnels {
        #[command(subcommand)]
        action: Option<Action>,
    },
    /// Manage relay pipes
    Pipes {
        #[command(subcommand)]
        action: Option<Action>,
    },
    /// Check that the service answers
    Ping,
    /// Initialize or edit ~/.burrow/config.toml
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (reads from config if omitted)
        shell: Option<clap_complete::Shell>,
    },
}

#[derive(Subcommand)]
pub enum Action {
    /// List records (default)
    #[command(alias = "ls")]
    List(ListArgs),
    /// Create a new record
    Add {
        /// Local endpoint (prompted if omitted)
        #[arg(long, short)]
        local: Option<String>,
        /// Remote endpoint (prompted if omitted)
        #[arg(long, short)]
        remote: Option<String>,
        /// Listener is local (tunnels only)
        #[arg(long, short)]
        forward: bool,
    },
    /// Stop a record
    #[command(alias = "rm")]
    Stop {
        /// Record id (interactive picker if omitted)
        id: Option<u64>,
    },
}

#[derive(Args, Default)]
pub struct ListArgs {
    /// Keep refreshing until Ctrl-C
    #[arg(long, short)]
    pub watch: bool,
    /// Column to order the table by
    #[arg(long, short, value_enum, default_value_t)]
    pub sort: SortColumn,
}
