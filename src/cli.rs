use clap::{Parser, Subcommand};

/// bugroute: keyword-based issue routing across repositories
#[derive(Parser, Debug, Clone)]
#[command(name = "bugroute", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: bugroute.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Classify and report without touching any issue
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Minimum confidence for automatic routing
    #[arg(long, global = true)]
    pub auto_threshold: Option<f64>,

    /// Minimum confidence for flagging an issue for manual review
    #[arg(long, global = true)]
    pub manual_threshold: Option<f64>,

    /// Keyword matching mode (substring, word)
    #[arg(long, global = true)]
    pub match_mode: Option<String>,

    /// Path the JSON routing report is written to
    #[arg(long, global = true)]
    pub report: Option<String>,

    /// Delay between issues in milliseconds
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Classify a single issue and print the routing decision as JSON
    Classify {
        /// Issue title
        #[arg(long)]
        title: String,

        /// Issue body
        #[arg(long, default_value = "")]
        body: String,

        /// Destination the issue currently lives in
        #[arg(long)]
        current: Option<String>,
    },

    /// Classify every open issue in the configured repositories without routing
    Scan,

    /// Classify and route every open issue in the configured repositories
    Route,

    /// List configured destinations and their keywords
    Destinations,
}
