//! Command-line interface.
//!
//! With no subcommand kynos opens the interactive search; the subcommands are
//! the same flows in one-shot, scriptable form.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Find an S&P 500 company by fuzzy search or plain English and chart its
/// price history in the terminal.
///
/// Run without a command for the interactive search. Tab switches between
/// search-as-you-type and asking in plain English ("Microsoft last 90 days").
#[derive(Parser, Debug, Clone)]
#[command(name = "kynos")]
#[command(author = "Oliver Carmont")]
#[command(version)]
#[command(about = "Fuzzy-find S&P 500 companies and chart their price history", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "KYNOS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Ticker catalog, a JSON file or an http(s) URL
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    /// API timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Skip the catalog cache, always reading the source
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Output format for one-shot commands
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub export: ExportFormat,

    /// Log progress to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask in plain English, e.g. "NVIDIA over the last 6 months"
    Ask {
        /// The question; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Fuzzy search the catalog by symbol or company name
    Search {
        query: String,

        /// Maximum results (defaults to search.limit)
        #[arg(short = 'l', long)]
        limit: Option<usize>,
    },

    /// Price history for a ticker symbol
    History {
        symbol: String,

        /// Days of history (defaults to search.days)
        #[arg(short = 'd', long)]
        days: Option<u32>,
    },

    /// Load the ticker catalog and report where it came from
    Catalog {
        /// Drop the cached copy first
        #[arg(long)]
        refresh: bool,
    },

    /// Manage the catalog cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the default config path and a sample config
    Config,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Remove the cached catalog
    Clear,
}

/// Export format for data output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ExportFormat {
    /// Plain text format
    #[default]
    Text,
    /// Comma-separated values (CSV)
    Csv,
    /// JavaScript Object Notation (JSON)
    Json,
}

impl Args {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

impl Command {
    /// Whether the command needs the ticker catalog.
    pub fn needs_catalog(&self) -> bool {
        matches!(
            self,
            Command::Ask { .. } | Command::Search { .. } | Command::History { .. } | Command::Catalog { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["kynos"]);
        assert!(args.command.is_none());
        assert_eq!(args.export, ExportFormat::Text);
        assert!(!args.no_cache);
        assert!(args.timeout.is_none());
    }

    #[test]
    fn test_ask_joins_words() {
        let args = Args::parse_from(["kynos", "ask", "Microsoft", "last", "90", "days"]);
        match args.command {
            Some(Command::Ask { prompt }) => assert_eq!(prompt.join(" "), "Microsoft last 90 days"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_requires_prompt() {
        assert!(Args::try_parse_from(["kynos", "ask"]).is_err());
    }

    #[test]
    fn test_search_with_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "kynos", "search", "nvidia", "-l", "3", "--export", "json", "--no-cache",
        ]);
        assert_eq!(
            args.command,
            Some(Command::Search {
                query: "nvidia".to_string(),
                limit: Some(3),
            })
        );
        assert_eq!(args.export, ExportFormat::Json);
        assert!(args.no_cache);
    }

    #[test]
    fn test_history_and_cache() {
        let args = Args::parse_from(["kynos", "--timeout", "5", "history", "NVDA", "-d", "30"]);
        assert_eq!(args.timeout, Some(5));
        assert_eq!(
            args.command,
            Some(Command::History {
                symbol: "NVDA".to_string(),
                days: Some(30),
            })
        );

        let args = Args::parse_from(["kynos", "cache", "clear"]);
        assert_eq!(args.command, Some(Command::Cache { action: CacheAction::Clear }));
        assert!(!args.command.unwrap().needs_catalog());
    }

    #[test]
    fn test_invalid_export_format() {
        assert!(Args::try_parse_from(["kynos", "--export", "xml", "search", "a"]).is_err());
    }
}
