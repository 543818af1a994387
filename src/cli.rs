//! Command-line interface definitions for Market Feeds.
//!
//! All path options can also come from environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Market Feeds generator.
///
/// # Examples
///
/// ```sh
/// # Every built-in source into ./feeds
/// market_feeds -o ./feeds
///
/// # Two sources from a custom catalogue, retrying transient failures
/// market_feeds -c sources.yaml -o ./feeds -s capital-market -s trendlyne --retries 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source catalogue (YAML). Defaults to the built-in catalogue
    #[arg(short, long, env = "MARKET_FEEDS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the feed files are written to
    #[arg(short, long, env = "MARKET_FEEDS_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Only run these sources (repeatable)
    #[arg(short, long = "source", value_name = "ID")]
    pub sources: Vec<String>,

    /// Per-request timeout in seconds, overriding the catalogue
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Retries for transient fetch failures
    #[arg(long, default_value_t = 0)]
    pub retries: usize,

    /// Print the configured source ids and exit
    #[arg(long)]
    pub list: bool,

    /// Exit with a non-zero status if any source failed
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["market_feeds"]);

        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(cli.sources.is_empty());
        assert_eq!(cli.retries, 0);
        assert_eq!(cli.timeout_secs, None);
        assert!(!cli.list);
        assert!(!cli.strict);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "market_feeds",
            "-c",
            "/etc/feeds.yaml",
            "-o",
            "/tmp/feeds",
            "-s",
            "capital-market",
            "-s",
            "trendlyne",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/feeds.yaml")));
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/feeds"));
        assert_eq!(cli.sources, vec!["capital-market", "trendlyne"]);
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::parse_from([
            "market_feeds",
            "--output-dir",
            "./out",
            "--source",
            "stockwatch",
            "--timeout-secs",
            "5",
            "--retries",
            "3",
            "--strict",
            "--list",
        ]);

        assert_eq!(cli.sources, vec!["stockwatch"]);
        assert_eq!(cli.timeout_secs, Some(5));
        assert_eq!(cli.retries, 3);
        assert!(cli.strict);
        assert!(cli.list);
    }
}
