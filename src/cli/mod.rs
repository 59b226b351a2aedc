//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hybrid-gateway",
    version,
    author = "neur0map",
    about = "Hybrid retrieval gateway over dense, lexical and graph backends",
    long_about = "hybrid-gateway answers top-K retrieval queries by fanning out to a vector index, a lexical \
                  index and an optional graph store, blending their scores, and optionally refining the \
                  head of the list with a cross-encoder reranker."
)]
pub struct Cli {
    /// Config file path; when absent the gateway is configured from the environment only
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Listen address, overrides GATEWAY_HOST
        #[arg(long)]
        host: Option<String>,

        /// Listen port, overrides GATEWAY_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_is_optional() {
        let cli = Cli::try_parse_from(["hybrid-gateway"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["hybrid-gateway", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
