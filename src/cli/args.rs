//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// opendiv-db - an embeddable, file-backed, replicated document store
#[derive(Parser, Debug)]
#[command(name = "opendiv-db")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open the database and serve replication until interrupted
    Serve {
        /// Path to the configuration file; environment variables are
        /// used when the file does not exist
        #[arg(long, default_value = "./db_config.yaml")]
        config: PathBuf,
    },

    /// Run a small write-and-query smoke flow against the database
    Demo {
        /// Path to the configuration file; environment variables are
        /// used when the file does not exist
        #[arg(long, default_value = "./db_config.yaml")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse process arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
