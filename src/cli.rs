//! Command-line argument parsing for sqlgate.

use clap::Parser;
use std::path::PathBuf;

/// A human-in-the-loop safety gateway for SQL sent by automated agents.
#[derive(Parser, Debug)]
#[command(name = "sqlgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write diagnostic logs to a file instead of stderr (default location when no path is given)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,

    /// Serve every configured connection from the in-memory mock database
    #[arg(long)]
    pub mock_db: bool,

    /// Classify one SQL text with the configured keyword policy, print the result as JSON and exit
    #[arg(long, value_name = "SQL")]
    pub check: Option<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the explicit config file path, if given.
    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config.as_deref()
    }

    /// Returns the diagnostic log file, if file logging was requested.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(crate::logging::get_log_path))
    }
}
