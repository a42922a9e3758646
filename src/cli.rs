use clap::Parser;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5731;

#[derive(Parser, Debug)]
#[command(name = "quickshare")]
#[command(version)]
#[command(about = "Share files and directories over HTTP instantly", long_about = None)]
#[command(after_help = "Examples:\n  \
  quickshare /path/to/file1 /path/to/dir         share a file and a directory\n  \
  quickshare -s /path/to/file1 -s /path/to/file2 -p 8080\n  \
  quickshare --public-ip report.pdf              print URLs with public addresses")]
pub struct Cli {
    /// Files or directories to share
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Serving path, repeatable (used when no positional paths are given)
    #[arg(short = 's', value_name = "PATH")]
    pub serve: Vec<PathBuf>,

    /// Listening port number
    #[arg(short = 'p', value_name = "PORT", default_value_t = DEFAULT_PORT, env = "QUICKSHARE_PORT")]
    pub port: u16,

    /// Verbose log
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Print public addresses from an external lookup only
    #[arg(long = "public-ip")]
    pub public_ip: bool,
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub paths: Vec<PathBuf>,
    pub public_ip_only: bool,
    pub verbose: bool,
}

impl Cli {
    /// Select the serving paths and check that each one exists.
    ///
    /// Positional paths take precedence over `-s`.
    pub fn into_config(self) -> Result<Config> {
        let paths = if self.paths.is_empty() {
            self.serve
        } else {
            self.paths
        };

        for path in &paths {
            std::fs::metadata(path).map_err(|e| Error::PathResolution {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Config {
            port: self.port,
            paths,
            public_ip_only: self.public_ip,
            verbose: self.verbose,
        })
    }

    /// Filter directive for the log subscriber.
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
