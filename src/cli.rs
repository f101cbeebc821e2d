use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::analysis::FileType;

#[derive(Debug, Parser)]
#[command(name = "devroom")]
#[command(version)]
#[command(about = "Terminal client for the devroom chat room and code-error analyzer")]
pub struct Cli {
    /// TOML config file (chat_url, api_base_url, timeouts, log_level, ...)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// WebSocket URL of the chat server (overrides the config file)
    #[arg(long, global = true)]
    pub chat_url: Option<String>,

    /// Base URL of the analysis API (overrides the config file)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join the chat room and chat from the terminal
    Chat {
        /// Nickname, at least 2 characters
        #[arg(long, short)]
        name: String,
    },

    /// Analyze a source file and print the result
    Analyze {
        /// File to analyze (.py, .js, .html, .css, .json)
        path: PathBuf,

        /// Override the type detected from the extension
        #[arg(long, value_enum)]
        file_type: Option<FileType>,

        /// Only run the static checks, do not execute the code
        #[arg(long)]
        no_execute: bool,

        /// Do not store a classified error in the server history
        #[arg(long)]
        no_save_history: bool,

        /// Also write an HTML report to this path
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// Syntax and import checks only
    Validate {
        path: PathBuf,
    },

    /// Print the server's error statistics
    Stats,

    /// Check that the analysis server is up
    Health,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
