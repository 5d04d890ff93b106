use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lab_logging::LogDestination;
use threshlab_core::{FileCategory, Tab};

use crate::config::API_BASE_URL_ENV;

#[derive(Parser, Debug)]
#[command(name = "threshlab")]
#[command(about = "Command-line client for the video thresholding lab backend")]
#[command(version)]
pub struct Cli {
    /// Reuse this session instead of the remembered one
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Config file; defaults to ./threshlab.ron when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend API root, overriding the config file
    #[arg(long, env = API_BASE_URL_ENV, global = true)]
    pub api_base_url: Option<String>,

    #[arg(long, value_enum, default_value = "terminal", global = true)]
    pub log: LogTarget,

    #[arg(long, default_value = lab_logging::DEFAULT_LOG_FILE, global = true)]
    pub log_file: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new session and remember it for later commands
    Session,
    /// Render one tab, optionally re-rendering as the session changes
    Show {
        #[arg(long, value_enum, default_value = "training")]
        tab: TabArg,
        /// Keep watching for this many seconds
        #[arg(long)]
        watch: Option<u64>,
    },
    /// Upload files into a category (dataset, mirror or pattern)
    Upload {
        #[arg(value_parser = parse_category)]
        category: FileCategory,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete the files of a category
    Delete {
        #[arg(value_parser = parse_category)]
        category: FileCategory,
    },
    /// Set a threshold parameter
    Threshold {
        name: String,
        value: String,
        /// Address the parameter by threshold type instead of name
        #[arg(long)]
        by_type: bool,
    },
    /// Reset every threshold to its default
    RestoreDefaults,
    /// Enable or disable a pipeline process
    Process {
        name: String,
        #[arg(value_enum)]
        state: Switch,
    },
    /// Start the pipeline and follow it until it settles
    Run {
        /// Download the result here once the job completes
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },
    /// Print the session metrics
    Metrics,
    /// Fetch a file referenced by the backend
    Download {
        reference: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl LogTarget {
    pub fn destination(self, file: PathBuf) -> LogDestination {
        match self {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File(file),
            LogTarget::Both => LogDestination::Both(file),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabArg {
    Training,
    Settings,
    Metrics,
}

impl From<TabArg> for Tab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Training => Tab::Training,
            TabArg::Settings => Tab::AdvancedSettings,
            TabArg::Metrics => Tab::Metrics,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}

fn parse_category(raw: &str) -> Result<FileCategory, String> {
    raw.parse::<FileCategory>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upload_parses_category_and_files() {
        let cli = Cli::parse_from(["threshlab", "upload", "pattern", "a.png", "b.png"]);
        match cli.command {
            Command::Upload { category, files } => {
                assert_eq!(category, FileCategory::Pattern);
                assert_eq!(files.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(Cli::try_parse_from(["threshlab", "delete", "videos"]).is_err());
    }

    #[test]
    fn base_url_falls_back_to_environment() {
        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "api_base_url")
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(API_BASE_URL_ENV)));
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["threshlab", "metrics", "--session", "abc", "--log", "both"]);
        assert_eq!(cli.session.as_deref(), Some("abc"));
        assert_eq!(cli.log, LogTarget::Both);
    }
}
