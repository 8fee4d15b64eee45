//! SBC-Man CLI - download, validate and install game bundles.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use sbcman::config::ConfigFile;
use sbcman::logging::{init_logging, LoggingGuard};

use commands::download::DownloadArgs;
use commands::extract::ExtractArgs;
use commands::install::InstallArgs;
use commands::update::{CheckUpdateArgs, SelfUpdateArgs};
use commands::url::UrlAction;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "sbcman", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/sbcman/config.ini)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate and extract an archive
    Extract(ExtractArgs),
    /// Install a local bundle or wheel
    Install(InstallArgs),
    /// Download and install a game
    Download(DownloadArgs),
    /// Check the release feed for a newer version
    CheckUpdate(CheckUpdateArgs),
    /// Download and install the latest release
    SelfUpdate(SelfUpdateArgs),
    /// Probe a remote URL
    Url {
        #[command(subcommand)]
        action: UrlAction,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load(&path)?),
        None => match ConfigFile::default_path() {
            Some(path) => Ok(ConfigFile::load_or_default(&path)?),
            None => Ok(ConfigFile::default()),
        },
    }
}

fn start_logging(config: &ConfigFile, level: Option<&str>) -> Option<LoggingGuard> {
    let level = level.unwrap_or(&config.log_level);
    match init_logging(&config.log_dir, level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} {}", style("Warning:").yellow(), e);
            None
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config)?;
    let _logging = start_logging(&config, cli.log_level.as_deref());

    match cli.command {
        Commands::Extract(args) => commands::extract::run(args, &config),
        Commands::Install(args) => commands::install::run(args, &config),
        Commands::Download(args) => commands::download::run(args, &config),
        Commands::CheckUpdate(args) => commands::update::check(args, &config),
        Commands::SelfUpdate(args) => commands::update::self_update(args, &config),
        Commands::Url { action } => commands::url::run(action, &config),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_url_size() {
        let cli = Cli::try_parse_from(["sbcman", "url", "size", "https://example.com/a.zip"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Url {
                action: UrlAction::Size { .. }
            }
        ));
    }

    #[test]
    fn test_extract_requires_dest_unless_listing() {
        assert!(Cli::try_parse_from(["sbcman", "extract", "a.zip"]).is_err());
        assert!(Cli::try_parse_from(["sbcman", "extract", "a.zip", "--list"]).is_ok());
        assert!(Cli::try_parse_from(["sbcman", "extract", "a.zip", "out"]).is_ok());
    }

    #[test]
    fn test_install_id_conflicts_with_site_packages() {
        assert!(
            Cli::try_parse_from(["sbcman", "install", "a.whl", "--id", "x", "--site-packages"])
                .is_err()
        );
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            load_config(Some(temp.path().join("nope.ini"))),
            Err(CliError::Config(_))
        ));
    }
}
