//! Self-update commands.

use std::sync::Arc;

use clap::Args;
use console::style;
use sbcman::config::ConfigFile;
use sbcman::update::{UpdateService, UpdateStage};

use super::{http_client, on_interrupt};
use crate::error::CliError;
use crate::progress::TerminalObserver;

#[derive(Debug, Args)]
pub struct CheckUpdateArgs {
    /// Repository to check instead of the configured one
    #[arg(long)]
    pub repo: Option<String>,
}

#[derive(Debug, Args)]
pub struct SelfUpdateArgs {
    /// Repository to check instead of the configured one
    #[arg(long)]
    pub repo: Option<String>,

    /// Install this wheel URL without checking the release feed
    #[arg(long)]
    pub url: Option<String>,

    /// Keep the downloaded wheel after installing
    #[arg(long)]
    pub keep: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

fn service(config: &ConfigFile, repo: Option<String>) -> UpdateService {
    let repo = repo.unwrap_or_else(|| config.repository_url.clone());
    UpdateService::new(&config.to_manager_config(), repo, http_client(config))
}

pub fn check(args: CheckUpdateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let service = service(config, args.repo);
    let result = service.check_for_update();

    match result.latest_version {
        None => Err(CliError::Update(
            "No release information available".to_string(),
        )),
        Some(latest) if result.update_available => {
            println!(
                "{} {} -> {}",
                style("Update available:").green().bold(),
                service.current_version(),
                latest
            );
            if let Some(url) = result.download_url {
                println!("  {}", url);
            }
            Ok(())
        }
        Some(latest) => {
            println!(
                "Up to date ({}, latest release {})",
                service.current_version(),
                latest
            );
            Ok(())
        }
    }
}

pub fn self_update(args: SelfUpdateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let service = Arc::new(service(config, args.repo));

    let url = match args.url {
        Some(url) => url,
        None => {
            let result = service.check_for_update();
            match (result.update_available, result.download_url) {
                (true, Some(url)) => {
                    println!(
                        "{} {} -> {}",
                        style("Updating").cyan().bold(),
                        service.current_version(),
                        result.latest_version.unwrap_or_default()
                    );
                    url
                }
                (false, Some(_)) => {
                    println!("Already up to date ({})", service.current_version());
                    return Ok(());
                }
                (_, None) => {
                    return Err(CliError::Update(
                        "No release information available".to_string(),
                    ))
                }
            }
        }
    };

    {
        let service = Arc::clone(&service);
        on_interrupt(move || service.cancel());
    }

    let observer = Arc::new(TerminalObserver::new(args.quiet));
    if !service.start_update(&url, observer.clone()) {
        let message = observer
            .outcome()
            .map(|(_, message)| message)
            .unwrap_or_else(|| "Update could not be started".to_string());
        return Err(CliError::Update(message));
    }
    service.join();

    let status = service.status();
    if !args.keep {
        if let Err(e) = service.cleanup() {
            tracing::warn!(error = %e, "Failed to remove downloaded update");
        }
    }

    match status.stage {
        UpdateStage::Complete => {
            println!("{} {}", style("✓").green().bold(), status.message);
            println!("Restart SBC-Man to use the new version.");
            Ok(())
        }
        _ => Err(CliError::Update(status.message)),
    }
}
