//! URL probe commands.

use clap::Subcommand;
use console::style;
use indicatif::HumanBytes;
use sbcman::config::ConfigFile;
use sbcman::manager::NetworkClient;

use super::http_client;
use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum UrlAction {
    /// Check that a URL answers a HEAD request with a 2xx status
    Check { url: String },
    /// Print the Content-Length a URL reports
    Size { url: String },
}

pub fn run(action: UrlAction, config: &ConfigFile) -> Result<(), CliError> {
    let client = http_client(config);

    match action {
        UrlAction::Check { url } => {
            if client.check(&url) {
                println!("{} {}", style("reachable").green(), url);
                Ok(())
            } else {
                Err(CliError::Url(format!("{} is not accessible", url)))
            }
        }
        UrlAction::Size { url } => match client.size(&url) {
            Some(size) => {
                println!("{} ({} bytes)", HumanBytes(size), size);
                Ok(())
            }
            None => Err(CliError::Url(format!("No size reported for {}", url))),
        },
    }
}
