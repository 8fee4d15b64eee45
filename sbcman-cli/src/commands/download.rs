//! Download command - fetch and install a game from the catalog.

use std::sync::Arc;

use clap::Args;
use console::style;
use sbcman::config::ConfigFile;
use sbcman::manager::{shared_catalog, DownloadManager, DownloadObserver, TaskState};
use sbcman::package::{GameCatalog, JsonCatalog, PackageMetadata};

use super::{http_client, on_interrupt};
use crate::error::CliError;
use crate::progress::TerminalObserver;

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Game id in the catalog
    pub id: String,

    /// Download URL; required if the game is not in the catalog
    #[arg(long)]
    pub url: Option<String>,

    /// Display name for a new catalog entry
    #[arg(long)]
    pub name: Option<String>,

    /// Entry point relative to the install directory
    #[arg(long)]
    pub entry_point: Option<String>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl DownloadArgs {
    /// Catalog entry for this request, with command-line overrides applied.
    fn resolve_item(&self, catalog: &JsonCatalog) -> Result<PackageMetadata, CliError> {
        let mut item = match catalog.get(&self.id) {
            Some(existing) => existing.clone(),
            None => {
                let url = self.url.clone().ok_or_else(|| {
                    CliError::Usage(format!(
                        "'{}' is not in the catalog at {}; pass --url",
                        self.id,
                        catalog.path().display()
                    ))
                })?;
                let name = self.name.clone().unwrap_or_else(|| self.id.clone());
                PackageMetadata::new(&self.id, name, url)
            }
        };

        if let Some(url) = &self.url {
            item.download_url = url.clone();
        }
        if let Some(entry_point) = &self.entry_point {
            item = item.with_entry_point(entry_point.clone());
        }
        Ok(item)
    }
}

pub fn run(args: DownloadArgs, config: &ConfigFile) -> Result<(), CliError> {
    let catalog = JsonCatalog::load(&config.catalog_file)?;
    let item = args.resolve_item(&catalog)?;
    let name = item.name.clone();

    let manager = Arc::new(
        DownloadManager::new(config.to_manager_config(), http_client(config))
            .with_catalog(shared_catalog(catalog)),
    );
    {
        let manager = Arc::clone(&manager);
        on_interrupt(move || manager.cancel());
    }

    println!("{} {}", style("Downloading").cyan().bold(), name);

    let observer = Arc::new(TerminalObserver::new(args.quiet));
    if !manager.download(item, Some(observer.clone() as Arc<dyn DownloadObserver>)) {
        let message = observer
            .outcome()
            .map(|(_, message)| message)
            .unwrap_or_else(|| "Download could not be started".to_string());
        return Err(CliError::Download(message));
    }
    manager.join();

    match (manager.state(), observer.outcome()) {
        (TaskState::Complete, Some((true, message))) => {
            println!("{} {}", style("✓").green().bold(), message);
            Ok(())
        }
        (_, Some((_, message))) => Err(CliError::Download(message)),
        (state, None) => Err(CliError::Download(format!("Download ended in state {}", state))),
    }
}
