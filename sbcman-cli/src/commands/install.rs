//! Install command - install a local game bundle or wheel.

use std::path::PathBuf;

use clap::Args;
use console::style;
use sbcman::config::ConfigFile;
use sbcman::manager::{InstallRequest, InstallTarget, PackageInstaller};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Bundle or wheel to install
    pub artifact: PathBuf,

    /// Game id; the bundle is installed under <games_dir>/<id>
    #[arg(long, conflicts_with = "site_packages")]
    pub id: Option<String>,

    /// Install into the configured site-packages directories instead
    #[arg(long)]
    pub site_packages: bool,

    /// Entry point relative to the install directory, made executable
    #[arg(long)]
    pub entry_point: Option<String>,

    /// Start script copied next to the install directory
    #[arg(long)]
    pub start_script: Option<String>,

    /// Icon copied into the configured image directory
    #[arg(long)]
    pub icon: Option<String>,
}

impl InstallArgs {
    fn target(&self, config: &ConfigFile) -> Result<InstallTarget, CliError> {
        let manager = config.to_manager_config();
        if self.site_packages {
            return Ok(InstallTarget::site_packages(manager.site_packages_dirs));
        }

        let id = match &self.id {
            Some(id) => id.clone(),
            None => self
                .artifact
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(|stem| stem.trim_end_matches(".tar").to_string())
                .ok_or_else(|| CliError::Usage("Cannot derive a game id; use --id".to_string()))?,
        };
        Ok(InstallTarget::game(id, manager.game_base_candidates()))
    }
}

pub fn run(args: InstallArgs, config: &ConfigFile) -> Result<(), CliError> {
    let mut request = InstallRequest::new(&args.artifact, args.target(config)?);
    if let Some(entry_point) = &args.entry_point {
        request = request.with_entry_point(entry_point.clone());
    }
    if let Some(script) = &args.start_script {
        request = request.with_start_script(script.clone());
    }
    if let Some(icon) = &args.icon {
        request = request.with_icon(icon.clone());
    }

    let installer = PackageInstaller::new(&config.to_manager_config());
    let result = installer.install(&request);

    if !result.success {
        return Err(CliError::Install(result.message));
    }

    println!("{} {}", style("✓").green().bold(), result.message);
    if let Some(path) = result.install_path {
        println!("  Installed to {}", path.display());
    }
    Ok(())
}
