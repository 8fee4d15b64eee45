//! CLI error type.

use std::fmt;

use sbcman::config::ConfigError;
use sbcman::manager::ManagerError;
use sbcman::package::CatalogError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(String),
    /// Archive inspection or extraction failed.
    Extract(ManagerError),
    /// An install finished unsuccessfully.
    Install(String),
    /// A download run finished unsuccessfully.
    Download(String),
    /// The catalog could not be read or written.
    Catalog(CatalogError),
    /// Update check or self-update failed.
    Update(String),
    /// A URL probe failed.
    Url(String),
    /// Invalid combination of arguments.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Extract(e) => write!(f, "Extraction failed: {}", e),
            CliError::Install(msg) => write!(f, "{}", msg),
            CliError::Download(msg) => write!(f, "{}", msg),
            CliError::Catalog(e) => write!(f, "Catalog error: {}", e),
            CliError::Update(msg) => write!(f, "Update failed: {}", msg),
            CliError::Url(msg) => write!(f, "{}", msg),
            CliError::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Extract(e) => Some(e),
            CliError::Catalog(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ManagerError> for CliError {
    fn from(e: ManagerError) -> Self {
        CliError::Extract(e)
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e)
    }
}
