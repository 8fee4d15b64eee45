//! Catalog item metadata.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One downloadable item (a game bundle) as described by the catalog.
///
/// The pipeline only ever mutates `installed` and `install_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageMetadata {
    /// Stable identifier; also the install subdirectory name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version string as published.
    pub version: String,
    /// Where the bundle is downloaded from.
    pub download_url: String,
    /// Entry point relative to the install directory.
    pub entry_point: String,
    /// Where the bundle was installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// Whether the bundle is installed.
    pub installed: bool,
    /// Launcher script copied next to the install directory.
    #[serde(rename = "startScript", skip_serializing_if = "Option::is_none")]
    pub start_script: Option<String>,
    /// Icon copied into the image directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PackageMetadata {
    /// Create metadata with an id, name and download URL.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            download_url: download_url.into(),
            ..Default::default()
        }
    }

    /// Set the entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the start script.
    pub fn with_start_script(mut self, script: impl Into<String>) -> Self {
        self.start_script = Some(script.into());
        self
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Final path segment of the download URL, ignoring any query string.
    ///
    /// Falls back to `<id>.zip` when the URL has no usable file name.
    pub fn artifact_name(&self) -> String {
        let without_query = self
            .download_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        without_query
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != ".." && *name != ".")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.zip", self.id))
    }

    /// Record a successful installation.
    pub fn mark_installed(&mut self, install_path: PathBuf) {
        self.installed = true;
        self.install_path = Some(install_path);
    }
}
