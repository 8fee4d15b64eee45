//! Release feed parsing.
//!
//! The feed is the GitHub "latest release" document. Only `tag_name` and
//! the asset list are read; everything else is ignored.

use serde::Deserialize;
use url::Url;

use crate::manager::error::{ManagerError, ManagerResult};

/// A published release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Tag such as `v1.2.0`.
    #[serde(default)]
    pub tag_name: String,
    /// Attached files.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A file attached to a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Asset {
    /// File name.
    #[serde(default)]
    pub name: String,
    /// Direct download URL.
    #[serde(default)]
    pub browser_download_url: String,
}

impl Release {
    /// Parse a feed document.
    pub fn parse(json: &str) -> ManagerResult<Self> {
        serde_json::from_str(json).map_err(|e| ManagerError::ReleaseFeed(e.to_string()))
    }

    /// Version from the tag, without the `v` prefix. `None` if untagged.
    pub fn version(&self) -> Option<&str> {
        let version = self.tag_name.trim().trim_start_matches('v');
        (!version.is_empty()).then_some(version)
    }

    /// First asset whose name ends in `.whl`.
    pub fn wheel(&self) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|asset| asset.name.ends_with(".whl") && !asset.browser_download_url.is_empty())
    }
}

/// Latest-release endpoint for a repository URL.
///
/// `https://github.com/<owner>/<repo>` maps to the GitHub API; any other
/// URL gets `/releases/latest` appended.
pub fn api_url(repository_url: &str) -> String {
    let trimmed = repository_url.trim().trim_end_matches('/');

    if let Ok(url) = Url::parse(trimmed) {
        if url.host_str() == Some("github.com") {
            let repo = url.path().trim_matches('/').trim_end_matches(".git");
            return format!("https://api.github.com/repos/{}/releases/latest", repo);
        }
    }

    format!("{}/releases/latest", trimmed)
}
