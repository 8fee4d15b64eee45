//! INI configuration file.
//!
//! ```ini
//! [paths]
//! games_dir = /mnt/SDCARD/Roms/PORTS
//! downloads_dir = /tmp/sbcman/downloads
//! temp_dir = /tmp/sbcman
//! log_dir = ~/.local/share/sbcman/logs
//! catalog_file = ~/.local/share/sbcman/games.json
//!
//! [install]
//! install_as_pip = true
//! alternate_base_dir = /roms/ports
//! image_dir = /mnt/SDCARD/Imgs/PORTS
//! site_packages_dirs = /usr/lib/python3/dist-packages, ~/.local/lib/python3/site-packages
//!
//! [extract]
//! max_file_size = 104857600
//! max_total_size = 1073741824
//! max_compression_ratio = 100
//!
//! [network]
//! timeout_secs = 30
//!
//! [update]
//! repository_url = https://github.com/hblok/sbc-man
//!
//! [logging]
//! level = info
//! ```
//!
//! Every key is optional; missing keys keep their defaults. A leading `~/`
//! in path values expands to the home directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::manager::config::{ExtractionLimits, ManagerConfig, DEFAULT_INSTALLER_TIMEOUT};

/// Repository checked for self-updates when none is configured.
pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/hblok/sbc-man";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings read from the INI file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub games_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_dir: PathBuf,
    /// JSON catalog of known and installed games.
    pub catalog_file: PathBuf,

    /// Route `.whl` installs through pip first.
    pub install_as_pip: bool,
    pub alternate_base_dir: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
    pub site_packages_dirs: Vec<PathBuf>,

    pub limits: ExtractionLimits,
    pub timeout: Duration,
    pub repository_url: String,
    pub log_level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sbcman");
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sbcman");

        Self {
            games_dir: data_dir.join("games"),
            downloads_dir: cache_dir.join("downloads"),
            temp_dir: cache_dir.join("tmp"),
            log_dir: data_dir.join("logs"),
            catalog_file: data_dir.join("games.json"),
            install_as_pip: false,
            alternate_base_dir: None,
            image_dir: None,
            site_packages_dirs: Vec::new(),
            limits: ExtractionLimits::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ConfigFile {
    /// `<config dir>/sbcman/config.ini`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sbcman").join("config.ini"))
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();
        let get = |section: &str, key: &str| {
            ini.section(Some(section))
                .and_then(|props| props.get(key))
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        if let Some(v) = get("paths", "games_dir") {
            config.games_dir = expand_path(v);
        }
        if let Some(v) = get("paths", "downloads_dir") {
            config.downloads_dir = expand_path(v);
        }
        if let Some(v) = get("paths", "temp_dir") {
            config.temp_dir = expand_path(v);
        }
        if let Some(v) = get("paths", "log_dir") {
            config.log_dir = expand_path(v);
        }
        if let Some(v) = get("paths", "catalog_file") {
            config.catalog_file = expand_path(v);
        }

        if let Some(v) = get("install", "install_as_pip") {
            config.install_as_pip = parse_bool("install", "install_as_pip", v)?;
        }
        config.alternate_base_dir = get("install", "alternate_base_dir").map(expand_path);
        config.image_dir = get("install", "image_dir").map(expand_path);
        if let Some(v) = get("install", "site_packages_dirs") {
            config.site_packages_dirs = v
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(expand_path)
                .collect();
        }

        if let Some(v) = get("extract", "max_file_size") {
            config.limits.max_file_size = parse_number("extract", "max_file_size", v)?;
        }
        if let Some(v) = get("extract", "max_total_size") {
            config.limits.max_total_size = parse_number("extract", "max_total_size", v)?;
        }
        if let Some(v) = get("extract", "max_compression_ratio") {
            let ratio: f64 = parse_number("extract", "max_compression_ratio", v)?;
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    section: "extract",
                    key: "max_compression_ratio",
                    value: v.to_string(),
                    reason: "must be a positive number".to_string(),
                });
            }
            config.limits.max_compression_ratio = ratio;
        }

        if let Some(v) = get("network", "timeout_secs") {
            config.timeout = Duration::from_secs(parse_number("network", "timeout_secs", v)?);
        }

        if let Some(v) = get("update", "repository_url") {
            config.repository_url = v.to_string();
        }
        if let Some(v) = get("logging", "level") {
            config.log_level = v.to_lowercase();
        }

        Ok(config)
    }

    /// Core pipeline configuration for these settings.
    pub fn to_manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(self.games_dir.clone())
            .with_downloads_dir(self.downloads_dir.clone())
            .with_temp_dir(self.temp_dir.clone())
            .with_trusted_installer(self.install_as_pip)
            .with_timeout(self.timeout)
            .with_installer_timeout(DEFAULT_INSTALLER_TIMEOUT)
            .with_limits(self.limits);

        if let Some(dir) = &self.alternate_base_dir {
            config = config.with_alternate_base_dir(dir.clone());
        }
        if let Some(dir) = &self.image_dir {
            config = config.with_image_dir(dir.clone());
        }
        for dir in &self.site_packages_dirs {
            config = config.with_site_packages_dir(dir.clone());
        }
        config
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(contents: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }
}

fn expand_path(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}

fn parse_bool(section: &'static str, key: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_number<T>(section: &'static str, key: &'static str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        section,
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = "\
[paths]
games_dir = /mnt/SDCARD/Roms/PORTS
downloads_dir = /tmp/dl
temp_dir = /tmp/sbc
catalog_file = /mnt/SDCARD/games.json

[install]
install_as_pip = yes
alternate_base_dir = /roms/ports
image_dir = /mnt/SDCARD/Imgs
site_packages_dirs = /usr/lib/python3/dist-packages, /opt/site

[extract]
max_file_size = 2048
max_compression_ratio = 50.5

[network]
timeout_secs = 5

[update]
repository_url = https://example.com/repo

[logging]
level = DEBUG
";

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: ConfigFile = "".parse().unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.repository_url, DEFAULT_REPOSITORY_URL);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_full_file() {
        let config: ConfigFile = FULL.parse().unwrap();

        assert_eq!(config.games_dir, PathBuf::from("/mnt/SDCARD/Roms/PORTS"));
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.catalog_file, PathBuf::from("/mnt/SDCARD/games.json"));
        assert!(config.install_as_pip);
        assert_eq!(config.alternate_base_dir, Some(PathBuf::from("/roms/ports")));
        assert_eq!(
            config.site_packages_dirs,
            vec![
                PathBuf::from("/usr/lib/python3/dist-packages"),
                PathBuf::from("/opt/site")
            ]
        );
        assert_eq!(config.limits.max_file_size, 2048);
        assert_eq!(
            config.limits.max_total_size,
            ExtractionLimits::default().max_total_size
        );
        assert_eq!(config.limits.max_compression_ratio, 50.5);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.repository_url, "https://example.com/repo");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_to_manager_config() {
        let manager = FULL.parse::<ConfigFile>().unwrap().to_manager_config();

        assert!(manager.use_trusted_installer);
        assert_eq!(
            manager.game_base_candidates(),
            vec![
                PathBuf::from("/roms/ports"),
                PathBuf::from("/mnt/SDCARD/Roms/PORTS")
            ]
        );
        assert_eq!(manager.updates_dir(), PathBuf::from("/tmp/sbc/updates"));
        assert_eq!(manager.image_dir, Some(PathBuf::from("/mnt/SDCARD/Imgs")));
        assert_eq!(manager.site_packages_dirs.len(), 2);
        assert_eq!(manager.limits.max_file_size, 2048);
    }

    #[test]
    fn test_invalid_values() {
        let err = "[install]\ninstall_as_pip = maybe\n"
            .parse::<ConfigFile>()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "install_as_pip", .. }
        ));

        let err = "[extract]\nmax_file_size = big\n"
            .parse::<ConfigFile>()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "max_file_size", .. }
        ));

        for ratio in ["-1", "0", "nan", "NaN", "inf"] {
            let err = format!("[extract]\nmax_compression_ratio = {}\n", ratio)
                .parse::<ConfigFile>()
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::InvalidValue { key: "max_compression_ratio", .. }
                ),
                "ratio {} accepted",
                ratio
            );
        }
    }

    #[test]
    fn test_home_expansion() {
        let config: ConfigFile = "[paths]\ngames_dir = ~/games\n".parse().unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.games_dir, home.join("games"));
        }
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_or_default(&temp.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());

        assert!(matches!(
            ConfigFile::load(&temp.path().join("missing.ini")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[logging]\nlevel = warn\n").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.log_level, "warn");
    }
}
