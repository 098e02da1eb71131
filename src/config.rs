//! Configuration file handling for mezgeb.
//!
//! The configuration file is stored at `$MEZGEB_HOME/config.json` and holds the server's API URL,
//! network timeouts and the location of the bearer token. The SQLite cache lives beside it.

use crate::db::Db;
use crate::error::Res;
use crate::utils;
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "mezgeb";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const TOKEN_FILE: &str = "token";
const CONFIG_JSON: &str = "config.json";
const CACHE_SQLITE: &str = "cache.sqlite";

pub(crate) const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$MEZGEB_HOME` and from there it loads `$MEZGEB_HOME/config.json`, the bearer token
/// (when there is one) and the SQLite cache.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
    token: Option<String>,
}

impl Config {
    /// Creates the data directory, its subdirectories and:
    /// - Creates an initial `config.json` file pointing at `api_url`, with default settings
    /// - Stores `token`, if given, in the secrets directory
    /// - Creates an empty SQLite cache
    ///
    /// # Errors
    /// - Returns an error if `api_url` is not a URL or if any file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        api_url: &str,
        token: Option<&str>,
    ) -> Res<Self> {
        url::Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the mezgeb home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile {
            api_url: api_url.to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let token = token.map(str::trim).filter(|t| !t.is_empty());
        if let Some(token) = token {
            let token_path = resolve(&root, config_file.token_path());
            utils::write(&token_path, token).await?;
        }

        let sqlite_path = root.join(CACHE_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create the SQLite cache")?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            db,
            sqlite_path,
            token: token.map(str::to_string),
        })
    }

    /// This will
    /// - validate that `mezgeb_home` and its config file exist
    /// - load the config file and the token, if any
    /// - open (and migrate) the SQLite cache
    pub async fn load(mezgeb_home: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = mezgeb_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Mezgeb Home is missing, run 'mezgeb init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let secrets = root.join(SECRETS);
        if !secrets.is_dir() {
            bail!("The secrets directory is missing '{}'", secrets.display())
        }

        let token_path = resolve(&root, config_file.token_path());
        let token = if token_path.is_file() {
            Some(utils::read(&token_path).await?.trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };

        let sqlite_path = root.join(CACHE_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load the SQLite cache")?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            db,
            sqlite_path,
            token,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn api_url(&self) -> &str {
        &self.config_file.api_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.config_file.probe_interval_secs)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        resolve(&self.root, self.config_file.token_path())
    }
}

fn resolve(root: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    root.join(p)
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "mezgeb",
///   "config_version": 1,
///   "api_url": "http://localhost:5000/api",
///   "request_timeout_secs": 30,
///   "probe_interval_secs": 15,
///   "token_path": ".secrets/token"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "mezgeb"
    app_name: String,

    config_version: u8,

    /// The root of the server's REST API, e.g. http://localhost:5000/api
    #[serde(default = "default_api_url")]
    api_url: String,

    /// How long a single request may take before it counts as a connectivity failure
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,

    /// How often `mezgeb watch` checks whether the server is reachable
    #[serde(default = "default_probe_interval_secs")]
    probe_interval_secs: u64,

    /// Path to the bearer token file (optional, relative to config.json or absolute)
    /// Defaults to $MEZGEB_HOME/.secrets/token if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            api_url: default_api_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            token_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from `path` and checks that it belongs to this app.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        ensure!(
            config.request_timeout_secs > 0,
            "request_timeout_secs must be greater than zero"
        );
        ensure!(
            config.probe_interval_secs > 0,
            "probe_interval_secs must be greater than zero"
        );
        url::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid api_url in config file '{}'", config.api_url))?;

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path.as_ref(), data)
            .await
            .context("Unable to write config file")
    }

    /// If None, defaults to $MEZGEB_HOME/.secrets/token
    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("mezgeb_home");

        let config = Config::create(&home, "http://example.com:8080/api", Some(" abc123\n"))
            .await
            .unwrap();
        assert_eq!(config.api_url(), "http://example.com:8080/api");
        assert_eq!(config.token(), Some("abc123"));
        assert!(config.secrets().is_dir());
        assert!(config.sqlite_path().is_file());
        assert_eq!(utils::read(&config.token_path()).await.unwrap(), "abc123");
        drop(config);

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.api_url(), "http://example.com:8080/api");
        assert_eq!(loaded.token(), Some("abc123"));
        assert_eq!(loaded.request_timeout(), Duration::from_secs(30));
        assert_eq!(loaded.probe_interval(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_create_without_token() {
        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path().join("m"), DEFAULT_API_URL, None)
            .await
            .unwrap();
        assert!(config.token().is_none());
        assert!(!config.token_path().exists());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("m");
        Config::create(&home, DEFAULT_API_URL, None).await.unwrap();
        assert!(Config::create(&home, DEFAULT_API_URL, None).await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_url() {
        let dir = TempDir::new().unwrap();
        assert!(Config::create(dir.path().join("m"), "localhost", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert!(format!("{err:#}").contains("mezgeb init"));
    }

    #[tokio::test]
    async fn test_config_file_minimal_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        utils::write(&path, r#"{"app_name": "mezgeb", "config_version": 1}"#)
            .await
            .unwrap();
        let config = ConfigFile::load(&path).await.unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.token_path(), PathBuf::from(SECRETS).join(TOKEN_FILE));
    }

    #[tokio::test]
    async fn test_config_file_invalid_app_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        utils::write(&path, r#"{"app_name": "budget", "config_version": 1}"#)
            .await
            .unwrap();
        let err = ConfigFile::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_serialization_omits_token_path() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("token_path"));
        assert!(json.contains("\"api_url\":\"http://localhost:5000/api\""));
    }
}
