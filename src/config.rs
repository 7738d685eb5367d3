//! On-disk configuration
//!
//! `config.json` holds the OAuth app registration, the drive root and the
//! persisted credential (the latter is owned by [`crate::auth::JsonFileStore`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{Credential, JsonFileStore, OAuthApp, AUTHORIZE_URL, TOKEN_URL};
use crate::error::DriveError;

/// Default Graph item root of the signed-in user's drive
pub const DEFAULT_ROOT: &str = "/drive/root";

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["Files.ReadWrite.All".to_string(), "offline_access".to_string()]
}

/// Application registration and drive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    pub redirect_url: String,
    /// Graph path of the folder that `/` maps to, e.g. `/drive/root` or
    /// `/drive/special/approot`
    #[serde(default = "default_root")]
    pub root: String,
}

impl DriveConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, DriveError> {
        debug!("Reading config from {}", path.display());
        let data = std::fs::read(path).map_err(|e| {
            DriveError::local_io_error_full("could not read config", path.display().to_string(), e.to_string())
        })?;
        let config: DriveConfig = serde_json::from_slice(&data)
            .map_err(|e| DriveError::config_error(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DriveError> {
        if self.client_id.trim().is_empty() {
            return Err(DriveError::config_error_with_field("client_id cannot be empty", "client_id"));
        }
        if self.redirect_url.trim().is_empty() {
            return Err(DriveError::config_error_with_field("redirect_url cannot be empty", "redirect_url"));
        }
        if !self.root.starts_with('/') {
            return Err(DriveError::config_error_with_field("root must start with /", "root"));
        }
        Ok(())
    }

    pub fn oauth_app(&self) -> OAuthApp {
        OAuthApp {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: self.scopes.clone(),
            redirect_url: self.redirect_url.clone(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

/// Older layout: app settings in one file, tokens in a separate secret store
#[derive(Debug, Deserialize)]
struct LegacyConfig {
    #[serde(flatten)]
    app: DriveConfig,
    #[serde(alias = "secretStore")]
    secret_store: PathBuf,
}

/// Merge an old-style config and the secret store it points to into a
/// single `config.json` at `target`.
///
/// A relative `secret_store` is resolved against the old config's
/// directory. Returns the migrated app settings.
pub async fn migrate_config(source: &Path, target: &Path) -> Result<DriveConfig, DriveError> {
    let legacy: LegacyConfig = serde_json::from_slice(&read_file(source, "source config").await?)
        .map_err(|e| DriveError::config_error(format!("{}: {}", source.display(), e)))?;
    legacy.app.validate()?;

    let secret_path = match source.parent() {
        Some(dir) if legacy.secret_store.is_relative() => dir.join(&legacy.secret_store),
        _ => legacy.secret_store.clone(),
    };
    let credential: Credential = serde_json::from_slice(&read_file(&secret_path, "source secret").await?)
        .map_err(|e| DriveError::config_error(format!("{}: {}", secret_path.display(), e)))?;

    let document = match serde_json::to_value(&legacy.app)? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    JsonFileStore::new(target).save_with(document, &credential).await?;

    info!("Migrated {} and {} into {}", source.display(), secret_path.display(), target.display());
    Ok(legacy.app)
}

async fn read_file(path: &Path, what: &str) -> Result<Vec<u8>, DriveError> {
    tokio::fs::read(path).await.map_err(|e| {
        DriveError::local_io_error_full(format!("could not read {}", what), path.display().to_string(), e.to_string())
    })
}

/// Resolve where `config.json` lives.
///
/// An explicit path wins. Otherwise `<config dir>/onedrive/config.json`,
/// creating the directory (0700) if needed, or the working directory when
/// the platform has no config dir.
pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf, DriveError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let dir = match dirs::config_dir() {
        Some(base) => {
            let dir = base.join("onedrive");
            if !dir.exists() {
                create_private_dir(&dir)?;
            }
            dir
        }
        None => std::env::current_dir().map_err(|e| {
            DriveError::config_error(format!(
                "could neither get system config dir nor current working dir: {}",
                e
            ))
        })?,
    };

    Ok(dir.join("config.json"))
}

fn create_private_dir(dir: &Path) -> Result<(), DriveError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| {
        DriveError::local_io_error_full("could not create config dir", dir.display().to_string(), e.to_string())
    })
}
