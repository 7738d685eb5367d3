//! Credential persistence
//!
//! The credential lives in the same `config.json` as the app registration.
//! Saving patches only the three token keys so the rest of the document
//! survives untouched.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::DriveError;

/// OAuth2 access/refresh token pair with its expiry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Always UTC; RFC3339 on disk
    #[serde(default)]
    pub expiry: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry,
        }
    }

    /// Whether a refresh grant can be attempted at all
    pub fn can_renew(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Load/save contract for the persisted credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Credential, DriveError>;

    async fn save(&self, credential: &Credential) -> Result<(), DriveError>;
}

/// Credential stored inside a JSON config document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Replace the whole document with `document` plus the token keys.
    ///
    /// The file is written to a sibling `.json.tmp` created with mode 0600
    /// and renamed into place.
    pub async fn save_with(
        &self,
        mut document: serde_json::Map<String, serde_json::Value>,
        credential: &Credential,
    ) -> Result<(), DriveError> {
        document.insert("access_token".into(), credential.access_token.clone().into());
        document.insert("refresh_token".into(), credential.refresh_token.clone().into());
        document.insert("expiry".into(), serde_json::to_value(credential.expiry)?);

        let data = serde_json::to_vec_pretty(&serde_json::Value::Object(document))?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| {
            DriveError::local_io_error_full("failed to write credential store", self.path.display().to_string(), e.to_string())
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        // a stale tmp file would keep its old mode
        match fs::remove_file(&tmp).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(io_err(e)),
            _ => {}
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await.map_err(io_err)?;
        file.write_all(&data).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        debug!("Persisted credential to {}", self.path.display());
        Ok(())
    }

    async fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>, DriveError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(serde_json::Map::new()),
            Err(e) => {
                return Err(DriveError::local_io_error_full(
                    "failed to read credential store",
                    self.path.display().to_string(),
                    e.to_string(),
                ))
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&data)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(DriveError::config_error(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn load(&self) -> Result<Credential, DriveError> {
        let document = self.read_document().await?;
        let credential: Credential = serde_json::from_value(serde_json::Value::Object(document))?;
        debug!("Loaded credential from {} (expires {})", self.path.display(), credential.expiry);
        Ok(credential)
    }

    async fn save(&self, credential: &Credential) -> Result<(), DriveError> {
        let document = self.read_document().await?;
        self.save_with(document, credential).await
    }
}

/// Credential held in memory. Counts saves so callers can observe persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credential: Mutex<Credential>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(credential),
            saves: Mutex::new(0),
        }
    }

    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Credential, DriveError> {
        Ok(self.credential.lock().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), DriveError> {
        *self.credential.lock().await = credential.clone();
        *self.saves.lock().await += 1;
        Ok(())
    }
}
