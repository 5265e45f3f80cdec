//! Profile Storage
//!
//! JSON flat-file persistence for saved connection profiles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use url::Url;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{ConnectionParams, SslMode};

/// A remembered connection, without its password
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_uri: Option<String>,
}

impl SavedProfile {
    /// Builds a profile from resolved params. A connection URI is kept with
    /// its password removed.
    pub fn from_params(name: &str, params: &ConnectionParams, uri: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            host: params.host.clone(),
            port: params.port,
            user: params.user.clone(),
            database: params.database.clone(),
            ssl_mode: params.ssl_mode,
            connection_uri: uri.and_then(strip_password),
        }
    }
}

fn strip_password(uri: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    if url.password().is_some() {
        url.set_password(None).ok()?;
    }
    Some(url.to_string())
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// All saved profiles in insertion order. A missing or empty store is empty.
    async fn list(&self) -> EngineResult<Vec<SavedProfile>>;

    /// Saves a profile, replacing any profile with the same name.
    async fn save(&self, profile: SavedProfile) -> EngineResult<()>;
}

/// Profiles stored as a JSON array in one file
pub struct FileProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> EngineResult<Vec<SavedProfile>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::internal(format!(
                    "Failed to read saved servers file: {}",
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            EngineError::internal(format!("Failed to parse saved servers file: {}", e))
        })
    }

    async fn store(&self, profiles: &[SavedProfile]) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::internal(format!("Failed to create storage directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(profiles)
            .map_err(|e| EngineError::internal(format!("Failed to serialize profiles: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| EngineError::internal(format!("Failed to write saved servers: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EngineError::internal(format!("Failed to replace saved servers: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn list(&self) -> EngineResult<Vec<SavedProfile>> {
        self.load().await
    }

    async fn save(&self, profile: SavedProfile) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut profiles = self.load().await?;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }

        self.store(&profiles).await
    }
}
