//! JSON file backed recipient directory
//!
//! Reads the bot's `users.json` (object keyed by user id, each entry with a
//! `chatId` and an `isBlocked` flag) and `banned.json` (object keyed by
//! banned user id). Files are re-read on every call so edits made by other
//! tools are picked up. Fields this crate does not use are preserved on write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::RecipientDirectory;
use crate::config::DirectoryConfig;
use crate::models::Recipient;
use crate::utils::error::DirectoryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chat_id: Option<serde_json::Value>,

    #[serde(default)]
    is_blocked: bool,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl UserEntry {
    fn to_recipient(&self, id: &str) -> Recipient {
        let delivery_address = match &self.chat_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => id.to_string(),
        };

        Recipient {
            id: id.to_string(),
            delivery_address,
            is_live: !self.is_blocked,
        }
    }
}

/// Directory stored as two JSON files
pub struct JsonFileDirectory {
    users_path: PathBuf,
    banned_path: PathBuf,

    /// Serializes read-modify-write cycles on `users.json`
    write_lock: Mutex<()>,
}

impl JsonFileDirectory {
    pub fn new(users_path: impl Into<PathBuf>, banned_path: impl Into<PathBuf>) -> Self {
        Self {
            users_path: users_path.into(),
            banned_path: banned_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Use `users.json` and `banned.json` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("users.json"), dir.join("banned.json"))
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(config.users_path.clone(), config.banned_path.clone())
    }

    pub fn users_path(&self) -> &Path {
        &self.users_path
    }

    async fn read_users(&self) -> Result<BTreeMap<String, UserEntry>, DirectoryError> {
        read_json_map(&self.users_path).await
    }

    async fn read_banned(&self) -> Result<BTreeMap<String, serde_json::Value>, DirectoryError> {
        read_json_map(&self.banned_path).await
    }

    async fn write_users(&self, users: &BTreeMap<String, UserEntry>) -> Result<(), DirectoryError> {
        let json = serde_json::to_string_pretty(users).map_err(|source| DirectoryError::Malformed {
            path: self.users_path.display().to_string(),
            source,
        })?;

        tokio::fs::write(&self.users_path, json)
            .await
            .map_err(|source| DirectoryError::Io {
                path: self.users_path.display().to_string(),
                source,
            })
    }
}

/// Numeric ids sort numerically, the rest lexically after them
fn directory_order(users: &BTreeMap<String, UserEntry>) -> Vec<(&String, &UserEntry)> {
    let mut entries: Vec<_> = users.iter().collect();
    entries.sort_by_key(|(id, _)| (id.parse::<i64>().map_err(|_| ()), (*id).clone()));
    entries
}

/// Missing files read as empty maps
async fn read_json_map<T>(path: &Path) -> Result<BTreeMap<String, T>, DirectoryError>
where
    T: serde::de::DeserializeOwned,
{
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Directory file missing, treating as empty");
            return Ok(BTreeMap::new());
        }
        Err(source) => {
            return Err(DirectoryError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    serde_json::from_str(&content).map_err(|source| DirectoryError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

#[async_trait]
impl RecipientDirectory for JsonFileDirectory {
    async fn list(&self) -> Result<Vec<Recipient>, DirectoryError> {
        let users = self.read_users().await?;
        Ok(directory_order(&users)
            .into_iter()
            .map(|(id, entry)| entry.to_recipient(id))
            .collect())
    }

    async fn is_banned(&self, id: &str) -> Result<bool, DirectoryError> {
        Ok(self.read_banned().await?.contains_key(id))
    }

    async fn mark_not_live(&self, id: &str) -> Result<(), DirectoryError> {
        let _guard = self.write_lock.lock().await;

        let mut users = self.read_users().await?;
        let entry = users
            .get_mut(id)
            .ok_or_else(|| DirectoryError::UnknownRecipient(id.to_string()))?;

        if entry.is_blocked {
            return Ok(());
        }
        entry.is_blocked = true;

        self.write_users(&users).await?;
        tracing::info!(recipient = %id, "Marked recipient as blocked");
        Ok(())
    }

    async fn live_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        let users = self.read_users().await?;
        let banned = self.read_banned().await?;

        Ok(directory_order(&users)
            .into_iter()
            .filter(|(id, _)| !banned.contains_key(id.as_str()))
            .map(|(id, entry)| entry.to_recipient(id))
            .filter(|recipient| recipient.is_live)
            .collect())
    }
}
