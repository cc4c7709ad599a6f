//! Recipient directory
//!
//! The dispatcher reads recipients from a [`RecipientDirectory`] and writes
//! liveness changes back to it. Two implementations ship with the crate:
//!
//! - [`MemoryDirectory`] - in-process map, for embedding and tests
//! - [`JsonFileDirectory`] - `users.json` / `banned.json` files on disk

pub mod json_file;

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::models::Recipient;
use crate::utils::error::DirectoryError;

pub use json_file::JsonFileDirectory;

/// Key-value store of recipients
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// All recipients in directory order
    async fn list(&self) -> Result<Vec<Recipient>, DirectoryError>;

    /// Whether the recipient is on the ban list
    async fn is_banned(&self, id: &str) -> Result<bool, DirectoryError>;

    /// Flag a recipient as permanently unreachable
    async fn mark_not_live(&self, id: &str) -> Result<(), DirectoryError>;

    /// Live, non-banned recipients in directory order
    async fn live_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        let mut live = Vec::new();
        for recipient in self.list().await? {
            if recipient.is_live && !self.is_banned(&recipient.id).await? {
                live.push(recipient);
            }
        }
        Ok(live)
    }
}

/// In-memory directory
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    recipients: RwLock<Vec<Recipient>>,
    banned: RwLock<HashSet<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with recipients
    pub fn with_recipients(recipients: impl IntoIterator<Item = Recipient>) -> Self {
        Self {
            recipients: RwLock::new(recipients.into_iter().collect()),
            banned: RwLock::new(HashSet::new()),
        }
    }

    /// Add or replace a recipient
    pub async fn upsert(&self, recipient: Recipient) {
        let mut recipients = self.recipients.write().await;
        match recipients.iter_mut().find(|r| r.id == recipient.id) {
            Some(existing) => *existing = recipient,
            None => recipients.push(recipient),
        }
    }

    pub async fn ban(&self, id: impl Into<String>) {
        self.banned.write().await.insert(id.into());
    }

    pub async fn unban(&self, id: &str) {
        self.banned.write().await.remove(id);
    }

    /// Look up one recipient
    pub async fn get(&self, id: &str) -> Option<Recipient> {
        self.recipients
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.recipients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.recipients.read().await.is_empty()
    }
}

#[async_trait]
impl RecipientDirectory for MemoryDirectory {
    async fn list(&self) -> Result<Vec<Recipient>, DirectoryError> {
        Ok(self.recipients.read().await.clone())
    }

    async fn is_banned(&self, id: &str) -> Result<bool, DirectoryError> {
        Ok(self.banned.read().await.contains(id))
    }

    async fn mark_not_live(&self, id: &str) -> Result<(), DirectoryError> {
        let mut recipients = self.recipients.write().await;
        let recipient = recipients
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DirectoryError::UnknownRecipient(id.to_string()))?;
        recipient.is_live = false;
        Ok(())
    }

    async fn live_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        let banned = self.banned.read().await;
        Ok(self
            .recipients
            .read()
            .await
            .iter()
            .filter(|r| r.is_live && !banned.contains(&r.id))
            .cloned()
            .collect())
    }
}
