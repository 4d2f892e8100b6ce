//! Workspace cache for the channel list and user directory.
//!
//! Both lists are expensive to page through on large workspaces, so they are
//! kept as JSON under `<export_root>/.meta/cache/` and reused until they are
//! older than the TTL.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::api::SlackApi;
use super::retry::{with_retry, RetryPolicy};
use super::types::{SlackChannel, SlackError, SlackUser};

/// Refresh cached users/channels after 24 hours
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const CHANNELS_FILE: &str = "channels.json";
const USERS_FILE: &str = "users.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<C> {
    fetched_at: DateTime<Utc>,
    items: C,
}

/// Lookup from user ID to the name shown in exports.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory(HashMap<String, String>);

impl UserDirectory {
    pub fn from_users(users: &[SlackUser]) -> Self {
        Self(
            users
                .iter()
                .map(|u| (u.id.clone(), u.best_name().to_string()))
                .collect(),
        )
    }

    pub fn get(&self, user_id: &str) -> Option<&str> {
        self.0.get(user_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct WorkspaceCache {
    dir: PathBuf,
    ttl: Duration,
}

impl WorkspaceCache {
    pub fn new(export_root: &Path) -> Self {
        Self {
            dir: export_root.join(".meta").join("cache"),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All conversations visible to the token, sorted by name.
    pub async fn channels(
        &self,
        api: &dyn SlackApi,
        retry: &RetryPolicy,
        refresh: bool,
    ) -> Result<Vec<SlackChannel>, SlackError> {
        if !refresh {
            if let Some(channels) = self.load::<SlackChannel>(CHANNELS_FILE).await {
                return Ok(channels);
            }
        }

        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = with_retry(retry, "conversations.list", || api.list_channels(cursor.as_deref())).await?;
            channels.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        channels.sort_by(|a, b| a.display_name().cmp(b.display_name()));

        tracing::info!("Fetched {} channels", channels.len());
        self.store(CHANNELS_FILE, &channels).await;
        Ok(channels)
    }

    pub async fn users(
        &self,
        api: &dyn SlackApi,
        retry: &RetryPolicy,
        refresh: bool,
    ) -> Result<UserDirectory, SlackError> {
        if !refresh {
            if let Some(users) = self.load::<SlackUser>(USERS_FILE).await {
                return Ok(UserDirectory::from_users(&users));
            }
        }

        let mut users = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = with_retry(retry, "users.list", || api.list_users(cursor.as_deref())).await?;
            users.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!("Fetched {} users", users.len());
        self.store(USERS_FILE, &users).await;
        Ok(UserDirectory::from_users(&users))
    }

    /// Drop both cached lists so the next read goes to the API.
    pub async fn invalidate(&self) -> Result<(), SlackError> {
        for file in [CHANNELS_FILE, USERS_FILE] {
            match tokio::fs::remove_file(self.dir.join(file)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Option<Vec<T>> {
        let path = self.dir.join(file);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<Vec<T>> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(entry.fetched_at);
        let fresh = age
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true);
        if !fresh {
            tracing::debug!("Cache {} expired", path.display());
            return None;
        }
        Some(entry.items)
    }

    /// Cache writes are best effort; a failure only costs a refetch next time.
    async fn store<T: Serialize>(&self, file: &str, items: &[T]) {
        let entry = CacheEntry {
            fetched_at: Utc::now(),
            items,
        };
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let json = serde_json::to_vec_pretty(&entry).map_err(std::io::Error::other)?;
            tokio::fs::write(self.dir.join(file), json).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to write cache {}: {}", file, e);
        }
    }
}
