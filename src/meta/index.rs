use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use super::types::{AnalysisMeta, ChannelMeta, IndexDocument, MetaError};
use crate::slack::ts_to_datetime;

pub const META_DIR: &str = ".meta";
pub const INDEX_FILE: &str = "index.json";

/// Persistent map from channel ID to its last synced state.
///
/// Reads and writes go through an `RwLock`; saves are additionally
/// serialized so two concurrent saves never race on the temp file rename.
pub struct MetadataIndex {
    path: PathBuf,
    state: RwLock<IndexDocument>,
    save_lock: Mutex<()>,
}

impl MetadataIndex {
    /// Location of the index inside an export root.
    pub fn path_for(export_root: &Path) -> PathBuf {
        export_root.join(META_DIR).join(INDEX_FILE)
    }

    pub fn empty(path: PathBuf) -> Self {
        Self::with_document(path, IndexDocument::default())
    }

    fn with_document(path: PathBuf, document: IndexDocument) -> Self {
        Self {
            path,
            state: RwLock::new(document),
            save_lock: Mutex::new(()),
        }
    }

    /// Load the index; a missing or unreadable file yields an empty index.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<IndexDocument>(&bytes) {
                Ok(doc) => {
                    tracing::debug!("Loaded index with {} channels", doc.channels.len());
                    doc
                }
                Err(e) => {
                    tracing::warn!("Index {} is corrupt, starting empty: {}", path.display(), e);
                    IndexDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexDocument::default(),
            Err(e) => {
                tracing::warn!("Could not read index {}: {}", path.display(), e);
                IndexDocument::default()
            }
        };
        Self::with_document(path, document)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self) -> Result<(), MetaError> {
        self.save_to(&self.path).await
    }

    /// Atomically write a snapshot: temp file in the same directory, fsync, rename.
    pub async fn save_to(&self, path: &Path) -> Result<(), MetaError> {
        let _guard = self.save_lock.lock().await;

        let json = {
            let mut state = self.state.write().await;
            state.last_updated = Some(Utc::now());
            serde_json::to_vec_pretty(&*state)?
        };

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &json))
            .await
            .map_err(|e| MetaError::Io(std::io::Error::other(e)))??;

        tracing::debug!("Saved index to {}", path.display());
        Ok(())
    }

    /// Insert a bare record unless the channel is already known.
    pub async fn ensure_channel(&self, id: &str, name: &str) {
        let mut state = self.state.write().await;
        state
            .channels
            .entry(id.to_string())
            .or_insert_with(|| ChannelMeta::new(id, name));
    }

    /// Upsert the result of a successful export.
    ///
    /// `last_message_ts` of `None` keeps the previously recorded message time.
    pub async fn record_download(
        &self,
        id: &str,
        name: &str,
        path: &str,
        message_count: u64,
        last_message_ts: Option<&str>,
    ) {
        let mut state = self.state.write().await;
        let entry = state
            .channels
            .entry(id.to_string())
            .or_insert_with(|| ChannelMeta::new(id, name));

        entry.name = name.to_string();
        entry.path = path.to_string();
        entry.message_count = message_count;
        if let Some(ts) = last_message_ts {
            entry.last_message_ts = Some(ts.to_string());
            entry.last_message_at = ts_to_datetime(ts);
        }
        entry.last_downloaded_at = Some(Utc::now());
    }

    /// Attach an analysis record. Analysis never creates a channel entry.
    pub async fn record_analysis(&self, id: &str, analysis: AnalysisMeta) -> Result<(), MetaError> {
        let mut state = self.state.write().await;
        let entry = state
            .channels
            .get_mut(id)
            .ok_or_else(|| MetaError::ChannelNotFound(id.to_string()))?;
        entry.analysis = Some(analysis);
        Ok(())
    }

    pub async fn lookup_by_id(&self, id: &str) -> Option<ChannelMeta> {
        self.state.read().await.channels.get(id).cloned()
    }

    pub async fn lookup_by_name(&self, name: &str) -> Option<ChannelMeta> {
        self.state
            .read()
            .await
            .channels
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Find the channel whose export lives at `path` (relative to the export root).
    pub async fn lookup_by_path(&self, path: &str) -> Option<ChannelMeta> {
        self.state
            .read()
            .await
            .channels
            .values()
            .find(|c| c.path == path)
            .cloned()
    }

    pub async fn channels(&self) -> Vec<ChannelMeta> {
        self.state.read().await.channels.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.channels.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> IndexDocument {
        self.state.read().await.clone()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MetaError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
