//! Unknown-subject review queue
//!
//! A single JSON array of [`ReviewQueueEntry`] values. Entries are unique by
//! `(source, id, label)` compared case-insensitively; repeats bump
//! `occurrences`. Nothing is ever removed here; curators drain the queue by
//! adding mappings.
//!
//! Writes from one process are serialized by an internal lock and land via a
//! temp file + rename. Separate processes sharing the file may still lose
//! updates.

use crate::error::{MetaError, MetaResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// One queued unknown term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueEntry {
    pub source: String,
    pub id: Option<String>,
    pub label: String,
    pub first_seen_at: DateTime<Utc>,
    pub occurrences: u64,
}

/// A term that could not be mapped to a slug
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSubject {
    pub source: String,
    pub id: Option<String>,
    pub label: String,
}

impl UnknownSubject {
    fn composite_key(&self) -> String {
        composite_key(&self.source, self.id.as_deref(), &self.label)
    }
}

fn composite_key(source: &str, id: Option<&str>, label: &str) -> String {
    format!(
        "{}:{}:{}",
        source.trim().to_lowercase(),
        id.unwrap_or("").trim().to_lowercase(),
        label.trim().to_lowercase()
    )
}

/// Persistent review queue backed by one JSON file
#[derive(Debug)]
pub struct ReviewQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
    tracker: TaskTracker,
}

impl ReviewQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one sighting of an unknown term and return the updated entry
    pub async fn queue_unknown_subject(&self, subject: &UnknownSubject) -> MetaResult<ReviewQueueEntry> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        let key = subject.composite_key();

        let entry = match entries
            .iter_mut()
            .find(|e| composite_key(&e.source, e.id.as_deref(), &e.label) == key)
        {
            Some(existing) => {
                existing.occurrences += 1;
                existing.clone()
            }
            None => {
                let entry = ReviewQueueEntry {
                    source: subject.source.clone(),
                    id: subject.id.clone(),
                    label: subject.label.trim().to_string(),
                    first_seen_at: Utc::now(),
                    occurrences: 1,
                };
                entries.push(entry.clone());
                entry
            }
        };

        self.store(&entries).await?;

        tracing::debug!(
            source = %entry.source,
            label = %entry.label,
            occurrences = entry.occurrences,
            "Queued unknown subject for review"
        );
        Ok(entry)
    }

    /// Queue in the background; failures are logged and dropped.
    ///
    /// Outside a tokio runtime the sighting is logged and skipped.
    pub fn queue_detached(self: &Arc<Self>, subject: UnknownSubject) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    source = %subject.source,
                    label = %subject.label,
                    "No async runtime, review queue write skipped"
                );
                return;
            }
        };

        let queue = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                if let Err(e) = queue.queue_unknown_subject(&subject).await {
                    tracing::warn!(
                        source = %subject.source,
                        label = %subject.label,
                        error = %e,
                        "Failed to queue unknown subject"
                    );
                }
            },
            &handle,
        );
    }

    /// Wait for every detached write issued so far
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// All entries, in insertion order
    pub async fn entries(&self) -> MetaResult<Vec<ReviewQueueEntry>> {
        self.load().await
    }

    async fn load(&self) -> MetaResult<Vec<ReviewQueueEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.error(e.into())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.error(e.into())),
        }
    }

    async fn store(&self, entries: &[ReviewQueueEntry]) -> MetaResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e.into()))?;
        }

        let body = serde_json::to_vec_pretty(entries).map_err(|e| self.error(e.into()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.error(e.into()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error(e.into()))
    }

    fn error(&self, source: shelf_common::Error) -> MetaError {
        MetaError::ReviewQueue {
            path: self.path.display().to_string(),
            source,
        }
    }
}
