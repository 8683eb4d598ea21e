// ABOUTME: Share watcher feed and file operations over the mounted network share.
// ABOUTME: The watcher scans recursively and reports files modified since the mtime cursor.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use valet_core::{Checkpoint, FeedSource, FetchBatch};
use walkdir::WalkDir;

/// Feed over the mounted share: every file whose mtime is newer than the
/// cursor becomes one item. Mounting the share is outside this process;
/// the watcher only observes the mount point.
pub struct ShareWatcher {
    root: PathBuf,
}

impl ShareWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FeedSource for ShareWatcher {
    type Item = Value;

    fn name(&self) -> &str {
        "share"
    }

    async fn poll(&mut self, since: &Checkpoint) -> Result<FetchBatch<Value>> {
        let root = self.root.clone();
        let cutoff = since.as_timestamp();
        let (items, newest) =
            tokio::task::spawn_blocking(move || scan_share(&root, cutoff))
                .await
                .context("share scan task failed")??;
        let checkpoint = newest
            .map(Checkpoint::Timestamp)
            .unwrap_or_else(|| since.clone());
        Ok(FetchBatch { items, checkpoint })
    }
}

/// Walk the share and collect files modified after `cutoff`, oldest first.
/// Returns the items and the newest mtime among them.
fn scan_share(
    root: &Path,
    cutoff: Option<DateTime<Utc>>,
) -> Result<(Vec<Value>, Option<DateTime<Utc>>)> {
    let mut changed: Vec<(DateTime<Utc>, Value)> = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.context("share walk failed")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .with_context(|| format!("no mtime for {}", entry.path().display()))?
            .into();
        // Files stamped exactly at the cursor are already delivered.
        if cutoff.is_some_and(|c| modified <= c) {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        changed.push((
            modified,
            json!({
                "path": rel.to_string_lossy(),
                "size": meta.len(),
                "modified": modified.to_rfc3339(),
            }),
        ));
    }

    changed.sort_by_key(|(modified, _)| *modified);
    let newest = changed.last().map(|(modified, _)| *modified);
    let items = changed.into_iter().map(|(_, item)| item).collect();
    Ok((items, newest))
}

/// File operations under the mount point, for the document agent.
pub struct ShareStore {
    root: PathBuf,
}

impl ShareStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a share-relative path, rejecting escapes from the mount point
    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            bail!("share path must be relative: {}", rel);
        }
        if rel_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!("share path may not traverse upward: {}", rel);
        }
        Ok(self.root.join(rel_path))
    }

    /// List entries of a directory on the share
    pub async fn list_dir(&self, rel: &str) -> Result<Vec<Value>> {
        let dir = self.resolve(rel)?;
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            let modified: Option<DateTime<Utc>> = meta.modified().ok().map(Into::into);
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "size": meta.len(),
                "is_dir": meta.is_dir(),
                "modified": modified.map(|m| m.to_rfc3339()),
            }));
        }
        Ok(entries)
    }

    /// Read a file's contents
    pub async fn read_file(&self, rel: &str) -> Result<Vec<u8>> {
        let path = self.resolve(rel)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }

    /// Write contents to a file, creating parent directories as needed
    pub async fn write_file(&self, rel: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Delete a file
    pub async fn delete_file(&self, rel: &str) -> Result<()> {
        let path = self.resolve(rel)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to delete {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_reports_new_files_only_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"first").unwrap();

        let mut watcher = ShareWatcher::new(dir.path());
        let first = watcher.poll(&Checkpoint::Origin).await.unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0]["path"], "a.txt");
        assert!(matches!(first.checkpoint, Checkpoint::Timestamp(_)));

        // Nothing changed: same cursor, no items.
        let quiet = watcher.poll(&first.checkpoint).await.unwrap();
        assert!(quiet.items.is_empty());
        assert_eq!(quiet.checkpoint, first.checkpoint);

        // A new file appears after the cursor.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::write(dir.path().join("b.txt"), b"second").unwrap();
        let second = watcher.poll(&first.checkpoint).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["path"], "b.txt");
    }

    #[tokio::test]
    async fn test_watcher_orders_items_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), b"1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.path().join("new.txt"), b"2").unwrap();

        let mut watcher = ShareWatcher::new(dir.path());
        let batch = watcher.poll(&Checkpoint::Origin).await.unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0]["path"], "old.txt");
        assert_eq!(batch.items[1]["path"], "new.txt");
    }

    #[tokio::test]
    async fn test_store_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        store.write_file("docs/note.txt", b"remember this").await.unwrap();
        let contents = store.read_file("docs/note.txt").await.unwrap();
        assert_eq!(contents, b"remember this");

        let entries = store.list_dir("docs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "note.txt");

        store.delete_file("docs/note.txt").await.unwrap();
        assert!(store.read_file("docs/note.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_store_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        assert!(store.read_file("../outside.txt").await.is_err());
        assert!(store.read_file("/etc/passwd").await.is_err());
    }
}
