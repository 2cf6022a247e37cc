//! Directory snapshots: remember what existed before `quarto render` ran so
//! the files it produced can be moved or cleaned up afterwards.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative paths (files and directories) present under `root` at one point in time.
#[derive(Debug)]
pub struct DirSnapshot {
    root: PathBuf,
    entries: BTreeSet<PathBuf>,
}

impl DirSnapshot {
    pub fn take(root: &Path) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            entries: list_entries(root)?,
        })
    }

    /// Entries that exist now but did not when the snapshot was taken,
    /// relative to the root and sorted parents-first.
    pub fn new_entries(&self) -> Result<Vec<PathBuf>> {
        let current = list_entries(&self.root)?;
        Ok(current.difference(&self.entries).cloned().collect())
    }

    /// Like [`new_entries`](Self::new_entries), files only.
    pub fn new_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .new_entries()?
            .into_iter()
            .filter(|rel| self.root.join(rel).is_file())
            .collect())
    }

    /// Delete everything created since the snapshot. Returns how many files
    /// were removed.
    pub fn remove_new_files(&self) -> Result<usize> {
        let added = self.new_entries()?;
        let mut removed = 0;

        for rel in &added {
            let path = self.root.join(rel);
            if path.is_file() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }

        // Children sort after their parents, so walk backwards.
        for rel in added.iter().rev() {
            let path = self.root.join(rel);
            if path.is_dir() {
                let _ = std::fs::remove_dir(&path);
            }
        }

        tracing::debug!(root = %self.root.display(), removed, "cleaned up render artifacts");
        Ok(removed)
    }
}

fn list_entries(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut entries = BTreeSet::new();

    if !root.exists() {
        return Ok(entries);
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.insert(rel);
    }

    Ok(entries)
}
