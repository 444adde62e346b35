use super::file_node::{ErrorReason, NodeKind};
use super::ignore_rules::IgnoreRules;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/*
 * This module is the single place where directory contents are read from disk. It
 * lists exactly one directory level at a time, filters entries through the ignore
 * rules before touching their metadata, and classifies each survivor. Failures are
 * reported as data (error entries or a failed listing), never as `Err`, because the
 * tree shows them as rows rather than aborting the scan.
 */

/*
 * One entry returned by a directory listing, already classified. `size` and
 * `modified` are only filled for regular files.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ListedEntry {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryListing {
    Entries(Vec<ListedEntry>),
    // The directory itself could not be listed.
    Failed(ErrorReason),
}

/*
 * Abstraction over enumeration of a single directory level so that the catalog can be
 * driven by a mock in tests. Implementations must apply the ignore rules before any
 * further processing and return entries sorted directories-first, then by name
 * case-insensitively.
 */
pub trait FileSystemScannerOperations: Send + Sync {
    fn list_entries(&self, dir: &Path, rules: &IgnoreRules) -> DirectoryListing;
}

pub struct CoreFileSystemScanner {}

impl CoreFileSystemScanner {
    pub fn new() -> Self {
        CoreFileSystemScanner {}
    }

    fn classify_entry(path: PathBuf, name: String) -> ListedEntry {
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => ListedEntry {
                path,
                name,
                kind: NodeKind::Directory,
                size: None,
                modified: None,
            },
            Ok(metadata) => ListedEntry {
                path,
                name,
                kind: NodeKind::File,
                size: Some(metadata.len()),
                modified: metadata.modified().ok(),
            },
            Err(e) => {
                log::warn!("FileSystemScanner: Could not stat {path:?}: {e}");
                ListedEntry {
                    path,
                    name,
                    kind: NodeKind::Error(ErrorReason::from_io_kind(e.kind())),
                    size: None,
                    modified: None,
                }
            }
        }
    }
}

impl Default for CoreFileSystemScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemScannerOperations for CoreFileSystemScanner {
    fn list_entries(&self, dir: &Path, rules: &IgnoreRules) -> DirectoryListing {
        log::trace!("FileSystemScanner: Listing {dir:?}");
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                log::warn!("FileSystemScanner: Failed to list directory {dir:?}: {e}");
                return DirectoryListing::Failed(ErrorReason::from_io_kind(e.kind()));
            }
        };

        let mut entries = Vec::new();
        let mut ignored_count = 0usize;
        for entry_result in read_dir {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("FileSystemScanner: Skipping unreadable entry in {dir:?}: {e}");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if rules.is_ignored(&name) {
                ignored_count += 1;
                continue;
            }
            entries.push(Self::classify_entry(dir.join(&name), name));
        }

        sort_listed_entries(&mut entries);
        log::debug!(
            "FileSystemScanner: Listed {} entries in {:?} ({} ignored).",
            entries.len(),
            dir,
            ignored_count
        );
        DirectoryListing::Entries(entries)
    }
}

// Directories first, then case-insensitive name; the exact name breaks ties.
pub fn sort_listed_entries(entries: &mut [ListedEntry]) {
    entries.sort_by(|a, b| {
        let a_dir = a.kind == NodeKind::Directory;
        let b_dir = b.kind == NodeKind::Directory;
        match (a_dir, b_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name)),
        }
    });
}
