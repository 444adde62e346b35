/*
 * Figures shown next to the tree: how many entries are loaded, how many are selected,
 * and how large the selected files are in bytes, characters and estimated tokens.
 * Also the per-project summary with timestamps and a file-type breakdown.
 */
use super::file_node::FileNode;
use super::path_catalog::PathCatalog;
use super::projects::Project;
use super::selection::SelectionEngine;
use super::tokenizer_utils::TokenCounterOperations;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionStats {
    pub total_items: usize,
    pub selected_items: usize,
    pub selected_files: usize,
    pub total_size: u64,
    pub total_chars: usize,
    pub total_tokens: usize,
}

impl SelectionStats {
    pub fn summary_line(&self) -> String {
        format!(
            "Total Items: {} | Selected Items: {} | Selected Files Size: {} | Chars: {} | Tokens: {}",
            self.total_items,
            self.selected_items,
            format_size(self.total_size),
            self.total_chars,
            self.total_tokens
        )
    }
}

/*
 * Sizes come from the files on disk at call time, not from the stat taken during
 * enumeration. Files that cannot be read contribute their size (when known) but no
 * characters or tokens.
 */
pub fn compute_selection_stats(
    catalog: &PathCatalog,
    selection: &SelectionEngine,
    token_counter: &dyn TokenCounterOperations,
) -> SelectionStats {
    let files = selection.selected_file_paths(catalog);
    let mut stats = SelectionStats {
        total_items: catalog.nodes().filter(|n| n.is_selectable()).count(),
        selected_items: selection.selected_paths(catalog).len(),
        selected_files: files.len(),
        ..SelectionStats::default()
    };

    for file in &files {
        match fs::metadata(file) {
            Ok(metadata) => stats.total_size += metadata.len(),
            Err(e) => {
                log::debug!("Stats: Cannot stat {file:?}: {e}");
                continue;
            }
        }
        match fs::read(file) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                stats.total_chars += text.chars().count();
                stats.total_tokens += token_counter.count_tokens(&text);
            }
            Err(e) => log::debug!("Stats: Cannot read {file:?}: {e}"),
        }
    }
    log::trace!("Stats: {stats:?}");
    stats
}

// "512 B", "1.5 KB", "3.0 MB", "1.2 GB".
pub fn format_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size_bytes < KB {
        format!("{size_bytes} B")
    } else if size_bytes < MB {
        format!("{:.1} KB", size_bytes as f64 / KB as f64)
    } else if size_bytes < GB {
        format!("{:.1} MB", size_bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", size_bytes as f64 / GB as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCount {
    // Lowercased with leading dot; empty for files without extension.
    pub extension: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInfo {
    pub name: String,
    pub created: OffsetDateTime,
    pub modified: OffsetDateTime,
    pub total_files: usize,
    pub extensions: Vec<ExtensionCount>,
}

fn extension_of(node: &FileNode) -> String {
    Path::new(node.name())
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/*
 * Summarizes the project and the files currently loaded in the tree. Extensions are
 * ordered by count, most frequent first, ties by extension.
 */
pub fn project_info(name: &str, project: &Project, catalog: &PathCatalog) -> ProjectInfo {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_files = 0;
    for node in catalog.nodes().filter(|n| n.is_file()) {
        total_files += 1;
        *counts.entry(extension_of(node)).or_insert(0) += 1;
    }

    let mut extensions: Vec<ExtensionCount> = counts
        .into_iter()
        .map(|(extension, count)| ExtensionCount {
            extension,
            count,
            percentage: count as f64 * 100.0 / total_files as f64,
        })
        .collect();
    extensions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.extension.cmp(&b.extension)));

    ProjectInfo {
        name: name.to_string(),
        created: project.created,
        modified: project.modified,
        total_files,
        extensions,
    }
}
