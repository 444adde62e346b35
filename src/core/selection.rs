/*
 * Selection flags for the nodes of the current catalog generation. The engine holds
 * the set of selected paths; the catalog holds the nodes. Selecting a directory pushes
 * the value down to every loaded descendant. Nothing ever propagates upward.
 */
use super::path_catalog::PathCatalog;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum SelectionError {
    NotFound(PathBuf),
    NotSelectable(PathBuf),
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionError::NotFound(path) => write!(f, "No node for path {path:?}"),
            SelectionError::NotSelectable(path) => {
                write!(f, "Node {path:?} is an error entry and cannot be selected")
            }
        }
    }
}

impl std::error::Error for SelectionError {}

pub type Result<T> = std::result::Result<T, SelectionError>;

#[derive(Debug, Default)]
pub struct SelectionEngine {
    selected: HashSet<PathBuf>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        SelectionEngine::default()
    }

    // Called by the catalog when it starts a new generation.
    pub(crate) fn reset(&mut self) {
        self.selected.clear();
    }

    /*
     * Decides the initial flag of a freshly created node: selected when its own path is
     * pending or when its parent is selected right now.
     */
    pub(crate) fn mark_created(
        &mut self,
        path: &Path,
        parent: Option<&Path>,
        pending: &HashSet<PathBuf>,
    ) -> bool {
        let selected =
            pending.contains(path) || parent.is_some_and(|p| self.selected.contains(p));
        if selected {
            self.selected.insert(path.to_path_buf());
        }
        selected
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    /*
     * Sets the flag on `path` and, for directories, on every loaded descendant that is
     * not an error row. Returns `Ok(true)` when at least one flag changed.
     */
    pub fn set_selected(&mut self, catalog: &PathCatalog, path: &Path, value: bool) -> Result<bool> {
        let node = catalog
            .get(path)
            .ok_or_else(|| SelectionError::NotFound(path.to_path_buf()))?;
        if !node.is_selectable() {
            return Err(SelectionError::NotSelectable(path.to_path_buf()));
        }

        let mut changed = self.apply(path, value);
        if node.is_dir() {
            for descendant in catalog.loaded_descendants(path) {
                if descendant.is_selectable() {
                    changed |= self.apply(descendant.path(), value);
                }
            }
        }
        if changed {
            log::trace!("SelectionEngine: Set {path:?} to {value}.");
        }
        Ok(changed)
    }

    fn apply(&mut self, path: &Path, value: bool) -> bool {
        if value {
            self.selected.insert(path.to_path_buf())
        } else {
            self.selected.remove(path)
        }
    }

    // Flips the node's flag and returns the new value.
    pub fn toggle(&mut self, catalog: &PathCatalog, path: &Path) -> Result<bool> {
        let new_value = !self.is_selected(path);
        self.set_selected(catalog, path, new_value)?;
        Ok(new_value)
    }

    /*
     * Paths of all selected nodes in the catalog, sorted. Error rows and unloaded
     * placeholders never appear here.
     */
    pub fn selected_paths(&self, catalog: &PathCatalog) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .selected
            .iter()
            .filter(|p| catalog.get(p).is_some_and(|n| n.is_selectable()))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    // Selected regular files that still exist on disk, sorted.
    pub fn selected_file_paths(&self, catalog: &PathCatalog) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .selected
            .iter()
            .filter(|p| catalog.get(p).is_some_and(|n| n.is_file()))
            .filter(|p| p.is_file())
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    // Returns how many flags were cleared.
    pub fn deselect_all(&mut self) -> usize {
        let count = self.selected.len();
        self.selected.clear();
        log::debug!("SelectionEngine: Deselected {count} nodes.");
        count
    }

    /*
     * Selects every loaded, selectable node. Unloaded directories stay unloaded; their
     * children inherit the selection when they are expanded later.
     */
    pub fn select_all_loaded(&mut self, catalog: &PathCatalog) -> usize {
        let mut newly_selected = 0;
        for node in catalog.nodes() {
            if node.is_selectable() && self.selected.insert(node.path().to_path_buf()) {
                newly_selected += 1;
            }
        }
        log::debug!("SelectionEngine: Selected {newly_selected} additional nodes.");
        newly_selected
    }
}
