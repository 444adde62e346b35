/*
 * The live editing state of the active project: the directories in use, the ignore
 * list, the three free-text fields, and the tree with its selection. `ProjectStore`
 * copies persisted projects into this state and back out of it; everything the user
 * does between those points happens here.
 *
 * A selection restored from disk is staged first and only handed to the catalog on
 * the next rebuild, where it becomes the pending set of that generation.
 */
use super::config::{MergerConfig, RefreshSelectionPolicy};
use super::file_system::FileSystemScannerOperations;
use super::ignore_rules::{IgnoreRules, normalize_rule_list};
use super::path_catalog::{self, CatalogError, PathCatalog};
use super::path_utils;
use super::selection::{self, SelectionEngine};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    pub added: usize,
    pub removed: usize,
    pub auto_selected: usize,
}

pub struct SessionData {
    root_dir: PathBuf,
    output_dir: PathBuf,
    ignore_rules: Vec<String>,
    default_rules_text: String,
    project_rules_text: String,
    prompt_text: String,
    staged_selection: HashSet<PathBuf>,
    catalog: PathCatalog,
    selection: SelectionEngine,
}

impl SessionData {
    pub fn new(config: &MergerConfig, scanner: Arc<dyn FileSystemScannerOperations>) -> Self {
        let home = config.home_dir();
        let root_dir = home
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let output_dir = config
            .default_output_dir()
            .unwrap_or_else(|| root_dir.join(&config.output_dir_name));
        SessionData {
            root_dir,
            output_dir,
            ignore_rules: normalize_rule_list(&config.default_ignore_rules),
            default_rules_text: String::new(),
            project_rules_text: String::new(),
            prompt_text: String::new(),
            staged_selection: HashSet::new(),
            catalog: PathCatalog::new(scanner, config.max_depth, home),
            selection: SelectionEngine::new(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn set_root_dir(&mut self, root: PathBuf) {
        self.root_dir = root;
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn set_output_dir(&mut self, output: PathBuf) {
        self.output_dir = output;
    }

    pub fn ignore_rules(&self) -> &[String] {
        &self.ignore_rules
    }

    // Replaces the rule list without touching the tree.
    pub fn set_ignore_rule_list(&mut self, rules: &[String]) {
        self.ignore_rules = normalize_rule_list(rules);
    }

    pub fn default_rules_text(&self) -> &str {
        &self.default_rules_text
    }

    pub fn set_default_rules_text(&mut self, text: &str) {
        self.default_rules_text = text.trim().to_string();
    }

    pub fn project_rules_text(&self) -> &str {
        &self.project_rules_text
    }

    pub fn set_project_rules_text(&mut self, text: &str) {
        self.project_rules_text = text.trim().to_string();
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn set_prompt_text(&mut self, text: &str) {
        self.prompt_text = text.trim().to_string();
    }

    pub fn stage_selection(&mut self, paths: HashSet<PathBuf>) {
        self.staged_selection = paths;
    }

    pub fn staged_selection(&self) -> &HashSet<PathBuf> {
        &self.staged_selection
    }

    pub fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    /*
     * Rebuilds the tree at the live root with the staged selection as pending set. When
     * the catalog had to fall back to the home directory, the live root follows it. On
     * failure the staged selection is kept so that it is not lost from persistence.
     */
    pub fn rebuild_tree(&mut self) -> path_catalog::Result<PathBuf> {
        self.catalog
            .set_ignore_rules(IgnoreRules::new(&self.ignore_rules));
        let pending = std::mem::take(&mut self.staged_selection);
        match self
            .catalog
            .build(&self.root_dir, pending.clone(), &mut self.selection)
        {
            Ok(used_root) => {
                if used_root != self.root_dir {
                    log::info!(
                        "SessionData: Root {:?} unusable, continuing with {:?}.",
                        self.root_dir,
                        used_root
                    );
                }
                self.root_dir = used_root.clone();
                Ok(used_root)
            }
            Err(e) => {
                log::error!("SessionData: Failed to build tree: {e}");
                self.staged_selection = pending;
                Err(e)
            }
        }
    }

    /*
     * The selection that should be written to disk. With a tree built this is the live
     * selection plus restored paths below directories that were never expanded (and
     * still exist on disk); otherwise whatever is still staged.
     */
    pub fn current_selection_for_persistence(&self) -> Vec<PathBuf> {
        if self.catalog.is_built() {
            let mut paths = self.selection.selected_paths(&self.catalog);
            paths.extend(
                self.catalog
                    .unmaterialized_pending()
                    .filter(|p| p.exists())
                    .cloned(),
            );
            paths.sort();
            paths.dedup();
            paths
        } else {
            let mut staged: Vec<PathBuf> = self.staged_selection.iter().cloned().collect();
            staged.sort();
            staged
        }
    }

    /*
     * Rebuilds the current root preserving the selection and re-expanding the
     * directories that were open before. With `AutoSelectNew`, entries that did not
     * exist in the previous tree come back selected.
     */
    pub fn refresh(&mut self, policy: RefreshSelectionPolicy) -> path_catalog::Result<RefreshSummary> {
        let was_built = self.catalog.is_built();
        let before: HashSet<PathBuf> = self
            .catalog
            .nodes()
            .filter(|n| n.is_selectable())
            .map(|n| n.path().to_path_buf())
            .collect();
        if was_built {
            self.staged_selection = self
                .current_selection_for_persistence()
                .into_iter()
                .collect();
        }
        let expanded = self.catalog.expanded_directories();

        self.rebuild_tree()?;

        for dir in expanded {
            if self.catalog.get(&dir).is_some_and(|n| n.is_dir()) {
                if let Err(e) = self.catalog.expand(&dir, &mut self.selection) {
                    log::debug!("SessionData: Could not re-expand {dir:?}: {e}");
                }
            }
        }

        let after: HashSet<PathBuf> = self
            .catalog
            .nodes()
            .filter(|n| n.is_selectable())
            .map(|n| n.path().to_path_buf())
            .collect();
        let mut summary = RefreshSummary {
            added: after.difference(&before).count(),
            removed: before.difference(&after).count(),
            auto_selected: 0,
        };

        if was_built && policy == RefreshSelectionPolicy::AutoSelectNew {
            let mut new_paths: Vec<&PathBuf> = after.difference(&before).collect();
            new_paths.sort();
            for path in new_paths {
                if !self.selection.is_selected(path) {
                    match self.selection.set_selected(&self.catalog, path, true) {
                        Ok(_) => summary.auto_selected += 1,
                        Err(e) => log::debug!("SessionData: Could not auto-select {path:?}: {e}"),
                    }
                }
            }
        }
        log::debug!("SessionData: Refresh finished: {summary:?}");
        Ok(summary)
    }

    /*
     * Switches the tree to a new root with an empty selection. Picking the current
     * root again is a refresh instead. A path that is not an existing directory is
     * rejected and leaves the session untouched.
     */
    pub fn change_root(
        &mut self,
        new_root: &Path,
        policy: RefreshSelectionPolicy,
    ) -> path_catalog::Result<PathBuf> {
        let normalized = path_utils::normalize_path(new_root);
        if self.catalog.is_built() && self.catalog.root() == Some(normalized.as_path()) {
            self.refresh(policy)?;
            return Ok(normalized);
        }
        if !normalized.exists() {
            return Err(CatalogError::NotFound(normalized));
        }
        if !normalized.is_dir() {
            return Err(CatalogError::NotADirectory(normalized));
        }
        self.root_dir = normalized;
        self.staged_selection.clear();
        self.rebuild_tree()
    }

    /*
     * Installs a new ignore list and rebuilds the tree so the change is visible,
     * preserving the current selection where the entries survive.
     */
    pub fn apply_ignore_rules(&mut self, rules: &[String]) -> path_catalog::Result<RefreshSummary> {
        self.set_ignore_rule_list(rules);
        if !self.catalog.is_built() {
            return Ok(RefreshSummary::default());
        }
        self.refresh(RefreshSelectionPolicy::PreserveOnly)
    }

    pub fn expand(&mut self, path: &Path) -> path_catalog::Result<bool> {
        self.catalog.expand(path, &mut self.selection)
    }

    pub fn expand_all(&mut self, path: &Path) -> path_catalog::Result<usize> {
        self.catalog.expand_all(path, &mut self.selection)
    }

    pub fn toggle(&mut self, path: &Path) -> selection::Result<bool> {
        let selected = self.selection.toggle(&self.catalog, path)?;
        if !selected {
            self.catalog.discard_pending(path);
        }
        Ok(selected)
    }

    /*
     * Deselecting also forgets restored paths at or below `path`, so nothing under it
     * comes back selected when a collapsed directory is expanded later.
     */
    pub fn set_selected(&mut self, path: &Path, value: bool) -> selection::Result<bool> {
        let mut changed = self.selection.set_selected(&self.catalog, path, value)?;
        if !value {
            changed |= self.catalog.discard_pending(path) > 0;
        }
        Ok(changed)
    }

    pub fn select_all_loaded(&mut self) -> usize {
        self.selection.select_all_loaded(&self.catalog)
    }

    pub fn deselect_all(&mut self) -> usize {
        let dropped = self.catalog.clear_pending();
        if dropped > 0 {
            log::debug!("SessionData: Forgot {dropped} restored paths.");
        }
        self.selection.deselect_all()
    }

    pub fn selected_file_paths(&self) -> Vec<PathBuf> {
        self.selection.selected_file_paths(&self.catalog)
    }
}
