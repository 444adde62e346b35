use crate::core::merge_writer::NoopMergeProgress;
use crate::core::path_utils;
use crate::core::stats::{self, ProjectInfo, SelectionStats};
use crate::core::{
    CatalogError, CoreFileSystemScanner, CoreMergeWriter, CorePreferencesStorage,
    CoreTikTokenCounter, FileSystemScannerOperations, LoadOutcome, MergeError, MergeJob,
    MergeOutcome, MergeProgressUpdate, MergeRequest, MergeWriterOperations, MergerConfig,
    PreferencesStorageOperations, ProjectError, ProjectStore, RefreshSummary, SelectionError,
    SessionData, TokenCounterOperations, spawn_merge,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub enum AppLogicError {
    Catalog(CatalogError),
    Selection(SelectionError),
    Project(ProjectError),
    Merge(MergeError),
    MergeInProgress,
    Io(std::io::Error),
}

impl From<CatalogError> for AppLogicError {
    fn from(err: CatalogError) -> Self {
        AppLogicError::Catalog(err)
    }
}

impl From<SelectionError> for AppLogicError {
    fn from(err: SelectionError) -> Self {
        AppLogicError::Selection(err)
    }
}

impl From<ProjectError> for AppLogicError {
    fn from(err: ProjectError) -> Self {
        AppLogicError::Project(err)
    }
}

impl From<MergeError> for AppLogicError {
    fn from(err: MergeError) -> Self {
        AppLogicError::Merge(err)
    }
}

impl From<std::io::Error> for AppLogicError {
    fn from(err: std::io::Error) -> Self {
        AppLogicError::Io(err)
    }
}

impl std::fmt::Display for AppLogicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppLogicError::Catalog(e) => write!(f, "{e}"),
            AppLogicError::Selection(e) => write!(f, "{e}"),
            AppLogicError::Project(e) => write!(f, "{e}"),
            AppLogicError::Merge(e) => write!(f, "{e}"),
            AppLogicError::MergeInProgress => write!(f, "A merge is already running"),
            AppLogicError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for AppLogicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppLogicError::Catalog(e) => Some(e),
            AppLogicError::Selection(e) => Some(e),
            AppLogicError::Project(e) => Some(e),
            AppLogicError::Merge(e) => Some(e),
            AppLogicError::Io(e) => Some(e),
            AppLogicError::MergeInProgress => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppLogicError>;

/*
 * Owns all mutable application state: the live session (tree, selection, texts), the
 * project store and an optional background merge. Every user action goes through one
 * of the `on_*`/command methods below; each either succeeds and updates the status
 * message, or returns an error and leaves the state unchanged.
 */
pub struct MergerAppLogic {
    pub(crate) config: MergerConfig,
    pub(crate) session: SessionData,
    pub(crate) store: ProjectStore,
    pub(crate) token_counter: Arc<dyn TokenCounterOperations>,
    pub(crate) merge_writer: Arc<dyn MergeWriterOperations>,
    pub(crate) active_merge: Option<MergeJob>,
    pub(crate) last_progress: Option<MergeProgressUpdate>,
    pub(crate) status: String,
}

impl MergerAppLogic {
    pub fn new(
        config: MergerConfig,
        scanner: Arc<dyn FileSystemScannerOperations>,
        storage: Arc<dyn PreferencesStorageOperations>,
        token_counter: Arc<dyn TokenCounterOperations>,
        merge_writer: Arc<dyn MergeWriterOperations>,
    ) -> Self {
        let session = SessionData::new(&config, scanner);
        let store = ProjectStore::new(storage, config.clone());
        MergerAppLogic {
            config,
            session,
            store,
            token_counter,
            merge_writer,
            active_merge: None,
            last_progress: None,
            status: "Ready".to_string(),
        }
    }

    // Wires the real filesystem, preferences file, tokenizer and writer.
    pub fn with_core_services(config: MergerConfig) -> Self {
        let storage = Arc::new(CorePreferencesStorage::from_config(&config));
        Self::new(
            config,
            Arc::new(CoreFileSystemScanner::new()),
            storage,
            Arc::new(CoreTikTokenCounter::new()),
            Arc::new(CoreMergeWriter::new()),
        )
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        log::info!("AppLogic: {}", self.status);
    }

    pub fn status_message(&self) -> &str {
        &self.status
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    pub fn is_tree_ready(&self) -> bool {
        self.session.catalog().is_built()
    }

    /*
     * Loads the preferences, applies the active project and builds the first tree
     * level. When no usable root exists the tree stays empty and the status asks for a
     * new root; the loaded projects are kept either way.
     */
    pub fn startup(&mut self) -> LoadOutcome {
        let outcome = self.store.load(&mut self.session);
        match self.session.rebuild_tree() {
            Ok(root) => {
                let message = match &outcome {
                    LoadOutcome::Recovered { .. } => {
                        format!("Preferences were unreadable; started fresh at {}", root.display())
                    }
                    _ => format!(
                        "Project {} loaded: {}",
                        self.store.current_name(),
                        root.display()
                    ),
                };
                self.set_status(message);
            }
            Err(e) => {
                self.set_status(format!("{e}. Please choose a new root directory."));
            }
        }
        outcome
    }

    // --- Tree interaction ---

    pub fn on_toggle(&mut self, path: &Path) -> Result<bool> {
        Ok(self.session.toggle(path)?)
    }

    pub fn on_set_selected(&mut self, path: &Path, value: bool) -> Result<bool> {
        Ok(self.session.set_selected(path, value)?)
    }

    pub fn on_expand(&mut self, path: &Path) -> Result<bool> {
        Ok(self.session.expand(path)?)
    }

    pub fn on_expand_all(&mut self, path: &Path) -> Result<usize> {
        Ok(self.session.expand_all(path)?)
    }

    pub fn select_all_loaded(&mut self) -> usize {
        let count = self.session.select_all_loaded();
        self.set_status("All loaded items selected");
        count
    }

    pub fn deselect_all(&mut self) -> usize {
        let count = self.session.deselect_all();
        self.set_status("All items deselected");
        count
    }

    pub fn refresh_directory(&mut self) -> Result<RefreshSummary> {
        let summary = self.session.refresh(self.config.refresh_policy)?;
        self.set_status(format!(
            "Refreshed {}: {} new, {} removed",
            self.session.root_dir().display(),
            summary.added,
            summary.removed
        ));
        Ok(summary)
    }

    // --- Project settings ---

    /*
     * Switches the tree to another root with an empty selection and persists it.
     * Choosing the current root again refreshes instead. A path that is not an
     * existing directory is rejected before anything changes.
     */
    pub fn change_root_directory(&mut self, new_root: &Path) -> Result<PathBuf> {
        let used = self
            .session
            .change_root(new_root, self.config.refresh_policy)?;
        self.store.save(&self.session)?;
        self.set_status(format!("Loaded directory: {}", used.display()));
        Ok(used)
    }

    pub fn change_output_directory(&mut self, new_output: &Path) -> Result<PathBuf> {
        let normalized = path_utils::normalize_path(new_output);
        fs::create_dir_all(&normalized)?;
        self.session.set_output_dir(normalized.clone());
        self.store.save(&self.session)?;
        self.set_status(format!("Output directory set to {}", normalized.display()));
        Ok(normalized)
    }

    pub fn edit_ignore_rules(&mut self, rules: &[String]) -> Result<RefreshSummary> {
        let summary = self.session.apply_ignore_rules(rules)?;
        self.store.save(&self.session)?;
        self.set_status(format!(
            "Ignore rules updated ({} rules)",
            self.session.ignore_rules().len()
        ));
        Ok(summary)
    }

    pub fn set_prompt_text(&mut self, text: &str) {
        self.session.set_prompt_text(text);
    }

    pub fn set_project_rules_text(&mut self, text: &str) {
        self.session.set_project_rules_text(text);
    }

    pub fn set_default_rules_text(&mut self, text: &str) {
        self.session.set_default_rules_text(text);
    }

    // Copies the default rules into the project rules and saves.
    pub fn apply_default_rules(&mut self) -> Result<()> {
        let defaults = self.session.default_rules_text().to_string();
        self.session.set_project_rules_text(&defaults);
        self.store.save(&self.session)?;
        self.set_status("Default rules applied to project rules");
        Ok(())
    }

    pub fn save_preferences(&mut self) -> Result<()> {
        self.store.save(&self.session)?;
        self.set_status("Preferences saved");
        Ok(())
    }

    // --- Projects ---

    pub fn create_project(&mut self, name: &str) -> Result<()> {
        self.store.create_project(name, &mut self.session)?;
        self.set_status(format!("Project '{}' created", self.store.current_name()));
        Ok(())
    }

    pub fn clone_project(&mut self, new_name: &str) -> Result<()> {
        let source = self.store.current_name().to_string();
        self.store.clone_project(new_name, &mut self.session)?;
        self.set_status(format!(
            "Project '{}' created as a clone of '{source}'",
            self.store.current_name()
        ));
        Ok(())
    }

    pub fn switch_project(&mut self, name: &str) -> Result<()> {
        self.store.switch_project(name, &mut self.session)?;
        self.set_status(format!("Switched to project: {name}"));
        Ok(())
    }

    pub fn delete_project(&mut self, name: &str) -> Result<()> {
        self.store.delete_project(name, &mut self.session)?;
        self.set_status(format!("Project '{name}' deleted"));
        Ok(())
    }

    pub fn rename_project(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.store.rename_project(old_name, new_name)?;
        self.set_status(format!("Project renamed to '{}'", new_name.trim()));
        Ok(())
    }

    // --- Statistics ---

    pub fn selection_stats(&self) -> SelectionStats {
        stats::compute_selection_stats(
            self.session.catalog(),
            self.session.selection(),
            self.token_counter.as_ref(),
        )
    }

    pub fn project_info(&self) -> Option<ProjectInfo> {
        let project = self.store.current_project()?;
        Some(stats::project_info(
            self.store.current_name(),
            project,
            self.session.catalog(),
        ))
    }

    // --- Merging ---

    // `<output dir>/<project>_merged.txt`, the suggested target for a merge.
    pub fn suggested_output_path(&self) -> PathBuf {
        let stem: String = self
            .store
            .current_name()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.session.output_dir().join(format!("{stem}_merged.txt"))
    }

    /*
     * Snapshots the selected files and the prompt and rules texts. Fails with
     * `EmptySelection` before anything touches the disk.
     */
    pub fn build_merge_request(&self, output_path: &Path) -> Result<MergeRequest> {
        let files = self.session.selected_file_paths();
        if files.is_empty() {
            return Err(AppLogicError::Merge(MergeError::EmptySelection));
        }
        Ok(MergeRequest {
            files,
            output_path: output_path.to_path_buf(),
            prompt: self.session.prompt_text().to_string(),
            rules: self.session.project_rules_text().to_string(),
        })
    }

    pub fn is_merge_running(&self) -> bool {
        self.active_merge.is_some()
    }

    pub fn start_merge(&mut self, output_path: &Path) -> Result<()> {
        if self.active_merge.is_some() {
            return Err(AppLogicError::MergeInProgress);
        }
        let request = self.build_merge_request(output_path)?;
        let total = request.files.len();
        let job = spawn_merge(self.merge_writer.clone(), request)?;
        self.active_merge = Some(job);
        self.last_progress = None;
        self.set_status(format!("Merging {total} files..."));
        Ok(())
    }

    pub fn cancel_merge(&mut self) -> bool {
        match &self.active_merge {
            Some(job) => {
                job.cancel();
                self.set_status("Cancelling merge...");
                true
            }
            None => false,
        }
    }

    pub fn last_merge_progress(&self) -> Option<&MergeProgressUpdate> {
        self.last_progress.as_ref()
    }

    /*
     * Picks up progress from the running merge. Returns `None` while it is still
     * running (or when none was started), and the merge result once it has ended.
     */
    pub fn poll_merge(&mut self) -> Option<Result<MergeOutcome>> {
        let job = self.active_merge.as_ref()?;
        if let Some(update) = job.drain_progress().pop() {
            self.status = format!("{} ({}/{})", update.label, update.index, update.total);
            self.last_progress = Some(update);
        }
        if !job.is_finished() {
            return None;
        }
        let job = self.active_merge.take()?;
        if let Some(update) = job.drain_progress().pop() {
            self.last_progress = Some(update);
        }
        Some(self.finish_merge(job.wait()))
    }

    // Runs a merge to completion on the calling thread's behalf.
    pub fn merge_now(&mut self, output_path: &Path) -> Result<MergeOutcome> {
        if self.active_merge.is_some() {
            return Err(AppLogicError::MergeInProgress);
        }
        let request = self.build_merge_request(output_path)?;
        let result = self.merge_writer.merge(&request, &NoopMergeProgress);
        self.finish_merge(result)
    }

    fn finish_merge(
        &mut self,
        result: std::result::Result<MergeOutcome, MergeError>,
    ) -> Result<MergeOutcome> {
        match result {
            Ok(MergeOutcome::Completed {
                files_written,
                output_path,
            }) => {
                if let Err(e) = self.store.save(&self.session) {
                    log::error!("AppLogic: Failed to save preferences after merge: {e}");
                }
                self.set_status(format!("Files merged successfully to: {}", output_path.display()));
                Ok(MergeOutcome::Completed {
                    files_written,
                    output_path,
                })
            }
            Ok(outcome @ MergeOutcome::Cancelled { .. }) => {
                self.set_status("Merge cancelled by user.");
                Ok(outcome)
            }
            Err(e) => {
                self.set_status(format!("Merge failed: {e}"));
                Err(e.into())
            }
        }
    }

    /*
     * Called when the application is about to exit. A running merge is cancelled and
     * awaited, then the live state is saved.
     */
    pub fn on_closing(&mut self) -> Result<()> {
        if let Some(job) = self.active_merge.take() {
            job.cancel();
            if let Err(e) = job.wait() {
                log::warn!("AppLogic: Merge ended with error during shutdown: {e}");
            }
        }
        self.store.save(&self.session)?;
        Ok(())
    }
}
