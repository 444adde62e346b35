/*
 * Owns the named projects and the pointer to the active one, and moves data between
 * the persisted records and the live `SessionData`.
 *
 * Operations that activate a project follow one sequence: apply the record to the
 * session, rebuild the tree, flush the live state back into the record, persist. A
 * tree that cannot be built does not abort the operation; the selection stays staged
 * and is flushed as it was loaded.
 */
use super::config::{DEFAULT_PROJECT_NAME, MergerConfig};
use super::path_utils;
use super::projects::{
    PreferencesFile, PreferencesStorageOperations, Project, ProjectError, Result, now_timestamp,
    validate_project_name,
};
use super::session::SessionData;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    // The stored active project was applied.
    Loaded { project: String },
    // Stored projects were kept but the active pointer was invalid.
    FellBackToDefault { requested: String },
    // No preferences existed yet.
    FreshDefault,
    // The preferences could not be read; a new default project replaced them.
    Recovered { reason: String },
}

// The in-memory records as they were before a command, restored when persisting fails.
struct Snapshot {
    projects: BTreeMap<String, Project>,
    current: String,
}

pub struct ProjectStore {
    projects: BTreeMap<String, Project>,
    current: String,
    last_saved: Option<OffsetDateTime>,
    storage: Arc<dyn PreferencesStorageOperations>,
    config: MergerConfig,
}

impl ProjectStore {
    pub fn new(storage: Arc<dyn PreferencesStorageOperations>, config: MergerConfig) -> Self {
        ProjectStore {
            projects: BTreeMap::new(),
            current: String::new(),
            last_saved: None,
            storage,
            config,
        }
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    pub fn current_project(&self) -> Option<&Project> {
        self.projects.get(&self.current)
    }

    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn last_saved(&self) -> Option<OffsetDateTime> {
        self.last_saved
    }

    pub fn storage_location(&self) -> Option<PathBuf> {
        self.storage.location()
    }

    /*
     * Reads the preferences and applies the active project to the session. Never
     * fails: unreadable or corrupt preferences are logged and replaced by a fresh
     * "Default" project. The tree is not rebuilt here.
     */
    pub fn load(&mut self, session: &mut SessionData) -> LoadOutcome {
        match self.storage.load() {
            Ok(Some(preferences)) if !preferences.projects.is_empty() => {
                self.projects = preferences.projects;
                self.last_saved = Some(preferences.last_saved);
                if let Some(project) = self.projects.get(&preferences.current_project).cloned() {
                    self.current = preferences.current_project.clone();
                    self.apply_settings(&project, session);
                    log::info!("ProjectStore: Loaded project '{}'.", self.current);
                    LoadOutcome::Loaded {
                        project: self.current.clone(),
                    }
                } else {
                    log::warn!(
                        "ProjectStore: Active project '{}' does not exist. Falling back to '{}'.",
                        preferences.current_project,
                        DEFAULT_PROJECT_NAME
                    );
                    if !self.projects.contains_key(DEFAULT_PROJECT_NAME) {
                        let fresh = self.project_from_session(session);
                        self.projects.insert(DEFAULT_PROJECT_NAME.to_string(), fresh);
                    }
                    self.current = DEFAULT_PROJECT_NAME.to_string();
                    if let Some(project) = self.projects.get(DEFAULT_PROJECT_NAME).cloned() {
                        self.apply_settings(&project, session);
                    }
                    LoadOutcome::FellBackToDefault {
                        requested: preferences.current_project,
                    }
                }
            }
            Ok(Some(_)) => {
                log::warn!("ProjectStore: Preferences contain no projects.");
                self.init_default_project(session);
                LoadOutcome::FreshDefault
            }
            Ok(None) => {
                log::info!("ProjectStore: No preferences found, starting with a default project.");
                self.init_default_project(session);
                LoadOutcome::FreshDefault
            }
            Err(e) => {
                log::error!("ProjectStore: Failed to load preferences: {e}");
                self.init_default_project(session);
                LoadOutcome::Recovered {
                    reason: e.to_string(),
                }
            }
        }
    }

    // Replaces all projects by a single "Default" built from the live state.
    pub fn init_default_project(&mut self, session: &mut SessionData) {
        let project = self.project_from_session(session);
        self.projects = BTreeMap::from([(DEFAULT_PROJECT_NAME.to_string(), project)]);
        self.current = DEFAULT_PROJECT_NAME.to_string();
    }

    fn project_from_session(&self, session: &SessionData) -> Project {
        let mut project = Project::new(
            session.root_dir().to_path_buf(),
            session.output_dir().to_path_buf(),
            session.ignore_rules().to_vec(),
        );
        project.project_rules = Some(String::new());
        project
    }

    /*
     * Copies the live state into the active project record, including the selection
     * expressed relative to the live root. Paths outside the root are dropped.
     */
    pub fn flush(&mut self, session: &SessionData) {
        let Some(project) = self.projects.get_mut(&self.current) else {
            log::warn!("ProjectStore: No active project '{}' to flush into.", self.current);
            return;
        };
        let root = session.root_dir();
        let selection = session.current_selection_for_persistence();
        let relative: Vec<String> = selection
            .iter()
            .filter_map(|path| {
                let rel = path_utils::to_relative(path, root);
                if rel.is_none() {
                    log::debug!("ProjectStore: Dropping {path:?}, outside root {root:?}.");
                }
                rel
            })
            .collect();

        project.modified = now_timestamp();
        project.root_dir = root.to_path_buf();
        project.output_dir = session.output_dir().to_path_buf();
        project.ignored_file_types = session.ignore_rules().to_vec();
        project.selected_paths_relative = relative;
        project.selected_paths.clear();
        project.default_rules = session.default_rules_text().to_string();
        project.project_rules = Some(session.project_rules_text().to_string());
        project.prompt = session.prompt_text().to_string();
        log::trace!(
            "ProjectStore: Flushed '{}' with {} selected paths.",
            self.current,
            project.selected_paths_relative.len()
        );
    }

    // Writes all projects to storage as they are now.
    pub fn persist(&mut self) -> Result<()> {
        let now = now_timestamp();
        let preferences = PreferencesFile {
            projects: self.projects.clone(),
            current_project: self.current.clone(),
            last_saved: now,
        };
        self.storage.save(&preferences)?;
        self.last_saved = Some(now);
        log::debug!("ProjectStore: Preferences saved.");
        Ok(())
    }

    pub fn save(&mut self, session: &SessionData) -> Result<()> {
        self.flush(session);
        self.persist()
    }

    /*
     * Copies a project record into the live session. Unusable directories degrade to
     * fallbacks with a warning; the selection is resolved against the root actually
     * used and staged for the next rebuild.
     */
    pub fn apply_settings(&self, project: &Project, session: &mut SessionData) {
        let root = self.usable_root(&project.root_dir, session);
        let output = self.usable_output_dir(&project.output_dir);

        let staged: HashSet<PathBuf> = if !project.selected_paths_relative.is_empty() {
            project
                .selected_paths_relative
                .iter()
                .filter_map(|rel| path_utils::from_relative(rel, &root))
                .collect()
        } else {
            project
                .selected_paths
                .iter()
                .map(|p| path_utils::normalize_path(p))
                .collect()
        };

        session.set_root_dir(root);
        session.set_output_dir(output);
        session.set_ignore_rule_list(&project.ignored_file_types);
        session.stage_selection(staged);
        session.set_default_rules_text(&project.default_rules);
        session.set_project_rules_text(project.effective_project_rules());
        session.set_prompt_text(&project.prompt);
    }

    fn usable_root(&self, requested: &Path, session: &SessionData) -> PathBuf {
        if !requested.as_os_str().is_empty() && requested.is_dir() {
            return path_utils::normalize_path(requested);
        }
        log::warn!("ProjectStore: Root directory {requested:?} is not usable, using home.");
        match self.config.home_dir() {
            Some(home) => path_utils::normalize_path(&home),
            None => session.root_dir().to_path_buf(),
        }
    }

    fn usable_output_dir(&self, requested: &Path) -> PathBuf {
        if !requested.as_os_str().is_empty() {
            match fs::create_dir_all(requested) {
                Ok(()) => return path_utils::normalize_path(requested),
                Err(e) => log::warn!(
                    "ProjectStore: Cannot create output directory {requested:?}: {e}. Using default."
                ),
            }
        }
        let fallback = self
            .config
            .default_output_dir()
            .unwrap_or_else(|| PathBuf::from(&self.config.output_dir_name));
        if let Err(e) = fs::create_dir_all(&fallback) {
            log::warn!("ProjectStore: Cannot create default output directory {fallback:?}: {e}");
        }
        fallback
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            projects: self.projects.clone(),
            current: self.current.clone(),
        }
    }

    /*
     * Puts the records back as they were. When the active project changed, the old
     * one is applied to the session again and its tree rebuilt.
     */
    fn rollback(&mut self, snapshot: Snapshot, session: Option<&mut SessionData>) {
        let switched = snapshot.current != self.current;
        self.projects = snapshot.projects;
        self.current = snapshot.current;
        log::warn!("ProjectStore: Rolled back to '{}' after a failed save.", self.current);
        if let (true, Some(session)) = (switched, session) {
            if let Some(project) = self.projects.get(&self.current).cloned() {
                self.apply_settings(&project, session);
                if let Err(e) = session.rebuild_tree() {
                    log::warn!("ProjectStore: Restored project has no tree: {e}");
                }
            }
        }
    }

    // Persists, or restores `snapshot` and returns the storage error.
    fn persist_or_rollback(
        &mut self,
        snapshot: Snapshot,
        session: Option<&mut SessionData>,
    ) -> Result<()> {
        match self.persist() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rollback(snapshot, session);
                Err(e)
            }
        }
    }

    fn activate(&mut self, name: &str, session: &mut SessionData) -> Result<()> {
        let project = self
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))?;
        self.apply_settings(&project, session);
        self.current = name.to_string();
        if let Err(e) = session.rebuild_tree() {
            log::warn!("ProjectStore: Project '{name}' activated without a tree: {e}");
        }
        self.flush(session);
        Ok(())
    }

    /*
     * Adds an empty project that starts from the live directories and ignore list, and
     * makes it active.
     */
    pub fn create_project(&mut self, name: &str, session: &mut SessionData) -> Result<()> {
        let name = validate_project_name(name)?;
        if self.projects.contains_key(&name) {
            return Err(ProjectError::DuplicateName(name));
        }
        self.flush(session);
        let snapshot = self.snapshot();
        let project = Project::new(
            session.root_dir().to_path_buf(),
            session.output_dir().to_path_buf(),
            session.ignore_rules().to_vec(),
        );
        self.projects.insert(name.clone(), project);
        log::info!("ProjectStore: Created project '{name}'.");
        self.activate(&name, session)?;
        self.persist_or_rollback(snapshot, Some(session))
    }

    pub fn clone_project(&mut self, new_name: &str, session: &mut SessionData) -> Result<()> {
        let new_name = validate_project_name(new_name)?;
        if self.projects.contains_key(&new_name) {
            return Err(ProjectError::DuplicateName(new_name));
        }
        self.flush(session);
        let snapshot = self.snapshot();
        let mut copy = self
            .projects
            .get(&self.current)
            .cloned()
            .ok_or_else(|| ProjectError::NotFound(self.current.clone()))?;
        let now = now_timestamp();
        copy.created = now;
        copy.modified = now;
        log::info!("ProjectStore: Cloned '{}' as '{new_name}'.", self.current);
        self.projects.insert(new_name.clone(), copy);
        self.activate(&new_name, session)?;
        self.persist_or_rollback(snapshot, Some(session))
    }

    pub fn switch_project(&mut self, name: &str, session: &mut SessionData) -> Result<()> {
        if !self.projects.contains_key(name) {
            return Err(ProjectError::NotFound(name.to_string()));
        }
        self.flush(session);
        let snapshot = self.snapshot();
        log::info!("ProjectStore: Switching from '{}' to '{name}'.", self.current);
        self.activate(name, session)?;
        self.persist_or_rollback(snapshot, Some(session))
    }

    /*
     * Removes a project. The last remaining project cannot be removed. When the active
     * project goes away, the lowest remaining name becomes active first.
     */
    pub fn delete_project(&mut self, name: &str, session: &mut SessionData) -> Result<()> {
        if !self.projects.contains_key(name) {
            return Err(ProjectError::NotFound(name.to_string()));
        }
        if self.projects.len() <= 1 {
            return Err(ProjectError::LastProject(name.to_string()));
        }
        let snapshot = self.snapshot();
        if self.current == name {
            let next = self
                .projects
                .keys()
                .find(|k| k.as_str() != name)
                .cloned()
                .ok_or_else(|| ProjectError::LastProject(name.to_string()))?;
            self.flush(session);
            let project = self
                .projects
                .get(&next)
                .cloned()
                .ok_or_else(|| ProjectError::NotFound(next.clone()))?;
            self.apply_settings(&project, session);
            self.current = next;
            if let Err(e) = session.rebuild_tree() {
                log::warn!("ProjectStore: Project '{}' activated without a tree: {e}", self.current);
            }
            self.flush(session);
        }
        self.projects.remove(name);
        log::info!("ProjectStore: Deleted project '{name}'.");
        self.persist_or_rollback(snapshot, Some(session))
    }

    pub fn rename_project(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let new_name = validate_project_name(new_name)?;
        if !self.projects.contains_key(old_name) {
            return Err(ProjectError::NotFound(old_name.to_string()));
        }
        if self.projects.contains_key(&new_name) {
            return Err(ProjectError::DuplicateName(new_name));
        }
        let snapshot = self.snapshot();
        if let Some(mut project) = self.projects.remove(old_name) {
            project.modified = now_timestamp();
            self.projects.insert(new_name.clone(), project);
        }
        if self.current == old_name {
            self.current = new_name.clone();
        }
        log::info!("ProjectStore: Renamed '{old_name}' to '{new_name}'.");
        self.persist_or_rollback(snapshot, None)
    }
}
