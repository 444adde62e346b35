/*
 * Application-wide constants and the runtime configuration handed to the core. The
 * defaults mirror what a fresh installation uses; tests override individual fields
 * (most notably the preferences location) without touching the user's real files.
 */
use crate::core::path_utils;
use std::path::PathBuf;

pub const APP_NAME: &str = "FileMerger";
pub const PREFERENCES_FILENAME: &str = "preferences.json";
pub const LOG_FILENAME: &str = "file_merger.log";
pub const MAX_SCAN_DEPTH: usize = 15;
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "Merged_Files";
pub const DEFAULT_PROJECT_NAME: &str = "Default";

pub const DEFAULT_IGNORE_RULES: &[&str] = &[
    ".git",
    ".gitignore",
    ".gitattributes",
    ".svn",
    ".hg",
    ".vscode",
    ".idea",
    ".project",
    ".settings",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "*.dll",
    "*.exe",
    "*.so",
    "*.o",
    "*.obj",
    "*.class",
    "*.jar",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.rar",
    "*.7z",
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".bmp",
    ".ico",
    ".svg",
    "*.mp3",
    "*.wav",
    "*.mp4",
    "*.avi",
    "*.mov",
    "*.pdf",
    "*.doc",
    "*.docx",
    "*.xls",
    "*.xlsx",
    "*.ppt",
    "*.pptx",
    "*.odt",
    "*.ods",
    "Thumbs.db",
    ".DS_Store",
];

/*
 * How a refresh treats entries that were not in the tree before it ran.
 * `PreserveOnly` restores exactly the previous selection. `AutoSelectNew` also
 * selects every node that did not exist before the refresh.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshSelectionPolicy {
    #[default]
    PreserveOnly,
    AutoSelectNew,
}

#[derive(Debug, Clone)]
pub struct MergerConfig {
    pub max_depth: usize,
    pub default_ignore_rules: Vec<String>,
    pub output_dir_name: String,
    pub refresh_policy: RefreshSelectionPolicy,
    // Overrides the per-user preferences file location.
    pub preferences_path: Option<PathBuf>,
    // Overrides the directory used as root/output fallback.
    pub home_dir_override: Option<PathBuf>,
}

impl Default for MergerConfig {
    fn default() -> Self {
        MergerConfig {
            max_depth: MAX_SCAN_DEPTH,
            default_ignore_rules: DEFAULT_IGNORE_RULES.iter().map(|s| s.to_string()).collect(),
            output_dir_name: DEFAULT_OUTPUT_DIR_NAME.to_string(),
            refresh_policy: RefreshSelectionPolicy::default(),
            preferences_path: None,
            home_dir_override: None,
        }
    }
}

impl MergerConfig {
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_override.clone().or_else(path_utils::home_dir)
    }

    // `<home>/Merged_Files`, used when a project's output directory is unusable.
    pub fn default_output_dir(&self) -> Option<PathBuf> {
        self.home_dir().map(|home| home.join(&self.output_dir_name))
    }

    pub fn preferences_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.preferences_path {
            return Some(path.clone());
        }
        path_utils::get_base_app_config_local_dir(APP_NAME).map(|dir| dir.join(PREFERENCES_FILENAME))
    }
}
