/*
 * Persistent project records and the preferences file that holds them. A project
 * remembers where to scan, where to write merged output, which entries to ignore,
 * which paths were selected (relative to its root) and the free-text prompt and rules
 * that are prepended to a merge.
 *
 * All projects live in one JSON document that is read once at startup and rewritten
 * wholesale on every save. Writes go to a temporary sibling first and are then renamed
 * over the real file, so a crash mid-write leaves the previous version intact.
 */
use super::config::{DEFAULT_IGNORE_RULES, MergerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Debug)]
pub enum ProjectError {
    Io(io::Error),
    Corruption(serde_json::Error),
    DuplicateName(String),
    NotFound(String),
    InvalidName(String),
    LastProject(String),
    NoConfigDirectory,
}

impl From<io::Error> for ProjectError {
    fn from(err: io::Error) -> Self {
        ProjectError::Io(err)
    }
}

impl From<serde_json::Error> for ProjectError {
    fn from(err: serde_json::Error) -> Self {
        ProjectError::Corruption(err)
    }
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "Preferences I/O error: {e}"),
            ProjectError::Corruption(e) => write!(f, "Preferences file is corrupt: {e}"),
            ProjectError::DuplicateName(name) => write!(f, "Project '{name}' already exists"),
            ProjectError::NotFound(name) => write!(f, "Project '{name}' not found"),
            ProjectError::InvalidName(name) => write!(f, "Invalid project name: '{name}'"),
            ProjectError::LastProject(name) => {
                write!(f, "Cannot delete '{name}': it is the last remaining project")
            }
            ProjectError::NoConfigDirectory => {
                write!(f, "Could not determine the configuration directory for preferences")
            }
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectError::Io(e) => Some(e),
            ProjectError::Corruption(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;

// Local wall-clock time, or UTC when the local offset cannot be determined.
pub fn now_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/*
 * Serde adapter for timestamps. Writes RFC 3339. Reads RFC 3339 and also the offset-less
 * `YYYY-MM-DDTHH:MM:SS[.ffffff]` form found in older preference files (taken as UTC).
 * An unreadable timestamp is replaced by the current time rather than rejecting the
 * whole file.
 */
pub(crate) mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let text = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(parse(&text).unwrap_or_else(|| {
            log::warn!("Projects: Unreadable timestamp '{text}', using current time.");
            super::now_timestamp()
        }))
    }

    pub fn parse(text: &str) -> Option<OffsetDateTime> {
        if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
            return Some(parsed);
        }
        let without_fraction = text.split('.').next()?;
        let naive_format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        PrimitiveDateTime::parse(without_fraction, &naive_format)
            .ok()
            .map(|naive| naive.assume_utc())
    }
}

fn default_ignore_rules() -> Vec<String> {
    DEFAULT_IGNORE_RULES.iter().map(|s| s.to_string()).collect()
}

/*
 * One named project. The name is not stored inside the record; it is the key in
 * `PreferencesFile::projects`.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(with = "timestamp", default = "now_timestamp")]
    pub created: OffsetDateTime,
    #[serde(with = "timestamp", default = "now_timestamp")]
    pub modified: OffsetDateTime,
    #[serde(default)]
    pub root_dir: PathBuf,
    #[serde(default)]
    pub output_dir: PathBuf,
    #[serde(default = "default_ignore_rules")]
    pub ignored_file_types: Vec<String>,
    #[serde(default)]
    pub selected_paths_relative: Vec<String>,
    // Absolute selection written by older versions. Read, never written.
    #[serde(default, skip_serializing)]
    pub selected_paths: Vec<PathBuf>,
    #[serde(default)]
    pub default_rules: String,
    #[serde(default)]
    pub project_rules: Option<String>,
    #[serde(default)]
    pub prompt: String,
}

impl Project {
    pub fn new(root_dir: PathBuf, output_dir: PathBuf, ignored_file_types: Vec<String>) -> Self {
        let now = now_timestamp();
        Project {
            created: now,
            modified: now,
            root_dir,
            output_dir,
            ignored_file_types,
            selected_paths_relative: Vec::new(),
            selected_paths: Vec::new(),
            default_rules: String::new(),
            project_rules: None,
            prompt: String::new(),
        }
    }

    // Project rules fall back to the default rules when a record never had its own.
    pub fn effective_project_rules(&self) -> &str {
        self.project_rules.as_deref().unwrap_or(&self.default_rules)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencesFile {
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    #[serde(default)]
    pub current_project: String,
    #[serde(with = "timestamp", default = "now_timestamp")]
    pub last_saved: OffsetDateTime,
}

/*
 * Returns the trimmed name, or `InvalidName` when nothing is left after trimming.
 */
pub fn validate_project_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProjectError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/*
 * Storage backend for the preferences document. `load` returns `Ok(None)` when no
 * preferences have been written yet.
 */
pub trait PreferencesStorageOperations: Send + Sync {
    fn load(&self) -> Result<Option<PreferencesFile>>;
    fn save(&self, preferences: &PreferencesFile) -> Result<()>;
    fn location(&self) -> Option<PathBuf>;
}

pub struct CorePreferencesStorage {
    path: Option<PathBuf>,
}

impl CorePreferencesStorage {
    pub fn new(path: Option<PathBuf>) -> Self {
        CorePreferencesStorage { path }
    }

    pub fn from_config(config: &MergerConfig) -> Self {
        Self::new(config.preferences_path())
    }

    fn require_path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or(ProjectError::NoConfigDirectory)
    }
}

impl PreferencesStorageOperations for CorePreferencesStorage {
    fn load(&self) -> Result<Option<PreferencesFile>> {
        let path = self.require_path()?;
        if !path.exists() {
            log::debug!("CorePreferencesStorage: No preferences file at {path:?}.");
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let preferences: PreferencesFile = serde_json::from_str(&contents)?;
        log::debug!(
            "CorePreferencesStorage: Loaded {} projects from {:?}.",
            preferences.projects.len(),
            path
        );
        Ok(Some(preferences))
    }

    fn save(&self, preferences: &PreferencesFile) -> Result<()> {
        let path = self.require_path()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, preferences)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        log::debug!(
            "CorePreferencesStorage: Saved {} projects to {:?}.",
            preferences.projects.len(),
            path
        );
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}
