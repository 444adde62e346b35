/*
 * The platform-agnostic core: the lazily loaded path catalog and its selection state,
 * project persistence, the live session that ties them together, and the merge
 * writer with its background job. Concrete implementations sit behind the
 * `*Operations` traits so the application layer can swap them for mocks in tests.
 */
pub mod config;
pub mod file_node;
pub mod file_system;
pub mod ignore_rules;
pub mod merge_job;
pub mod merge_writer;
pub mod path_catalog;
pub mod path_utils;
pub mod project_store;
pub mod projects;
pub mod selection;
pub mod session;
pub mod stats;
pub mod tokenizer_utils;

pub use config::{MergerConfig, RefreshSelectionPolicy};
pub use file_node::{ErrorReason, FileNode, NodeHandle, NodeKind};
pub use file_system::{CoreFileSystemScanner, FileSystemScannerOperations};
pub use ignore_rules::IgnoreRules;

pub use path_catalog::{CatalogError, PathCatalog};
pub use selection::{SelectionEngine, SelectionError};

pub use project_store::{LoadOutcome, ProjectStore};
pub use projects::{
    CorePreferencesStorage, PreferencesFile, PreferencesStorageOperations, Project, ProjectError,
};
pub use session::{RefreshSummary, SessionData};

pub use merge_job::{MergeJob, MergeProgressUpdate, spawn_merge};
pub use merge_writer::{
    CoreMergeWriter, MergeError, MergeOutcome, MergeProgressOperations, MergeRequest,
    MergeWriterOperations,
};

pub use stats::{ProjectInfo, SelectionStats, format_size};
pub use tokenizer_utils::{CoreTikTokenCounter, TokenCounterOperations};
