use std::path::{Path, PathBuf};
use std::time::SystemTime;

/*
 * Describes why an entry in the tree could not be represented as a regular file or
 * directory. Error nodes are visible in the tree but never take part in selection,
 * size or character counts.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    PermissionDenied,
    NotFound,
    MaxDepthExceeded,
    ListingFailed,
}

impl ErrorReason {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorReason::PermissionDenied => "Permission denied",
            ErrorReason::NotFound => "Not found",
            ErrorReason::MaxDepthExceeded => "Max depth reached",
            ErrorReason::ListingFailed => "Error listing directory",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            ErrorReason::PermissionDenied => "permission",
            ErrorReason::NotFound => "notfound",
            ErrorReason::MaxDepthExceeded => "max_depth",
            ErrorReason::ListingFailed => "listing",
        }
    }

    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::PermissionDenied => ErrorReason::PermissionDenied,
            std::io::ErrorKind::NotFound => ErrorReason::NotFound,
            _ => ErrorReason::ListingFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    File,
    Error(ErrorReason),
}

/*
 * One filesystem entry surfaced in the tree. The normalized absolute path is both the
 * key and the handle of the node; it is unique within a build generation.
 *
 * Directory nodes start with `children_loaded == false`, which is the in-memory
 * equivalent of the "Loading..." placeholder row. Selection flags are not stored
 * here; `SelectionEngine` owns them.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    path: PathBuf,
    name: String,
    kind: NodeKind,
    depth: usize,
    parent: Option<PathBuf>,
    children: Vec<PathBuf>,
    children_loaded: bool,
    size: Option<u64>,
    modified: Option<SystemTime>,
    generation: u64,
}

impl FileNode {
    pub fn new_directory(
        path: PathBuf,
        name: String,
        depth: usize,
        parent: Option<PathBuf>,
        generation: u64,
    ) -> Self {
        FileNode {
            path,
            name,
            kind: NodeKind::Directory,
            depth,
            parent,
            children: Vec::new(),
            children_loaded: false,
            size: None,
            modified: None,
            generation,
        }
    }

    pub fn new_file(
        path: PathBuf,
        name: String,
        depth: usize,
        parent: Option<PathBuf>,
        size: u64,
        modified: Option<SystemTime>,
        generation: u64,
    ) -> Self {
        FileNode {
            path,
            name,
            kind: NodeKind::File,
            depth,
            parent,
            children: Vec::new(),
            children_loaded: true,
            size: Some(size),
            modified,
            generation,
        }
    }

    pub fn new_error(
        path: PathBuf,
        name: String,
        reason: ErrorReason,
        depth: usize,
        parent: Option<PathBuf>,
        generation: u64,
    ) -> Self {
        FileNode {
            path,
            name,
            kind: NodeKind::Error(reason),
            depth,
            parent,
            children: Vec::new(),
            children_loaded: true,
            size: None,
            modified: None,
            generation,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NodeKind::Error(_))
    }

    pub fn is_selectable(&self) -> bool {
        !self.is_error()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[PathBuf] {
        &self.children
    }

    pub fn children_loaded(&self) -> bool {
        self.children_loaded
    }

    // True while the directory still shows its unloaded placeholder.
    pub fn has_placeholder(&self) -> bool {
        self.is_dir() && !self.children_loaded
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn push_child(&mut self, child: PathBuf) {
        self.children.push(child);
    }

    pub(crate) fn mark_children_loaded(&mut self) {
        self.children_loaded = true;
    }
}

/*
 * Builds the key for an error row that stands in for a whole directory listing
 * (listing failure, depth limit). NUL never appears in a real file name, so the key
 * cannot collide with an entry on disk.
 */
pub fn error_node_path(dir: &Path, reason: ErrorReason) -> PathBuf {
    dir.join(format!("\u{0}error_{}", reason.tag()))
}

/*
 * A generation-stamped reference to a node. Handles taken before a rebuild stop
 * resolving once the catalog has moved to a newer generation.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) path: PathBuf,
    pub(crate) generation: u64,
}

impl NodeHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
