/*
 * The catalog owns the lazily populated tree: one `FileNode` per visible filesystem
 * entry, keyed by its normalized absolute path. A build discards everything and
 * starts a new generation with the root and its first level; deeper levels appear
 * only when a directory is expanded.
 *
 * Every node the catalog creates is reported to the `SelectionEngine` together with
 * the pending selection set of the current generation, so that restored and
 * inherited selection is decided at creation time instead of in a second pass.
 */
use super::file_node::{ErrorReason, FileNode, NodeHandle, NodeKind, error_node_path};
use super::file_system::{DirectoryListing, FileSystemScannerOperations};
use super::ignore_rules::IgnoreRules;
use super::path_utils;
use super::selection::SelectionEngine;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub enum CatalogError {
    // Neither the requested root nor the home directory is a usable directory.
    NoUsableRoot { requested: PathBuf },
    NotFound(PathBuf),
    NotADirectory(PathBuf),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NoUsableRoot { requested } => write!(
                f,
                "Cannot access root directory {requested:?} or the home directory"
            ),
            CatalogError::NotFound(path) => write!(f, "No node for path {path:?}"),
            CatalogError::NotADirectory(path) => write!(f, "Node {path:?} is not a directory"),
        }
    }
}

impl std::error::Error for CatalogError {}

pub type Result<T> = std::result::Result<T, CatalogError>;

pub struct PathCatalog {
    nodes: HashMap<PathBuf, FileNode>,
    root: Option<PathBuf>,
    generation: u64,
    pending: HashSet<PathBuf>,
    ignore_rules: IgnoreRules,
    max_depth: usize,
    home_fallback: Option<PathBuf>,
    scanner: Arc<dyn FileSystemScannerOperations>,
}

impl PathCatalog {
    pub fn new(
        scanner: Arc<dyn FileSystemScannerOperations>,
        max_depth: usize,
        home_fallback: Option<PathBuf>,
    ) -> Self {
        PathCatalog {
            nodes: HashMap::new(),
            root: None,
            generation: 0,
            pending: HashSet::new(),
            ignore_rules: IgnoreRules::default(),
            max_depth,
            home_fallback,
            scanner,
        }
    }

    pub fn set_ignore_rules(&mut self, rules: IgnoreRules) {
        self.ignore_rules = rules;
    }

    pub fn ignore_rules(&self) -> &IgnoreRules {
        &self.ignore_rules
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /*
     * Picks the directory a build will actually use: the requested path when it is an
     * existing directory, else the home directory. Both candidates are normalized.
     */
    pub fn resolve_root(&self, requested: &Path) -> Result<PathBuf> {
        let normalized = path_utils::normalize_path(requested);
        if normalized.is_dir() {
            return Ok(normalized);
        }
        log::warn!(
            "PathCatalog: Root directory {normalized:?} not found or not a directory. Falling back to home."
        );
        match &self.home_fallback {
            Some(home) => {
                let home = path_utils::normalize_path(home);
                if home.is_dir() {
                    Ok(home)
                } else {
                    log::error!("PathCatalog: Home directory {home:?} is not usable either.");
                    Err(CatalogError::NoUsableRoot {
                        requested: requested.to_path_buf(),
                    })
                }
            }
            None => {
                log::error!("PathCatalog: No home directory known to fall back to.");
                Err(CatalogError::NoUsableRoot {
                    requested: requested.to_path_buf(),
                })
            }
        }
    }

    /*
     * Discards the current tree and materializes `root` plus its immediate children in
     * a new generation. Returns the root actually used (possibly the home fallback).
     * On failure the catalog is left empty.
     */
    pub fn build(
        &mut self,
        root: &Path,
        pending: HashSet<PathBuf>,
        selection: &mut SelectionEngine,
    ) -> Result<PathBuf> {
        self.generation += 1;
        self.nodes.clear();
        self.root = None;
        selection.reset();

        let resolved = self.resolve_root(root)?;
        log::debug!(
            "PathCatalog: Building generation {} at {:?} with {} pending paths.",
            self.generation,
            resolved,
            pending.len()
        );
        self.pending = pending;

        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| resolved.to_string_lossy().into_owned());
        let root_node = FileNode::new_directory(resolved.clone(), name, 0, None, self.generation);
        self.nodes.insert(resolved.clone(), root_node);
        selection.mark_created(&resolved, None, &self.pending);
        self.root = Some(resolved.clone());

        self.populate_children(&resolved, selection);
        Ok(resolved)
    }

    /*
     * Loads the children of an unloaded directory. Returns `Ok(false)` when the
     * directory was already loaded.
     */
    pub fn expand(&mut self, path: &Path, selection: &mut SelectionEngine) -> Result<bool> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| CatalogError::NotFound(path.to_path_buf()))?;
        if !node.is_dir() {
            return Err(CatalogError::NotADirectory(path.to_path_buf()));
        }
        if node.children_loaded() {
            return Ok(false);
        }
        self.populate_children(path, selection);
        Ok(true)
    }

    /*
     * Expands `path` and every directory below it, level by level. Returns the number
     * of directories that were loaded by this call.
     */
    pub fn expand_all(&mut self, path: &Path, selection: &mut SelectionEngine) -> Result<usize> {
        let mut expanded = 0;
        let mut queue = VecDeque::from([path.to_path_buf()]);
        while let Some(current) = queue.pop_front() {
            if self.expand(&current, selection)? {
                expanded += 1;
            }
            if let Some(node) = self.nodes.get(&current) {
                for child in node.children() {
                    if self.nodes.get(child).is_some_and(|c| c.is_dir()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        log::debug!("PathCatalog: expand_all({path:?}) loaded {expanded} directories.");
        Ok(expanded)
    }

    fn populate_children(&mut self, dir: &Path, selection: &mut SelectionEngine) {
        let Some(parent_depth) = self.nodes.get(dir).map(|n| n.depth()) else {
            return;
        };
        let child_depth = parent_depth + 1;
        let generation = self.generation;
        let mut child_paths = Vec::new();

        if child_depth > self.max_depth {
            log::debug!("PathCatalog: Depth limit reached below {dir:?}.");
            let reason = ErrorReason::MaxDepthExceeded;
            let error_path = error_node_path(dir, reason);
            self.nodes.insert(
                error_path.clone(),
                FileNode::new_error(
                    error_path.clone(),
                    reason.label().to_string(),
                    reason,
                    child_depth,
                    Some(dir.to_path_buf()),
                    generation,
                ),
            );
            child_paths.push(error_path);
        } else {
            match self.scanner.list_entries(dir, &self.ignore_rules) {
                DirectoryListing::Failed(reason) => {
                    let error_path = error_node_path(dir, reason);
                    self.nodes.insert(
                        error_path.clone(),
                        FileNode::new_error(
                            error_path.clone(),
                            reason.label().to_string(),
                            reason,
                            child_depth,
                            Some(dir.to_path_buf()),
                            generation,
                        ),
                    );
                    child_paths.push(error_path);
                }
                DirectoryListing::Entries(entries) => {
                    for entry in entries {
                        let parent = Some(dir.to_path_buf());
                        let node = match entry.kind {
                            NodeKind::Directory => FileNode::new_directory(
                                entry.path.clone(),
                                entry.name,
                                child_depth,
                                parent,
                                generation,
                            ),
                            NodeKind::File => FileNode::new_file(
                                entry.path.clone(),
                                entry.name,
                                child_depth,
                                parent,
                                entry.size.unwrap_or(0),
                                entry.modified,
                                generation,
                            ),
                            NodeKind::Error(reason) => FileNode::new_error(
                                entry.path.clone(),
                                entry.name,
                                reason,
                                child_depth,
                                parent,
                                generation,
                            ),
                        };
                        let selectable = node.is_selectable();
                        self.nodes.insert(entry.path.clone(), node);
                        if selectable {
                            selection.mark_created(&entry.path, Some(dir), &self.pending);
                        }
                        child_paths.push(entry.path);
                    }
                }
            }
        }

        if let Some(dir_node) = self.nodes.get_mut(dir) {
            for child in child_paths {
                dir_node.push_child(child);
            }
            dir_node.mark_children_loaded();
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn is_built(&self) -> bool {
        self.root.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending(&self) -> &HashSet<PathBuf> {
        &self.pending
    }

    /*
     * Drops pending entries at or below `prefix`, so that children created by a later
     * expand no longer come back selected. Returns how many were dropped.
     */
    pub fn discard_pending(&mut self, prefix: &Path) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| !p.starts_with(prefix));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            log::debug!("PathCatalog: Discarded {dropped} pending paths under {prefix:?}.");
        }
        dropped
    }

    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    // Pending paths whose nodes have not been created yet in this generation.
    pub fn unmaterialized_pending(&self) -> impl Iterator<Item = &PathBuf> {
        self.pending.iter().filter(move |p| !self.nodes.contains_key(*p))
    }

    pub fn get(&self, path: &Path) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn handle(&self, path: &Path) -> Option<NodeHandle> {
        self.nodes.get(path).map(|node| NodeHandle {
            path: node.path().to_path_buf(),
            generation: node.generation(),
        })
    }

    // Handles from an older generation no longer resolve.
    pub fn path_of(&self, handle: &NodeHandle) -> Option<&Path> {
        if handle.generation != self.generation {
            return None;
        }
        self.nodes.get(&handle.path).map(|node| node.path())
    }

    pub fn children(&self, path: &Path) -> Vec<&FileNode> {
        self.nodes
            .get(path)
            .map(|node| {
                node.children()
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /*
     * All loaded nodes below `path`, parents before children. Error rows are included;
     * callers filter by kind.
     */
    pub fn loaded_descendants(&self, path: &Path) -> Vec<&FileNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&Path> = match self.nodes.get(path) {
            Some(node) => node.children().iter().rev().map(|p| p.as_path()).collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(node);
                stack.extend(node.children().iter().rev().map(|p| p.as_path()));
            }
        }
        out
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /*
     * Directories whose children are currently loaded, shallowest first. Used to
     * restore the expansion state after a rebuild.
     */
    pub fn expanded_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<&FileNode> = self
            .nodes
            .values()
            .filter(|n| n.is_dir() && n.children_loaded())
            .collect();
        dirs.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path())));
        dirs.into_iter().map(|n| n.path().to_path_buf()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::file_system::{CoreFileSystemScanner, ListedEntry};
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    /*
     * Scanner mock that serves a fixed listing per directory and records how often
     * each directory was listed.
     */
    struct MockScanner {
        listings: HashMap<PathBuf, DirectoryListing>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl MockScanner {
        fn new() -> Self {
            MockScanner {
                listings: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_listing(mut self, dir: &Path, listing: DirectoryListing) -> Self {
            self.listings.insert(dir.to_path_buf(), listing);
            self
        }

        fn call_count(&self, dir: &Path) -> usize {
            self.calls.lock().unwrap().iter().filter(|p| p.as_path() == dir).count()
        }
    }

    impl FileSystemScannerOperations for MockScanner {
        fn list_entries(&self, dir: &Path, _rules: &IgnoreRules) -> DirectoryListing {
            self.calls.lock().unwrap().push(dir.to_path_buf());
            self.listings
                .get(dir)
                .cloned()
                .unwrap_or(DirectoryListing::Entries(Vec::new()))
        }
    }

    fn entry(path: PathBuf, kind: NodeKind) -> ListedEntry {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        ListedEntry {
            path,
            name,
            kind,
            size: if kind == NodeKind::File { Some(1) } else { None },
            modified: None,
        }
    }

    fn setup_tree() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        File::create(dir.path().join("a.txt"))
            .unwrap()
            .write_all(b"hello")
            .unwrap();
        File::create(dir.path().join("src/main.rs")).unwrap();
        File::create(dir.path().join("src/nested/deep.rs")).unwrap();
        dir
    }

    fn real_catalog() -> PathCatalog {
        PathCatalog::new(Arc::new(CoreFileSystemScanner::new()), 15, None)
    }

    #[test]
    fn test_build_materializes_first_level_only() {
        let dir = setup_tree();
        let mut catalog = real_catalog();
        let mut selection = SelectionEngine::new();

        let root = catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();

        assert_eq!(root, path_utils::normalize_path(dir.path()));
        let src = root.join("src");
        assert!(catalog.exists(&root.join("a.txt")));
        assert!(catalog.exists(&src));
        assert!(catalog.get(&src).unwrap().has_placeholder());
        assert!(!catalog.exists(&src.join("main.rs")));
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(&root).unwrap().depth(), 0);
        assert_eq!(catalog.get(&src).unwrap().depth(), 1);
    }

    #[test]
    fn test_expand_is_idempotent() {
        let dir = setup_tree();
        let root = path_utils::normalize_path(dir.path());
        let src = root.join("src");
        let scanner = Arc::new(
            MockScanner::new()
                .with_listing(
                    &root,
                    DirectoryListing::Entries(vec![entry(src.clone(), NodeKind::Directory)]),
                )
                .with_listing(
                    &src,
                    DirectoryListing::Entries(vec![entry(src.join("main.rs"), NodeKind::File)]),
                ),
        );
        let mut catalog = PathCatalog::new(scanner.clone(), 15, None);
        let mut selection = SelectionEngine::new();
        catalog.build(&root, HashSet::new(), &mut selection).unwrap();

        assert!(catalog.expand(&src, &mut selection).unwrap());
        assert!(!catalog.expand(&src, &mut selection).unwrap());
        assert_eq!(scanner.call_count(&src), 1);
        assert!(catalog.exists(&src.join("main.rs")));
        assert_eq!(catalog.get(&src.join("main.rs")).unwrap().depth(), 2);
    }

    #[test]
    fn test_expand_rejects_unknown_and_files() {
        let dir = setup_tree();
        let mut catalog = real_catalog();
        let mut selection = SelectionEngine::new();
        let root = catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();

        assert!(matches!(
            catalog.expand(&root.join("missing"), &mut selection),
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            catalog.expand(&root.join("a.txt"), &mut selection),
            Err(CatalogError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_listing_failure_yields_single_error_child() {
        let dir = tempdir().unwrap();
        let root = path_utils::normalize_path(dir.path());
        let scanner = Arc::new(
            MockScanner::new()
                .with_listing(&root, DirectoryListing::Failed(ErrorReason::PermissionDenied)),
        );
        let mut catalog = PathCatalog::new(scanner, 15, None);
        let mut selection = SelectionEngine::new();
        catalog.build(&root, HashSet::new(), &mut selection).unwrap();

        let children = catalog.children(&root);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind(), NodeKind::Error(ErrorReason::PermissionDenied));
        assert_eq!(children[0].name(), "Permission denied");
    }

    #[test]
    fn test_depth_limit_produces_error_node() {
        let dir = tempdir().unwrap();
        let mut deep = dir.path().to_path_buf();
        for i in 0..4 {
            deep = deep.join(format!("d{i}"));
        }
        fs::create_dir_all(&deep).unwrap();
        File::create(deep.join("leaf.txt")).unwrap();

        let mut catalog = PathCatalog::new(Arc::new(CoreFileSystemScanner::new()), 2, None);
        let mut selection = SelectionEngine::new();
        let root = catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();
        catalog.expand_all(&root, &mut selection).unwrap();

        let d1 = root.join("d0").join("d1");
        assert_eq!(catalog.get(&d1).unwrap().depth(), 2);
        let children = catalog.children(&d1);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind(), NodeKind::Error(ErrorReason::MaxDepthExceeded));
        assert!(!catalog.exists(&d1.join("d2")));
    }

    #[test]
    fn test_build_falls_back_to_home() {
        let home = tempdir().unwrap();
        let mut catalog = PathCatalog::new(
            Arc::new(CoreFileSystemScanner::new()),
            15,
            Some(home.path().to_path_buf()),
        );
        let mut selection = SelectionEngine::new();

        let used = catalog
            .build(&home.path().join("does_not_exist"), HashSet::new(), &mut selection)
            .unwrap();

        assert_eq!(used, path_utils::normalize_path(home.path()));
    }

    #[test]
    fn test_build_without_usable_root_fails_and_clears() {
        let dir = setup_tree();
        let mut catalog = real_catalog();
        let mut selection = SelectionEngine::new();
        catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();

        let result = catalog.build(&dir.path().join("nope"), HashSet::new(), &mut selection);

        assert!(matches!(result, Err(CatalogError::NoUsableRoot { .. })));
        assert!(catalog.is_empty());
        assert!(!catalog.is_built());
    }

    #[test]
    fn test_handles_do_not_survive_rebuild() {
        let dir = setup_tree();
        let mut catalog = real_catalog();
        let mut selection = SelectionEngine::new();
        let root = catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();
        let handle = catalog.handle(&root.join("a.txt")).unwrap();
        assert_eq!(catalog.path_of(&handle), Some(root.join("a.txt").as_path()));

        catalog.build(&root, HashSet::new(), &mut selection).unwrap();

        assert_eq!(catalog.path_of(&handle), None);
        assert_eq!(catalog.generation(), handle.generation() + 1);
    }

    #[test]
    fn test_expand_all_matches_filesystem() {
        let dir = setup_tree();
        let mut catalog = real_catalog();
        let mut selection = SelectionEngine::new();
        let root = catalog
            .build(dir.path(), HashSet::new(), &mut selection)
            .unwrap();

        let expanded = catalog.expand_all(&root, &mut selection).unwrap();

        assert_eq!(expanded, 2);
        let on_disk: HashSet<PathBuf> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_path_buf())
            .collect();
        let in_catalog: HashSet<PathBuf> = catalog.nodes().map(|n| n.path().to_path_buf()).collect();
        assert_eq!(in_catalog, on_disk);
        assert_eq!(catalog.expanded_directories()[0], root);
    }
}
