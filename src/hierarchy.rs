//! Folder hierarchy reconciliation
//!
//! Source systems organize tests in a tree of folders (Xray) or sections
//! (TestRail) where any node may hold both sub-folders and tests. The
//! destination has two suite types instead: a `folder` suite only contains
//! other suites and a `file` suite only contains tests.
//!
//! # Classification
//!
//! - A folder with sub-folders becomes a `folder` suite.
//! - A folder without sub-folders becomes a `file` suite.
//! - A folder with sub-folders *and* direct tests additionally gets a
//!   synthetic `file` child suite (same title) that holds those tests.
//!
//! # Passes
//!
//! 1. **Create**: one suite per non-root folder, plus the synthetic file
//!    suites. Ids are recorded in [`SuiteIdMapping`].
//! 2. **Link**: every folder whose parent is a real folder is moved under its
//!    parent's `folder` suite. Pass 2 starts only once Pass 1 is complete,
//!    since parent resolution needs every folder suite id.
//!
//! A failed creation leaves the folder unmapped; its tests later fall back to
//! the shared Root suite (see [`SuiteIdMapping::file_suite_for`]) and its
//! parent link is skipped.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::destination::{DestinationWriter, FileType, SuiteAttributes};
use crate::error::MigrationError;

/// Sentinel id of the source tree's root (no real folder)
pub const ROOT_FOLDER_ID: &str = "-1";
/// Title of the catch-all suite for tests without a folder suite
pub const ROOT_SUITE_TITLE: &str = "Root";

/// A source folder with its direct children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    /// `None` or [`ROOT_FOLDER_ID`] for top-level folders
    pub parent_id: Option<String>,
    pub child_folder_ids: Vec<String>,
    pub direct_test_count: u64,
}

impl FolderNode {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_FOLDER_ID
    }

    /// Whether this folder becomes a `folder` suite
    pub fn is_container(&self) -> bool {
        !self.child_folder_ids.is_empty()
    }

    /// Parent id, unless the parent is the root sentinel
    pub fn real_parent_id(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .filter(|parent| *parent != ROOT_FOLDER_ID)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum RootSuite {
    #[default]
    NotAttempted,
    Created(String),
    Failed,
}

/// Source folder id to destination suite id maps
///
/// A folder can own both a `folder` suite and a `file` suite when it holds
/// sub-folders and tests at the same time.
#[derive(Debug, Clone, Default)]
pub struct SuiteIdMapping {
    folders: HashMap<String, String>,
    files: HashMap<String, String>,
    root: RootSuite,
}

impl SuiteIdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// `folder` suite created for a source folder
    pub fn folder_suite(&self, folder_id: &str) -> Option<&str> {
        self.folders.get(folder_id).map(String::as_str)
    }

    /// `file` suite holding a source folder's tests
    pub fn file_suite(&self, folder_id: &str) -> Option<&str> {
        self.files.get(folder_id).map(String::as_str)
    }

    /// Suite representing the folder itself in the tree
    pub fn suite_for(&self, folder_id: &str) -> Option<&str> {
        self.folder_suite(folder_id)
            .or_else(|| self.file_suite(folder_id))
    }

    /// Root suite, if one has been created
    pub fn root_suite(&self) -> Option<&str> {
        match &self.root {
            RootSuite::Created(id) => Some(id),
            _ => None,
        }
    }

    pub fn insert_folder(&mut self, folder_id: impl Into<String>, suite_id: impl Into<String>) {
        self.folders.insert(folder_id.into(), suite_id.into());
    }

    /// Record a `file` suite, replacing any previous one for this folder
    pub fn insert_file(&mut self, folder_id: impl Into<String>, suite_id: impl Into<String>) {
        self.files.insert(folder_id.into(), suite_id.into());
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// File suite for a test in `folder_id`, falling back to the Root suite
    ///
    /// The Root suite is created on the first miss and reused afterwards.
    /// Creation is attempted at most once per run: after a failed attempt
    /// orphaned tests get `None`.
    pub fn file_suite_for(
        &mut self,
        folder_id: Option<&str>,
        writer: &mut dyn DestinationWriter,
    ) -> Result<Option<String>, MigrationError> {
        if let Some(id) = folder_id.and_then(|folder| self.file_suite(folder)) {
            return Ok(Some(id.to_string()));
        }

        match &self.root {
            RootSuite::Created(id) => return Ok(Some(id.clone())),
            RootSuite::Failed => return Ok(None),
            RootSuite::NotAttempted => {}
        }

        let attrs = SuiteAttributes {
            position: Some(1),
            emoji: Some("📂".to_string()),
            ..SuiteAttributes::new(ROOT_SUITE_TITLE, FileType::File)
        };
        match writer.create_suite(&attrs)? {
            Some(id) => {
                tracing::info!(suite_id = %id, "created Root suite for tests without a folder");
                self.root = RootSuite::Created(id.clone());
                Ok(Some(id))
            }
            None => {
                tracing::warn!("Root suite could not be created");
                self.root = RootSuite::Failed;
                Ok(None)
            }
        }
    }
}

/// Result of reconciling a folder tree
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub mapping: SuiteIdMapping,
    pub suites_created: usize,
    pub links_updated: usize,
    /// Folders whose suite creation or parent link failed
    pub failed_folders: Vec<String>,
}

/// Two-pass folder tree to suite reconciliation
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyReconciler;

impl HierarchyReconciler {
    /// Create and link destination suites for `folders`
    ///
    /// # Errors
    ///
    /// Only fatal write failures (exhausted retries) are returned; rejected
    /// writes are recorded in [`Reconciliation::failed_folders`].
    pub fn reconcile(
        folders: &[FolderNode],
        writer: &mut dyn DestinationWriter,
    ) -> Result<Reconciliation, MigrationError> {
        let mut result = Reconciliation::default();

        Self::create_suites(folders, writer, &mut result)?;
        Self::link_parents(folders, writer, &mut result)?;

        tracing::info!(
            suites = result.suites_created,
            folder_suites = result.mapping.folder_count(),
            file_suites = result.mapping.file_count(),
            links = result.links_updated,
            failed = result.failed_folders.len(),
            "folder hierarchy reconciled"
        );
        Ok(result)
    }

    fn create_suites(
        folders: &[FolderNode],
        writer: &mut dyn DestinationWriter,
        result: &mut Reconciliation,
    ) -> Result<(), MigrationError> {
        for folder in folders.iter().filter(|folder| !folder.is_root()) {
            let container = folder.is_container();
            let file_type = if container {
                FileType::Folder
            } else {
                FileType::File
            };

            let suite_id = writer.create_suite(&SuiteAttributes::new(&folder.name, file_type))?;
            match &suite_id {
                Some(id) if container => result.mapping.insert_folder(&folder.id, id),
                Some(id) => result.mapping.insert_file(&folder.id, id),
                None => {
                    tracing::warn!(folder = %folder.name, id = %folder.id, "suite not created");
                    result.failed_folders.push(folder.id.clone());
                }
            }
            if suite_id.is_some() {
                result.suites_created += 1;
                tracing::debug!(folder = %folder.name, ?file_type, "suite created");
            }

            if container && folder.direct_test_count > 0 {
                let mut attrs = SuiteAttributes::new(&folder.name, FileType::File);
                if let Some(parent) = &suite_id {
                    attrs = attrs.with_parent(parent);
                }
                match writer.create_suite(&attrs)? {
                    Some(id) => {
                        result.mapping.insert_file(&folder.id, id);
                        result.suites_created += 1;
                    }
                    None => {
                        tracing::warn!(folder = %folder.name, "suite for direct tests not created");
                        result.failed_folders.push(folder.id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn link_parents(
        folders: &[FolderNode],
        writer: &mut dyn DestinationWriter,
        result: &mut Reconciliation,
    ) -> Result<(), MigrationError> {
        for folder in folders.iter().filter(|folder| !folder.is_root()) {
            let Some(parent_id) = folder.real_parent_id() else {
                continue;
            };
            let Some(suite_id) = result.mapping.suite_for(&folder.id) else {
                continue;
            };
            let Some(parent_suite_id) = result.mapping.folder_suite(parent_id) else {
                tracing::warn!(
                    folder = %folder.name,
                    parent = parent_id,
                    "parent suite unresolved, left at top level"
                );
                continue;
            };

            let suite_id = suite_id.to_string();
            let update = SuiteAttributes::parent_link(parent_suite_id);
            if writer.update_suite(&suite_id, &update)? {
                result.links_updated += 1;
            } else {
                result.failed_folders.push(folder.id.clone());
            }
        }
        Ok(())
    }
}

/// A folder known only by its parent link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLink {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Build folder nodes from parent links
///
/// Children keep the input order; `test_counts` gives the number of tests
/// directly inside each folder.
pub fn folders_from_parent_links(
    links: &[FolderLink],
    test_counts: &HashMap<String, u64>,
) -> Vec<FolderNode> {
    let mut children: HashMap<&str, Vec<String>> = HashMap::new();
    for link in links {
        if let Some(parent) = link.parent_id.as_deref() {
            children.entry(parent).or_default().push(link.id.clone());
        }
    }

    links
        .iter()
        .map(|link| FolderNode {
            id: link.id.clone(),
            name: link.name.clone(),
            parent_id: link.parent_id.clone(),
            child_folder_ids: children.remove(link.id.as_str()).unwrap_or_default(),
            direct_test_count: test_counts.get(&link.id).copied().unwrap_or(0),
        })
        .collect()
}

/// The folder `folder_id` and all its descendants
///
/// The selected folder becomes top-level: its parent is outside the subset.
///
/// # Errors
///
/// [`MigrationError::NotFound`] when no folder has this id.
pub fn select_subtree(
    folders: &[FolderNode],
    folder_id: &str,
) -> Result<Vec<FolderNode>, MigrationError> {
    let by_id: HashMap<&str, &FolderNode> = folders
        .iter()
        .map(|folder| (folder.id.as_str(), folder))
        .collect();

    if !by_id.contains_key(folder_id) {
        return Err(MigrationError::NotFound(format!("folder {folder_id}")));
    }

    let mut selected: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([folder_id]);
    while let Some(id) = queue.pop_front() {
        if !selected.insert(id) {
            continue;
        }
        if let Some(folder) = by_id.get(id) {
            queue.extend(folder.child_folder_ids.iter().map(String::as_str));
        }
    }

    Ok(folders
        .iter()
        .filter(|folder| selected.contains(folder.id.as_str()))
        .map(|folder| {
            let mut folder = folder.clone();
            if folder.id == folder_id {
                folder.parent_id = None;
            }
            folder
        })
        .collect())
}
