#![allow(dead_code)]

use assert_fs::TempDir;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use twig::artifacts::objects::blob::Blob;
use twig::{
    EntryMode, FileMode, Index, IndexEntry, LockedIndex, MemoryDatabase, ObjectId,
    ReconcileError, ReconcileOptions, ReconcileReport, Reconciler, Stage, Tree, TreeNode,
    Workspace,
};

/// Route engine tracing through the test harness; `RUST_LOG=trace` shows
/// per-path decisions when a test misbehaves
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scratch repository: an in-memory object store, an on-disk index, and
/// a working directory inside a temp dir
pub struct Scratch {
    pub dir: TempDir,
    pub store: MemoryDatabase,
    pub workspace: Workspace,
    pub index_path: PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        init_tracing();

        let dir = TempDir::new().expect("Failed to create temp dir");
        let work_root = dir.path().join("work");
        std::fs::create_dir_all(&work_root).expect("Failed to create workspace root");

        Scratch {
            store: MemoryDatabase::new(),
            workspace: Workspace::new(work_root.into_boxed_path()),
            index_path: dir.path().join("index"),
            dir,
        }
    }

    /// Content id a blob with this content hashes to
    pub fn blob_oid(content: &str) -> ObjectId {
        Blob::new(Bytes::from(content.as_bytes().to_vec()))
            .object_id()
            .expect("Failed to hash blob")
    }

    /// Insert a blob under its real content id
    pub fn put_blob(&mut self, content: &str) -> ObjectId {
        let oid = Self::blob_oid(content);
        self.store.insert_blob(oid.clone(), content.as_bytes().to_vec());
        oid
    }

    /// Build nested tree objects for a set of regular files and return the
    /// root tree id
    pub fn plant_tree(&mut self, files: &[(&str, &str)]) -> ObjectId {
        let files: Vec<(&str, &str, EntryMode)> = files
            .iter()
            .map(|(path, content)| (*path, *content, EntryMode::from(FileMode::Regular)))
            .collect();
        self.plant_tree_with_modes(&files)
    }

    /// Same, with an explicit kind per file
    pub fn plant_tree_with_modes(&mut self, files: &[(&str, &str, EntryMode)]) -> ObjectId {
        let files: Vec<(PathBuf, String, EntryMode)> = files
            .iter()
            .map(|(path, content, mode)| (PathBuf::from(path), (*content).to_string(), mode.clone()))
            .collect();
        self.plant_level(&files)
    }

    fn plant_level(&mut self, files: &[(PathBuf, String, EntryMode)]) -> ObjectId {
        let mut groups: BTreeMap<String, Vec<(PathBuf, String, EntryMode)>> = BTreeMap::new();
        for (path, content, mode) in files {
            let mut components = path.components();
            let first = components
                .next()
                .expect("Empty path in tree fixture")
                .as_os_str()
                .to_string_lossy()
                .into_owned();
            let rest = components.as_path().to_path_buf();
            groups
                .entry(first)
                .or_default()
                .push((rest, content.clone(), mode.clone()));
        }

        let mut tree = Tree::new();
        for (name, children) in groups {
            if children.len() == 1 && children[0].0.as_os_str().is_empty() {
                let (_, content, mode) = &children[0];
                let oid = self.put_blob(content);
                tree.insert(name, TreeNode::new(oid, mode.clone()));
            } else {
                let sub = self.plant_level(&children);
                tree.insert(name, TreeNode::new(sub, EntryMode::Directory));
            }
        }

        // a deterministic id derived from the listing; the store only needs
        // it to be stable and unique
        let listing: String = tree
            .entries()
            .map(|(name, node)| format!("{} {} {}\n", node.mode.as_str(), node.oid, name))
            .collect();
        let oid = Self::blob_oid(&format!("tree\n{listing}"));
        self.store.insert_tree(oid.clone(), tree);

        oid
    }

    pub fn work_path(&self, path: &str) -> PathBuf {
        self.workspace.path().join(path)
    }

    pub fn write_work(&self, path: &str, content: &str) {
        let abs = self.work_path(path);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(abs, content).expect("Failed to write working file");
    }

    pub fn read_work(&self, path: &str) -> String {
        std::fs::read_to_string(self.work_path(path)).expect("Failed to read working file")
    }

    /// Stage the given files as clean: each must already be on disk, its
    /// entry records the live stat and the content's real id
    pub fn seed_index_clean(&self, files: &[(&str, &str)]) {
        let entries = files
            .iter()
            .map(|(path, content)| {
                let metadata = self
                    .workspace
                    .stat(Path::new(path))
                    .expect("Failed to stat staged file")
                    .expect("Staged file missing from workspace");
                IndexEntry::new(
                    PathBuf::from(path),
                    Self::blob_oid(content),
                    Stage::Merged,
                    metadata,
                )
            })
            .collect();
        self.seed_index_entries(entries);
    }

    pub fn seed_index_entries(&self, entries: Vec<IndexEntry>) {
        Index::lock(self.index_path.clone().into_boxed_path())
            .expect("Failed to lock index for seeding")
            .commit(entries)
            .expect("Failed to seed index");
    }

    pub fn lock_index(&self) -> LockedIndex {
        Index::lock(self.index_path.clone().into_boxed_path()).expect("Failed to lock index")
    }

    pub fn load_index(&self) -> Index {
        Index::load(self.index_path.clone().into_boxed_path()).expect("Failed to load index")
    }

    /// Write the files, plant them as the head tree, and stage them clean;
    /// the usual "repository at rest" starting point. Returns the head id.
    pub fn establish(&mut self, files: &[(&str, &str)]) -> ObjectId {
        for (path, content) in files {
            self.write_work(path, content);
        }
        let head = self.plant_tree(files);
        self.seed_index_clean(files);
        head
    }

    /// Run one reconciliation and hand back the outcome plus the report
    pub fn reconcile(
        &self,
        head: Option<ObjectId>,
        merge: ObjectId,
        options: ReconcileOptions,
    ) -> (Result<(), ReconcileError>, ReconcileReport) {
        let mut reconciler = Reconciler::new(
            &self.store,
            &self.workspace,
            self.lock_index(),
            head,
            merge,
            options,
        );
        let result = reconciler.reconcile();
        (result, reconciler.report().clone())
    }
}
