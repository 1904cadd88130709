//! Disk application: modes, stat write-back, symlinks, failure surfacing

use pretty_assertions::assert_eq;
use std::path::Path;
use twig::{EntryMode, FileMode, ReconcileError, ReconcileOptions};

mod common;
use common::Scratch;

#[cfg(unix)]
#[test]
fn executable_entries_get_the_executable_bit() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("plain", "p\n")]);
    let merge = scratch.plant_tree_with_modes(&[
        ("plain", "p\n", FileMode::Regular.into()),
        ("tool", "#!/bin/sh\nexit 0\n", FileMode::Executable.into()),
    ]);

    let (result, _) = scratch.reconcile(Some(head), merge, ReconcileOptions::default());

    result?;
    let mode = std::fs::metadata(scratch.work_path("tool"))?.permissions().mode();
    assert_eq!(mode & 0o111, 0o111);

    let index = scratch.load_index();
    let entry = index.entry_by_path(Path::new("tool")).expect("tool entry");
    assert_eq!(entry.metadata.mode, EntryMode::File(FileMode::Executable));

    Ok(())
}

#[cfg(unix)]
#[test]
fn the_executable_bit_is_left_alone_when_file_mode_is_off() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("plain", "p\n")]);
    let merge = scratch.plant_tree_with_modes(&[
        ("plain", "p\n", FileMode::Regular.into()),
        ("tool", "#!/bin/sh\nexit 0\n", FileMode::Executable.into()),
    ]);

    let options = ReconcileOptions {
        respect_file_mode: false,
        ..ReconcileOptions::default()
    };
    let (result, _) = scratch.reconcile(Some(head), merge, options);

    result?;
    let mode = std::fs::metadata(scratch.work_path("tool"))?.permissions().mode();
    assert_eq!(mode & 0o111, 0);

    Ok(())
}

#[test]
fn written_entries_record_their_fresh_stat() -> anyhow::Result<()> {
    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("x", "alpha\n")]);
    let merge = scratch.plant_tree(&[("x", "a much longer replacement\n")]);

    let (result, _) = scratch.reconcile(Some(head), merge, ReconcileOptions::default());

    result?;
    let index = scratch.load_index();
    let entry = index.entry_by_path(Path::new("x")).expect("entry for x");
    assert_eq!(entry.metadata.size, "a much longer replacement\n".len() as u64);
    assert!(entry.metadata.mtime > 0);

    Ok(())
}

#[test]
fn unresolvable_content_aborts_before_any_write() {
    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("x", "alpha\n")]);

    // a merge tree whose blob was never published to the store
    let missing = twig::ObjectId::try_parse("9".repeat(40)).unwrap();
    let mut tree = twig::Tree::new();
    tree.insert("x", twig::TreeNode::new(Scratch::blob_oid("alpha\n"), FileMode::Regular.into()));
    tree.insert("y", twig::TreeNode::new(missing.clone(), FileMode::Regular.into()));
    let merge = twig::ObjectId::try_parse("8".repeat(40)).unwrap();
    scratch.store.insert_tree(merge.clone(), tree);

    let index_before = std::fs::read(&scratch.index_path).unwrap();
    let (result, _) = scratch.reconcile(Some(head), merge, ReconcileOptions::default());

    match result {
        Err(ReconcileError::MissingContent { oid, path }) => {
            assert_eq!(oid, missing);
            assert_eq!(path, Path::new("y"));
        }
        other => panic!("expected missing content, got {:?}", other.err()),
    }

    // fail fast means no partial application at all
    assert!(!scratch.work_path("y").exists());
    assert_eq!(scratch.read_work("x"), "alpha\n");
    assert_eq!(std::fs::read(&scratch.index_path).unwrap(), index_before);
}

#[cfg(unix)]
#[test]
fn symlink_entries_are_materialized_as_links() -> anyhow::Result<()> {
    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("target.txt", "pointed at\n")]);
    let merge = scratch.plant_tree_with_modes(&[
        ("target.txt", "pointed at\n", FileMode::Regular.into()),
        ("link", "target.txt", EntryMode::Symlink),
    ]);

    let (result, _) = scratch.reconcile(Some(head), merge, ReconcileOptions::default());

    result?;
    let link = scratch.work_path("link");
    assert!(std::fs::symlink_metadata(&link)?.file_type().is_symlink());
    assert_eq!(std::fs::read_link(&link)?, Path::new("target.txt"));

    Ok(())
}

#[test]
fn gitlink_entries_become_placeholder_directories() -> anyhow::Result<()> {
    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("a", "a\n")]);
    let merge = scratch.plant_tree_with_modes(&[
        ("a", "a\n", FileMode::Regular.into()),
        ("vendor/lib", "", EntryMode::Gitlink),
    ]);

    let (result, _) = scratch.reconcile(Some(head), merge, ReconcileOptions::default());

    result?;
    assert!(scratch.work_path("vendor/lib").is_dir());

    let index = scratch.load_index();
    let entry = index
        .entry_by_path(Path::new("vendor/lib"))
        .expect("gitlink entry");
    assert_eq!(entry.metadata.mode, EntryMode::Gitlink);

    Ok(())
}

#[test]
fn a_failed_write_surfaces_with_the_planned_sets() {
    let mut scratch = Scratch::new();
    let head = scratch.establish(&[("ok", "fine\n")]);

    // a name no filesystem accepts: the rename and its retry both fail
    let long_name = "n".repeat(300);
    let merge = scratch.plant_tree(&[("ok", "fine\n"), (long_name.as_str(), "content\n")]);

    let mut reconciler = twig::Reconciler::new(
        &scratch.store,
        &scratch.workspace,
        scratch.lock_index(),
        Some(head),
        merge,
        ReconcileOptions::default(),
    );
    let result = reconciler.reconcile();

    match result {
        Err(ReconcileError::WriteFailure { path, .. }) => {
            assert_eq!(path, Path::new(&long_name));
        }
        other => panic!("expected a write failure, got {:?}", other.err()),
    }

    // the planned sets stay readable for inspection
    assert!(reconciler.updated().contains_key(Path::new(&long_name)));

    // the prior index survived the aborted run
    let index = scratch.load_index();
    assert!(index.entry_by_path(Path::new("ok")).is_some());
    assert_eq!(index.len(), 1);
}
