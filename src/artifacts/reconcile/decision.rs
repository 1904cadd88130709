//! Decision engine
//!
//! A pure function from a per-path quadruple (plus two precomputed
//! comparisons: whether the working entry is clean relative to the index,
//! and whether an ancestor of the path is a blob in the merge tree) to
//! exactly one action. The engine is total: any kind combination without a
//! documented rule resolves to Keep, so an unrecognized case never mutates
//! anything.
//!
//! When at least one file and one directory appear simultaneously among
//! head/index/merge, the fixed resolution table below applies, keyed by
//! the exact kind triple. Otherwise the scalar content-id rules run.
//!
//! ```text
//!  H   I   M   condition            action
//!  -------------------------------------------
//!  D   D   F   clean, h==m          Update
//!  D   D   F   otherwise            Conflict
//!  D   F   D                        Remove
//!  D   F   F   i==m                 Keep
//!  D   F   F   i!=m                 Conflict
//!  F   D   F   h==i, clean          Update
//!  F   D   F   h==i, not clean      Conflict
//!  F   D   D   i==m                 Keep
//!  F   D   D   i!=m                 Conflict
//!  F   F   D   i==m, clean          Update
//!  F   F   D   i==m, not clean      Conflict
//!  0   F   D                        Conflict
//!  0   D   F   clean                Update
//!  0   D   F   not clean            Conflict
//!  F   0   D                        Update
//!  D   0   F                        Update
//!  (anything else mixed)            Keep
//! ```

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::reconcile::entry_source::SourceEntry;
use crate::artifacts::reconcile::walker::Quadruple;

/// What happens to one path
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Carry the existing index entries unchanged, touch nothing on disk
    Keep,
    /// Replace the stage-0 entry and materialize the merge content
    Update { oid: ObjectId, mode: EntryMode },
    /// Drop the path from the index and delete it from disk
    Remove,
    /// Stage the sides of the path and report it
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Absent,
    File,
    Dir,
}

/// Decide the action for one path in two-tree mode
///
/// `clean` is whether the working entry matches the index entry; `ancestor_blob`
/// is whether some ancestor of the path is a tracked blob in the merge tree.
pub fn decide(q: &Quadruple, clean: bool, ancestor_blob: bool) -> Action {
    let h = kind_of(q.head.as_ref());
    let i = index_kind(q);
    let m = kind_of(q.merge.as_ref());

    let kinds = [h, i, m];
    let any_file = kinds.contains(&Kind::File);
    let any_dir = kinds.contains(&Kind::Dir);

    if any_file && any_dir {
        return decide_mixed(q, (h, i, m), clean);
    }

    if any_dir {
        // only directories present here; their contents are separate paths
        return Action::Keep;
    }

    decide_scalar(q, clean, ancestor_blob)
}

/// Decide the action for one path in one-tree mode (no head, e.g. initial
/// checkout): the merge tree wins wherever it has content, staged entries
/// with no merge counterpart are dropped when something exists on disk
pub fn decide_one_tree(q: &Quadruple) -> Action {
    match &q.merge {
        Some(merge) => update_to(merge),
        None => {
            if q.working.is_some() && q.index_entry().is_some() {
                Action::Remove
            } else {
                Action::Keep
            }
        }
    }
}

fn decide_mixed(q: &Quadruple, triple: (Kind, Kind, Kind), clean: bool) -> Action {
    use Kind::{Absent, Dir, File};

    let h_id = q.head.as_ref().and_then(|e| e.oid.as_ref());
    let i_id = q.index.as_ref().and_then(|slot| slot.oid());
    let m_id = q.merge.as_ref().and_then(|e| e.oid.as_ref());

    match triple {
        (Dir, Dir, File) => {
            if clean && ids_eq(h_id, m_id) {
                merge_update(q)
            } else {
                Action::Conflict
            }
        }
        (Dir, File, Dir) => Action::Remove,
        (Dir, File, File) | (File, Dir, Dir) => {
            if ids_eq(i_id, m_id) {
                Action::Keep
            } else {
                Action::Conflict
            }
        }
        (File, Dir, File) => {
            if ids_eq(h_id, i_id) {
                if clean { merge_update(q) } else { Action::Conflict }
            } else {
                Action::Keep
            }
        }
        (File, File, Dir) => {
            if ids_eq(i_id, m_id) {
                if clean { merge_update(q) } else { Action::Conflict }
            } else {
                Action::Keep
            }
        }
        (Absent, File, Dir) => Action::Conflict,
        (Absent, Dir, File) => {
            if clean {
                merge_update(q)
            } else {
                Action::Conflict
            }
        }
        (File, Absent, Dir) | (Dir, Absent, File) => merge_update(q),
        // no documented rule: never mutate on an unrecognized mixed case
        _ => Action::Keep,
    }
}

fn decide_scalar(q: &Quadruple, clean: bool, ancestor_blob: bool) -> Action {
    let h_id = q.head.as_ref().and_then(|e| e.oid.as_ref());
    let i_id = q.index_entry().map(|e| &e.oid);
    let m_id = q.merge.as_ref().and_then(|e| e.oid.as_ref());

    let dirty_or_gone = q.working.is_none() || !clean;

    match (q.index_entry(), q.head.as_ref(), q.merge.as_ref()) {
        (None, None, Some(merge)) => update_to(merge),
        (None, None, None) => Action::Keep,
        (None, Some(_), None) => Action::Remove,
        (None, Some(_), Some(merge)) => update_to(merge),
        (Some(_), None, merge) => {
            if merge.is_none() || ids_eq(i_id, m_id) {
                if ancestor_blob {
                    // the merge tree tracks an ancestor of this path as a
                    // blob; keeping the entry would alias a file with a
                    // directory
                    if dirty_or_gone {
                        Action::Conflict
                    } else {
                        Action::Remove
                    }
                } else {
                    Action::Keep
                }
            } else {
                Action::Conflict
            }
        }
        (Some(_), Some(_), None) => {
            if ids_eq(h_id, i_id) {
                if dirty_or_gone {
                    Action::Conflict
                } else {
                    Action::Remove
                }
            } else {
                Action::Conflict
            }
        }
        (Some(_), Some(_), Some(merge)) => {
            if !ids_eq(h_id, i_id) && !ids_eq(h_id, m_id) && !ids_eq(m_id, i_id) {
                Action::Conflict
            } else if ids_eq(h_id, i_id) && !ids_eq(m_id, i_id) {
                if dirty_or_gone {
                    Action::Conflict
                } else {
                    update_to(merge)
                }
            } else {
                Action::Keep
            }
        }
    }
}

fn merge_update(q: &Quadruple) -> Action {
    match &q.merge {
        Some(merge) => update_to(merge),
        None => Action::Keep,
    }
}

fn update_to(entry: &SourceEntry) -> Action {
    match &entry.oid {
        Some(oid) => Action::Update {
            oid: oid.clone(),
            mode: entry.mode.clone(),
        },
        None => Action::Keep,
    }
}

fn kind_of(entry: Option<&SourceEntry>) -> Kind {
    match entry {
        None => Kind::Absent,
        Some(e) if e.mode.is_tree() => Kind::Dir,
        Some(_) => Kind::File,
    }
}

fn index_kind(q: &Quadruple) -> Kind {
    match &q.index {
        None => Kind::Absent,
        Some(slot) if slot.is_tree() => Kind::Dir,
        Some(_) => Kind::File,
    }
}

fn ids_eq(a: Option<&ObjectId>, b: Option<&ObjectId>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}
