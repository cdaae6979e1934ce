//! Classification of raw notify events.
//!
//! The watcher only cares whether content became available at a path or
//! went away from it. Everything else (attribute changes, access) is
//! dropped here.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// A filesystem event for a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    /// The path was the source of a rename.
    RenamedAway(PathBuf),
    /// Permission, attribute or access changes.
    Other(PathBuf),
}

/// What a watcher should do in response to an [`FsEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAction {
    /// Content is available, (re)deliver it.
    Upsert,
    /// Content is gone.
    Remove,
    Ignore,
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Created(p)
            | FsEvent::Modified(p)
            | FsEvent::Removed(p)
            | FsEvent::RenamedAway(p)
            | FsEvent::Other(p) => p,
        }
    }

    pub fn action(&self) -> FsAction {
        match self {
            FsEvent::Created(_) | FsEvent::Modified(_) => FsAction::Upsert,
            FsEvent::Removed(_) | FsEvent::RenamedAway(_) => FsAction::Remove,
            FsEvent::Other(_) => FsAction::Ignore,
        }
    }
}

/// Split a notify event into one [`FsEvent`] per affected path.
///
/// Renames are reported as "source gone" plus "destination created". A
/// rename whose direction the backend does not report (FSEvents) is resolved
/// by checking whether the path still exists.
pub fn classify(event: &Event) -> Vec<FsEvent> {
    let paths = event.paths.iter().cloned();

    match &event.kind {
        EventKind::Create(_) => paths.map(FsEvent::Created).collect(),
        EventKind::Remove(_) => paths.map(FsEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            paths.map(FsEvent::Modified).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(FsEvent::RenamedAway).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(FsEvent::Created).collect()
        }
        // Backends that pair renames report From and To separately as well.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            paths.map(FsEvent::Other).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .map(|p| {
                if p.exists() {
                    FsEvent::Created(p)
                } else {
                    FsEvent::RenamedAway(p)
                }
            })
            .collect(),
        _ => paths.map(FsEvent::Other).collect(),
    }
}
