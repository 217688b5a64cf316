// src/reconcile.rs

use anyhow::Result;

use crate::snapshot::Snapshot;

/// Decides whether a fetched snapshot carries anything the archive lacks.
pub trait ChangeDetector {
    fn is_unchanged(&self, archive: &Snapshot, snapshot: &Snapshot) -> bool;
}

/// Whole-table equality: same columns, same rows, same order.
///
/// A reordered snapshot, or one that repeats rows already archived, counts
/// as new data.
#[derive(Clone, Copy, Debug, Default)]
pub struct WholeSnapshotEquality;

impl ChangeDetector for WholeSnapshotEquality {
    fn is_unchanged(&self, archive: &Snapshot, snapshot: &Snapshot) -> bool {
        archive.same_content(snapshot)
    }
}

/// What the reconciler wants done with the archive.
#[derive(Debug)]
pub enum Reconciliation {
    Unchanged,
    /// Persist `merged` as the new archive.
    Append {
        merged: Snapshot,
        appended: usize,
        bootstrap: bool,
    },
}

/// Compare `snapshot` with the current archive and build the new archive if needed.
///
/// A missing archive is bootstrapped from the snapshot alone.
pub fn reconcile(
    detector: &dyn ChangeDetector,
    archive: Option<&Snapshot>,
    snapshot: &Snapshot,
) -> Result<Reconciliation> {
    let Some(archive) = archive else {
        return Ok(Reconciliation::Append {
            merged: snapshot.clone(),
            appended: snapshot.num_rows(),
            bootstrap: true,
        });
    };

    if detector.is_unchanged(archive, snapshot) {
        return Ok(Reconciliation::Unchanged);
    }

    let merged = archive.concat(snapshot)?;
    Ok(Reconciliation::Append {
        merged,
        appended: snapshot.num_rows(),
        bootstrap: false,
    })
}
