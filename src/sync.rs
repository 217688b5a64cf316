// src/sync.rs

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::{io::Write, path::PathBuf};
use tracing::{error, info, info_span, warn};

use crate::{
    archive::Archive,
    config::Config,
    family::{Family, FamilySpec},
    fetch::Fetcher,
    gate::Trigger,
    history::{SyncHistory, SyncOutcome, SyncRow},
    reconcile::{reconcile, ChangeDetector, Reconciliation, WholeSnapshotEquality},
    snapshot::Snapshot,
};

/// How one family ended in a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FamilyStatus {
    Appended {
        fetched: usize,
        archive_rows: usize,
        bootstrap: bool,
    },
    Unchanged {
        fetched: usize,
        archive_rows: usize,
    },
    /// Already synced today and the history skip is on.
    Skipped,
    DownloadFailed {
        status: String,
    },
    Failed {
        reason: String,
    },
}

impl FamilyStatus {
    pub fn outcome(&self) -> Option<SyncOutcome> {
        match self {
            FamilyStatus::Appended { .. } => Some(SyncOutcome::Appended),
            FamilyStatus::Unchanged { .. } => Some(SyncOutcome::Unchanged),
            FamilyStatus::Skipped => None,
            FamilyStatus::DownloadFailed { .. } => Some(SyncOutcome::DownloadFailed),
            FamilyStatus::Failed { .. } => Some(SyncOutcome::Failed),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FamilyStatus::DownloadFailed { .. } | FamilyStatus::Failed { .. }
        )
    }

    fn counts(&self) -> (u64, u64) {
        match self {
            FamilyStatus::Appended {
                fetched,
                archive_rows,
                ..
            }
            | FamilyStatus::Unchanged {
                fetched,
                archive_rows,
            } => (*fetched as u64, *archive_rows as u64),
            _ => (0, 0),
        }
    }
}

/// Result of one invocation of [`Synchronizer::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// False when the trigger kept the gate closed.
    pub ran: bool,
    pub results: Vec<(Family, FamilyStatus)>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|(_, s)| s.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    pub fn status(&self, family: Family) -> Option<&FamilyStatus> {
        self.results
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, s)| s)
    }
}

/// Runs the fetch → compare → append pipeline for every configured family.
pub struct Synchronizer<F: Fetcher> {
    fetcher: F,
    detector: Box<dyn ChangeDetector>,
    families: Vec<FamilySpec>,
    archive_dir: PathBuf,
    history_dir: Option<PathBuf>,
    skip_if_synced: bool,
}

impl<F: Fetcher> Synchronizer<F> {
    /// All built-in families, whole-snapshot equality, no history.
    pub fn new(fetcher: F, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            detector: Box::new(WholeSnapshotEquality),
            families: Family::ALL.iter().map(Family::default_spec).collect(),
            archive_dir: archive_dir.into(),
            history_dir: None,
            skip_if_synced: false,
        }
    }

    pub fn from_config(fetcher: F, config: &Config) -> Self {
        let mut sync = Self::new(fetcher, config.archive_dir.clone())
            .with_families(config.family_specs());
        if let Some(dir) = &config.history_dir {
            sync = sync.with_history(dir.clone(), config.skip_if_synced);
        }
        sync
    }

    pub fn with_families(mut self, families: Vec<FamilySpec>) -> Self {
        self.families = families;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_history(mut self, dir: impl Into<PathBuf>, skip_if_synced: bool) -> Self {
        self.history_dir = Some(dir.into());
        self.skip_if_synced = skip_if_synced;
        self
    }

    /// Keep only the listed families, in their configured order.
    pub fn retain_families(&mut self, keep: &[Family]) {
        self.families.retain(|s| keep.contains(&s.family));
    }

    pub fn families(&self) -> &[FamilySpec] {
        &self.families
    }

    /// Run every family if `trigger` accepts `today`.
    ///
    /// A closed gate returns at once: nothing is fetched, written or printed.
    /// Status lines go to `out`; only a failure to write them is an `Err`.
    pub fn run<T, W>(&self, trigger: &T, today: NaiveDate, out: &mut W) -> Result<RunSummary>
    where
        T: Trigger + ?Sized,
        W: Write,
    {
        if !trigger.should_run(today) {
            return Ok(RunSummary::default());
        }
        info!(%today, families = self.families.len(), "sync started");

        let mut history = self.open_history();
        let mut summary = RunSummary {
            ran: true,
            results: Vec::with_capacity(self.families.len()),
        };

        for spec in &self.families {
            let _span = info_span!("family", name = spec.family.as_str()).entered();
            let started = Utc::now();

            let status = if self.skip_if_synced
                && history
                    .as_ref()
                    .is_some_and(|h| h.synced_on(spec.family, today))
            {
                writeln!(out, "{}: Already synced today", spec.label())?;
                info!("already synced today, skipping");
                FamilyStatus::Skipped
            } else {
                self.sync_family(spec, out)?
            };

            if let (Some(h), Some(outcome)) = (history.as_mut(), status.outcome()) {
                let (rows_fetched, archive_rows) = status.counts();
                let row = SyncRow {
                    family: spec.family,
                    run_date: today,
                    outcome,
                    rows_fetched,
                    archive_rows,
                    started,
                    finished: Utc::now(),
                };
                if let Err(e) = h.add(&row) {
                    warn!(error = %format!("{:#}", e), "could not record sync history");
                }
            }

            summary.results.push((spec.family, status));
        }

        if let Some(h) = &history {
            if let Err(e) = h.vacuum() {
                warn!(error = %format!("{:#}", e), "history vacuum failed");
            }
        }

        info!(failures = summary.failures(), "sync finished");
        Ok(summary)
    }

    fn open_history(&self) -> Option<SyncHistory> {
        let dir = self.history_dir.as_ref()?;
        match SyncHistory::new_synced(dir) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!(dir = %dir.display(), error = %format!("{:#}", e), "sync history unavailable");
                None
            }
        }
    }

    fn sync_family<W: Write>(&self, spec: &FamilySpec, out: &mut W) -> std::io::Result<FamilyStatus> {
        let label = spec.label();

        let snapshot = match self.fetcher.fetch(spec) {
            Ok(snapshot) => {
                writeln!(out, "{}: Download - Ok - 200", label)?;
                snapshot
            }
            Err(e) if e.is_download_failure() => {
                let status = e.status_indicator();
                writeln!(out, "{}: Download - Error - {}", label, status)?;
                warn!(error = %e, "download failed, no update this cycle");
                return Ok(FamilyStatus::DownloadFailed { status });
            }
            Err(e) => {
                writeln!(out, "{}: Download - Ok - 200", label)?;
                error!(error = %e, "snapshot rejected");
                return Ok(FamilyStatus::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let archive = Archive::new(self.archive_dir.join(&spec.archive));
        let (decision, archive_rows) = match self.decide(&archive, &snapshot) {
            Ok(d) => d,
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(archive = %archive.path().display(), error = %reason, "reconcile failed");
                return Ok(FamilyStatus::Failed { reason });
            }
        };

        match decision {
            Reconciliation::Unchanged => {
                writeln!(out, "{}: No new data to append", label)?;
                info!(rows = archive_rows, "archive already current");
                Ok(FamilyStatus::Unchanged {
                    fetched: snapshot.num_rows(),
                    archive_rows,
                })
            }
            Reconciliation::Append {
                merged,
                appended,
                bootstrap,
            } => {
                writeln!(out, "{}: New data to append", label)?;
                match archive.persist(&merged) {
                    Ok(bytes) => {
                        info!(
                            appended,
                            rows = merged.num_rows(),
                            bytes,
                            bootstrap,
                            "archive updated"
                        );
                        Ok(FamilyStatus::Appended {
                            fetched: snapshot.num_rows(),
                            archive_rows: merged.num_rows(),
                            bootstrap,
                        })
                    }
                    Err(e) => {
                        let reason = format!("{:#}", e);
                        error!(archive = %archive.path().display(), error = %reason, "archive write failed");
                        Ok(FamilyStatus::Failed { reason })
                    }
                }
            }
        }
    }

    /// Load the archive and reconcile it with `snapshot`.
    fn decide(&self, archive: &Archive, snapshot: &Snapshot) -> Result<(Reconciliation, usize)> {
        let existing = archive.load()?;
        if existing.is_none() {
            info!(archive = %archive.path().display(), "archive missing, bootstrapping");
        }
        let rows = existing.as_ref().map_or(0, Snapshot::num_rows);
        let decision = reconcile(self.detector.as_ref(), existing.as_ref(), snapshot)?;
        Ok((decision, rows))
    }
}
