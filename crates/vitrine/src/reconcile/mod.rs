//! # Reconciliation Engine
//!
//! Offline diagnosis and repair of divergence between image records and the
//! uploads tree. The request path (resolver, guard) only works around
//! inconsistencies; this module is where they get fixed.
//!
//! ## Pipeline
//!
//! ```text
//! Snapshot::capture ──> diagnose ──> Report ──> plan ──> RepairPlan ──> execute ──> RepairOutcome
//!   (store + files)      (pure)                 (pure)                 (effects)
//! ```
//!
//! - [`Snapshot`] reads every record and every file once.
//! - [`diagnose::diagnose`] classifies divergences into [`FindingKind`]s.
//! - [`plan::plan`] turns a report into ordered [`plan::RepairAction`]s under a
//!   [`RepairPolicy`]. Several findings touching one record merge into one update.
//! - [`executor::execute`] applies the actions. Files move copy → verify → delete:
//!   an action listing `requires` runs only once those canonical files exist and
//!   are non-empty, so a crash mid-run leaves both copies behind, never neither.
//!   Failures are logged per action and never abort the batch.
//!
//! Both pure stages are unit tested over in-memory snapshots.
//!
//! ## Idempotence
//!
//! Diagnosing right after a repair yields an empty report (or, when
//! `placeholder_unrecoverable` is off, only the findings that were handed back for
//! manual attention). A partial run followed by a fresh run converges to the same
//! end state.
//!
//! ## Serialization
//!
//! [`Reconciler`] holds a [`lock::ReconcileLock`] for the duration of a repair;
//! a concurrent run fails with [`crate::error::VitrineError::LockHeld`].

use crate::error::Result;
use crate::files::FileBackend;
use crate::model::{ImageRecord, Owner, RecordId};
use crate::resolver::Location;
use crate::store::ImageRecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

pub mod diagnose;
pub mod executor;
pub mod lock;
pub mod plan;

pub use diagnose::diagnose;
pub use executor::{execute, ActionResult, ActionStatus, RepairOutcome};
pub use lock::{ReconcileLock, LOCK_FILE};
pub use plan::{plan, RepairAction, RepairPlan};

/// How aggressive a repair is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Delete demoted duplicate primaries and their files.
    pub dedupe: bool,
    /// Rewrite records whose file is gone everywhere to the placeholder.
    pub placeholder_unrecoverable: bool,
    /// Reference written into records that can never resolve.
    pub placeholder_filename: String,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            dedupe: false,
            placeholder_unrecoverable: true,
            placeholder_filename: "placeholder.png".to_string(),
        }
    }
}

/// Every record and every file, read once at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<ImageRecord>,
    /// Relative path → size in bytes.
    pub files: BTreeMap<String, u64>,
}

impl Snapshot {
    pub fn capture<S: ImageRecordStore, F: FileBackend>(store: &S, files: &F) -> Result<Self> {
        let mut records = store.list_all()?;
        records.sort_by_key(|r| r.id);
        Ok(Self {
            records,
            files: files.list_files()?,
        })
    }

    /// Empty files count as missing: a truncated copy must not pass for a
    /// repaired one.
    pub fn has_file(&self, relative: &str) -> bool {
        self.files.get(relative).is_some_and(|len| *len > 0)
    }

    pub fn records_of<'a>(&'a self, owner: &'a Owner) -> impl Iterator<Item = &'a ImageRecord> + 'a {
        self.records.iter().filter(move |r| &r.owner == owner)
    }

    pub fn record(&self, id: RecordId) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FindingKind {
    /// Canonical file missing. `fallback` is where the file still lives, if
    /// anywhere.
    OrphanRecord { fallback: Option<Location> },
    /// A canonical main image no record of its owner refers to.
    OrphanFile {
        path: String,
        filename: String,
        thumbnail: bool,
    },
    /// The stored path encodes another owner. `source` is the file to copy into
    /// the declared owner's directory, `None` when the canonical copy already
    /// exists.
    MismatchedPath {
        encoded_owner: Owner,
        source: Option<String>,
    },
    DuplicatePrimary { keep: RecordId, demote: Vec<RecordId> },
    /// `blob:` URLs, data URIs and names that can never reach a real file.
    BrokenReference { reference: String },
}

impl FindingKind {
    pub fn label(&self) -> &'static str {
        match self {
            FindingKind::OrphanRecord { .. } => "orphan-record",
            FindingKind::OrphanFile { .. } => "orphan-file",
            FindingKind::MismatchedPath { .. } => "mismatched-path",
            FindingKind::DuplicatePrimary { .. } => "duplicate-primary",
            FindingKind::BrokenReference { .. } => "broken-reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub owner: Owner,
    /// The record the finding is about; `None` for orphan files and for the
    /// owner-wide duplicate check.
    pub record: Option<RecordId>,
    #[serde(flatten)]
    pub kind: FindingKind,
}

impl Finding {
    /// True for an orphan record no repair can recover.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self.kind, FindingKind::OrphanRecord { fallback: None })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub records_scanned: usize,
    pub files_scanned: usize,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings a repair under `policy` would act on.
    pub fn actionable(&self, policy: &RepairPolicy) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| policy.placeholder_unrecoverable || !f.is_unrecoverable())
            .collect()
    }

    /// Finding count per kind label, in label order.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.kind.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of one `repair` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RepairRun {
    pub report: Report,
    pub plan: RepairPlan,
    /// `None` for dry runs.
    pub outcome: Option<RepairOutcome>,
    /// Diagnosis taken after the actions ran.
    pub after: Option<Report>,
}

/// Drives the pipeline against a live store and uploads tree.
pub struct Reconciler<'a, S: ImageRecordStore, F: FileBackend> {
    store: &'a mut S,
    files: &'a F,
    policy: RepairPolicy,
    lock_path: Option<PathBuf>,
}

impl<'a, S: ImageRecordStore, F: FileBackend> Reconciler<'a, S, F> {
    pub fn new(store: &'a mut S, files: &'a F, policy: RepairPolicy) -> Self {
        Self {
            store,
            files,
            policy,
            lock_path: None,
        }
    }

    /// Serialize repairs through a lock file at `path`.
    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::capture(&*self.store, self.files)
    }

    pub fn diagnose(&self) -> Result<Report> {
        let snapshot = self.snapshot()?;
        Ok(diagnose(&snapshot, &self.policy))
    }

    pub fn repair(&mut self, dry_run: bool) -> Result<RepairRun> {
        let lock = match (&self.lock_path, dry_run) {
            (Some(path), false) => Some(ReconcileLock::acquire(path.clone())?),
            _ => None,
        };

        let snapshot = self.snapshot()?;
        let report = diagnose(&snapshot, &self.policy);
        let plan = plan(&report, &snapshot, &self.policy);
        info!(
            findings = report.findings.len(),
            actions = plan.actions.len(),
            dry_run,
            "reconciliation planned"
        );

        if dry_run {
            return Ok(RepairRun {
                report,
                plan,
                outcome: None,
                after: None,
            });
        }

        let outcome = execute(&mut *self.store, self.files, &plan);
        let after = self.diagnose()?;
        info!(
            applied = outcome.applied(),
            skipped = outcome.skipped(),
            failed = outcome.failed(),
            remaining = after.findings.len(),
            "reconciliation finished"
        );

        if let Some(lock) = lock {
            lock.release()?;
        }

        Ok(RepairRun {
            report,
            plan,
            outcome: Some(outcome),
            after: Some(after),
        })
    }
}
