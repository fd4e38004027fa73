//! Apply a [`RepairPlan`] to a live store and uploads tree.

use super::plan::{RepairAction, RepairPlan};
use super::Finding;
use crate::error::Result;
use crate::files::FileBackend;
use crate::store::ImageRecordStore;
use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ActionStatus {
    Applied,
    /// A required file was missing or empty.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: RepairAction,
    #[serde(flatten)]
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairOutcome {
    pub results: Vec<ActionResult>,
    pub needs_attention: Vec<Finding>,
}

impl RepairOutcome {
    fn count(&self, pred: impl Fn(&ActionStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Failed { .. }))
    }
}

/// Run every action in plan order. Failures are recorded and logged; the batch
/// always runs to the end.
pub fn execute<S: ImageRecordStore, F: FileBackend>(
    store: &mut S,
    files: &F,
    plan: &RepairPlan,
) -> RepairOutcome {
    let mut results = Vec::with_capacity(plan.actions.len());

    for action in &plan.actions {
        let status = match missing_requirement(files, action.requires()) {
            Some(path) => {
                warn!(%action, requires = %path, "skipping repair action");
                ActionStatus::Skipped {
                    reason: format!("{} is missing or empty", path),
                }
            }
            None => match apply(store, files, action) {
                Ok(()) => {
                    info!(%action, "repair applied");
                    ActionStatus::Applied
                }
                Err(e) => {
                    error!(%action, error = %e, "repair action failed");
                    ActionStatus::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };
        results.push(ActionResult {
            action: action.clone(),
            status,
        });
    }

    for finding in &plan.needs_attention {
        warn!(owner = %finding.owner, kind = finding.kind.label(), "needs manual attention");
    }

    RepairOutcome {
        results,
        needs_attention: plan.needs_attention.clone(),
    }
}

fn missing_requirement<'a, F: FileBackend>(files: &F, requires: &'a [String]) -> Option<&'a str> {
    requires
        .iter()
        .find(|path| !files.file_len(path).is_some_and(|len| len > 0))
        .map(String::as_str)
}

fn apply<S: ImageRecordStore, F: FileBackend>(
    store: &mut S,
    files: &F,
    action: &RepairAction,
) -> Result<()> {
    match action {
        RepairAction::CopyFile { from, to } => {
            files.copy(from, to)?;
            // Verify before anything may depend on the copy.
            match files.file_len(to) {
                Some(len) if len > 0 => {
                    debug!(from = %from, to = %to, bytes = len, "copy verified");
                    Ok(())
                }
                _ => Err(crate::error::VitrineError::Store(format!(
                    "Copy to {} could not be verified",
                    to
                ))),
            }
        }
        RepairAction::InsertRecord { image, .. } => {
            let record = store.insert(image.clone())?;
            debug!(id = %record.id, "record inserted");
            Ok(())
        }
        RepairAction::UpdateRecord { record, .. } => store.upsert(record),
        RepairAction::DeleteRecord { id } => store.delete(*id),
        RepairAction::RemoveFile { path, .. } => files.remove(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::mem::MemFiles;
    use crate::model::{NewImage, Owner};
    use crate::reconcile::{diagnose, plan, RepairPolicy, Snapshot};
    use crate::store::memory::MemoryRecordStore;

    fn run(store: &mut MemoryRecordStore, files: &MemFiles) -> RepairOutcome {
        let policy = RepairPolicy::default();
        let snapshot = Snapshot::capture(&*store, files).unwrap();
        let report = diagnose(&snapshot, &policy);
        let plan = plan(&report, &snapshot, &policy);
        execute(store, files, &plan)
    }

    #[test]
    fn failed_copy_keeps_the_original() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::product(3, 21), "x.jpg").primary())
            .unwrap();
        let files = MemFiles::with_files(["x.jpg"]);
        files.set_fail_copies(true);

        let outcome = run(&mut store, &files);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.skipped(), 1);
        assert!(files.exists("x.jpg"));
        assert!(!files.exists("stores/3/products/21/x.jpg"));
    }

    #[test]
    fn truncated_copy_is_not_trusted() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::product(3, 21), "x.jpg").primary())
            .unwrap();
        let files = MemFiles::with_files(["x.jpg"]);
        files.set_truncate_copies(true);

        let outcome = run(&mut store, &files);
        assert_eq!(outcome.failed(), 1);
        assert!(files.exists("x.jpg"));

        // Once copies work again the next run finishes the job.
        files.set_truncate_copies(false);
        let outcome = run(&mut store, &files);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(outcome.applied(), 2);
        assert!(!files.exists("x.jpg"));
        assert_eq!(files.file_len("stores/3/products/21/x.jpg"), Some(11));
    }

    #[test]
    fn inserts_skip_files_that_vanished() {
        let mut store = MemoryRecordStore::new();
        let files = MemFiles::with_files(["stores/1/a.jpg"]);
        let policy = RepairPolicy::default();
        let snapshot = Snapshot::capture(&store, &files).unwrap();
        let plan = plan(&diagnose(&snapshot, &policy), &snapshot, &policy);

        files.remove("stores/1/a.jpg").unwrap();
        let outcome = execute(&mut store, &files, &plan);
        assert_eq!(outcome.skipped(), 1);
        assert!(store.list_all().unwrap().is_empty());
    }
}
