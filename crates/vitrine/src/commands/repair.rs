use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::files::FileBackend;
use crate::reconcile::{ActionStatus, Reconciler, RepairPolicy};
use crate::store::ImageRecordStore;
use std::path::PathBuf;

use super::doctor::describe;

pub fn run<S: ImageRecordStore, F: FileBackend>(
    store: &mut S,
    files: &F,
    policy: RepairPolicy,
    lock_file: Option<PathBuf>,
    dry_run: bool,
) -> Result<CmdResult> {
    let mut reconciler = Reconciler::new(store, files, policy);
    if let Some(lock_file) = lock_file {
        reconciler = reconciler.with_lock(lock_file);
    }
    let run = reconciler.repair(dry_run)?;
    let mut result = CmdResult::default();

    if run.report.is_clean() {
        result.add_message(CmdMessage::success("Nothing to repair."));
        return result.with_data(&run);
    }

    if dry_run {
        result.add_message(CmdMessage::info(format!(
            "Would apply {} action(s) for {} finding(s):",
            run.plan.actions.len(),
            run.report.findings.len()
        )));
        for action in &run.plan.actions {
            result.add_message(CmdMessage::info(format!("  - {}", action)));
        }
    }

    if let Some(outcome) = &run.outcome {
        for action in &outcome.results {
            let message = match &action.status {
                ActionStatus::Applied => CmdMessage::success(format!("  {}", action.action)),
                ActionStatus::Skipped { reason } => {
                    CmdMessage::warning(format!("  skipped {}: {}", action.action, reason))
                }
                ActionStatus::Failed { error } => {
                    CmdMessage::error(format!("  failed {}: {}", action.action, error))
                }
            };
            result.add_message(message);
        }
        result.add_message(CmdMessage::info(format!(
            "Applied {}, skipped {}, failed {}.",
            outcome.applied(),
            outcome.skipped(),
            outcome.failed()
        )));
    }

    for finding in &run.plan.needs_attention {
        result.add_message(CmdMessage::warning(format!(
            "Needs attention: {}",
            describe(finding)
        )));
    }

    if let Some(after) = &run.after {
        if after.is_clean() {
            result.add_message(CmdMessage::success("All records consistent."));
        } else {
            result.add_message(CmdMessage::warning(format!(
                "{} finding(s) remain; re-run `vitrine doctor` for details.",
                after.findings.len()
            )));
        }
    }

    result.with_data(&run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MessageLevel;
    use crate::files::mem::MemFiles;
    use crate::model::{NewImage, Owner};
    use crate::store::memory::MemoryRecordStore;

    #[test]
    fn repair_then_nothing_to_do() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::product(3, 21), "x.jpg").primary())
            .unwrap();
        let files = MemFiles::with_files(["x.jpg"]);

        let first = run(&mut store, &files, RepairPolicy::default(), None, false).unwrap();
        assert!(first
            .messages
            .iter()
            .any(|m| m.content.contains("All records consistent")));

        let second = run(&mut store, &files, RepairPolicy::default(), None, false).unwrap();
        assert_eq!(second.messages[0].content, "Nothing to repair.");
    }

    #[test]
    fn dry_run_lists_actions() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::product(3, 21), "x.jpg").primary())
            .unwrap();
        let files = MemFiles::with_files(["x.jpg"]);

        let result = run(&mut store, &files, RepairPolicy::default(), None, true).unwrap();
        assert!(result
            .messages
            .iter()
            .any(|m| m.content.contains("copy x.jpg -> stores/3/products/21/x.jpg")));
        assert!(files.exists("x.jpg"));
        assert!(!files.exists("stores/3/products/21/x.jpg"));
    }

    #[test]
    fn failures_surface_as_errors() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::product(3, 21), "x.jpg").primary())
            .unwrap();
        let files = MemFiles::with_files(["x.jpg"]);
        files.set_fail_copies(true);

        let result = run(&mut store, &files, RepairPolicy::default(), None, false).unwrap();
        assert!(result.has_level(MessageLevel::Error));
        assert!(files.exists("x.jpg"));
    }

    #[test]
    fn held_lock_refuses_to_run() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(crate::reconcile::LOCK_FILE);
        let _held = crate::reconcile::ReconcileLock::acquire(&lock).unwrap();

        let mut store = MemoryRecordStore::new();
        let files = MemFiles::new();
        let err = run(&mut store, &files, RepairPolicy::default(), Some(lock), false).unwrap_err();
        assert!(matches!(err, crate::error::VitrineError::LockHeld { .. }));
    }
}
