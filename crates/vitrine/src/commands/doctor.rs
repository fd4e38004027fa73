use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::files::FileBackend;
use crate::reconcile::{Finding, FindingKind, Reconciler, RepairPolicy};
use crate::store::ImageRecordStore;

pub fn run<S: ImageRecordStore, F: FileBackend>(
    store: &mut S,
    files: &F,
    policy: RepairPolicy,
) -> Result<CmdResult> {
    let report = Reconciler::new(store, files, policy).diagnose()?;
    let mut result = CmdResult::default();

    if report.is_clean() {
        result.add_message(CmdMessage::success(format!(
            "No inconsistencies found ({} records, {} files).",
            report.records_scanned, report.files_scanned
        )));
    } else {
        result.add_message(CmdMessage::warning(format!(
            "{} inconsistencies found ({} records, {} files):",
            report.findings.len(),
            report.records_scanned,
            report.files_scanned
        )));
        for (label, count) in report.counts() {
            result.add_message(CmdMessage::info(format!("  {}: {}", label, count)));
        }
        for finding in &report.findings {
            result.add_message(CmdMessage::info(format!("  - {}", describe(finding))));
        }
        result.add_message(CmdMessage::info("Run `vitrine repair` to fix them."));
    }

    result.with_data(&report)
}

pub(crate) fn describe(finding: &Finding) -> String {
    let subject = match finding.record {
        Some(id) => format!("{} record {}", finding.owner, id),
        None => finding.owner.to_string(),
    };
    match &finding.kind {
        FindingKind::OrphanRecord {
            fallback: Some(location),
        } => format!("{}: file only at {}", subject, location.path),
        FindingKind::OrphanRecord { fallback: None } => {
            format!("{}: file missing everywhere", subject)
        }
        FindingKind::OrphanFile { path, .. } => format!("{}: unregistered file {}", subject, path),
        FindingKind::MismatchedPath {
            encoded_owner,
            source,
        } => match source {
            Some(source) => format!("{}: stored path {} belongs to {}", subject, source, encoded_owner),
            None => format!("{}: stored path points at {}", subject, encoded_owner),
        },
        FindingKind::DuplicatePrimary { keep, demote } => format!(
            "{}: {} primaries, keeping {}",
            subject,
            demote.len() + 1,
            keep
        ),
        FindingKind::BrokenReference { reference } => {
            format!("{}: unresolvable reference {:?}", subject, reference)
        }
    }
}
