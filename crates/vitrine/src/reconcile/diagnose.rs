//! Classify divergences between records and files.

use super::{Finding, FindingKind, Report, RepairPolicy, Snapshot};
use crate::model::{ImageRecord, Owner};
use crate::paths::{self, StoredReference};
use crate::resolver::{locate_with, FallbackStep, Location};
use std::collections::{BTreeMap, BTreeSet};

/// Pure: the same snapshot always yields the same report, in record-id order
/// followed by owner-wide and file findings.
pub fn diagnose(snapshot: &Snapshot, policy: &RepairPolicy) -> Report {
    let mut findings = Vec::new();
    // Files some record will be repaired from; they are not orphans.
    let mut sources = BTreeSet::new();

    for record in &snapshot.records {
        if let Some(kind) = diagnose_record(record, snapshot, policy) {
            match &kind {
                FindingKind::OrphanRecord {
                    fallback: Some(location),
                } => {
                    sources.insert(location.path.clone());
                }
                FindingKind::MismatchedPath {
                    source: Some(source),
                    ..
                } => {
                    sources.insert(source.clone());
                }
                _ => {}
            }
            findings.push(Finding {
                owner: record.owner,
                record: Some(record.id),
                kind,
            });
        }
    }

    findings.extend(duplicate_primaries(snapshot));
    findings.extend(orphan_files(snapshot, &sources));

    Report {
        findings,
        records_scanned: snapshot.records.len(),
        files_scanned: snapshot.files.len(),
    }
}

fn diagnose_record(
    record: &ImageRecord,
    snapshot: &Snapshot,
    policy: &RepairPolicy,
) -> Option<FindingKind> {
    let reference = record.reference();
    if reference.is_placeholder(&policy.placeholder_filename) {
        return None;
    }
    let Some(name) = reference.base_name() else {
        return Some(FindingKind::BrokenReference {
            reference: record.filename.clone(),
        });
    };
    let canonical = match paths::build_path(&record.owner, name) {
        Ok(path) => path,
        Err(_) => {
            return Some(FindingKind::BrokenReference {
                reference: record.filename.clone(),
            })
        }
    };
    let canonical_present = snapshot.has_file(&canonical);

    if let (Some(encoded_owner), StoredReference::Path {
        relative: Some(recorded),
        ..
    }) = (reference.encoded_owner(), &reference)
    {
        if encoded_owner != record.owner {
            if canonical_present {
                return Some(FindingKind::MismatchedPath {
                    encoded_owner,
                    source: None,
                });
            }
            if snapshot.has_file(recorded) {
                return Some(FindingKind::MismatchedPath {
                    encoded_owner,
                    source: Some(recorded.clone()),
                });
            }
        }
    }

    if canonical_present {
        return None;
    }

    let recorded = match &reference {
        StoredReference::Path {
            relative: Some(recorded),
            ..
        } if recorded != &canonical
            && snapshot.has_file(recorded)
            && !matches!(reference.encoded_owner(), Some(o) if o != record.owner) =>
        {
            Some(Location {
                step: FallbackStep::RecordedPath,
                path: recorded.clone(),
            })
        }
        _ => None,
    };
    let fallback = recorded.or_else(|| {
        locate_with(&record.owner, name, |candidate| snapshot.has_file(candidate))
            .filter(|location| location.step != FallbackStep::Canonical)
    });

    Some(FindingKind::OrphanRecord { fallback })
}

/// Winner: latest `created_at`, ties broken by the greatest id.
fn duplicate_primaries(snapshot: &Snapshot) -> Vec<Finding> {
    let mut primaries: BTreeMap<Owner, Vec<&ImageRecord>> = BTreeMap::new();
    for record in snapshot.records.iter().filter(|r| r.is_primary) {
        primaries.entry(record.owner).or_default().push(record);
    }

    primaries
        .into_iter()
        .filter(|(_, records)| records.len() > 1)
        .filter_map(|(owner, mut records)| {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            let (keep, demote) = records.split_first()?;
            Some(Finding {
                owner,
                record: None,
                kind: FindingKind::DuplicatePrimary {
                    keep: keep.id,
                    demote: demote.iter().map(|r| r.id).collect(),
                },
            })
        })
        .collect()
}

fn orphan_files(snapshot: &Snapshot, sources: &BTreeSet<String>) -> Vec<Finding> {
    let mut claimed: BTreeSet<(Owner, String)> = BTreeSet::new();
    for record in &snapshot.records {
        if let Some(name) = record.base_name() {
            claimed.insert((record.owner, name));
        }
    }

    snapshot
        .files
        .keys()
        .filter(|path| snapshot.has_file(path) && !sources.contains(*path))
        .filter_map(|path| {
            let canonical = paths::parse_canonical(path)?;
            if canonical.thumbnail || claimed.contains(&(canonical.owner, canonical.filename.clone()))
            {
                return None;
            }
            let thumbnail = paths::build_thumbnail_path(&canonical.owner, &canonical.filename)
                .map(|thumb| snapshot.has_file(&thumb))
                .unwrap_or(false);
            Some(Finding {
                owner: canonical.owner,
                record: None,
                kind: FindingKind::OrphanFile {
                    path: path.clone(),
                    filename: canonical.filename,
                    thumbnail,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewImage, OwnerKind, RecordId};
    use chrono::{Duration, Utc};

    fn record(seq: u64, owner: Owner, filename: &str, primary: bool) -> ImageRecord {
        let mut image = NewImage::new(owner, filename);
        image.is_primary = primary;
        image.into_record(RecordId::new(owner.kind(), seq))
    }

    fn snapshot(records: Vec<ImageRecord>, files: &[&str]) -> Snapshot {
        Snapshot {
            records,
            files: files.iter().map(|f| (f.to_string(), 10)).collect(),
        }
    }

    fn kinds(report: &Report) -> Vec<&'static str> {
        report.findings.iter().map(|f| f.kind.label()).collect()
    }

    #[test]
    fn consistent_state_is_clean() {
        let snap = snapshot(
            vec![
                record(1, Owner::store(1), "a.jpg", true),
                record(1, Owner::product(1, 2), "b.jpg", true),
            ],
            &["stores/1/a.jpg", "stores/1/products/2/b.jpg", "stores/1/thumbnails/a.jpg"],
        );
        assert!(diagnose(&snap, &RepairPolicy::default()).is_clean());
    }

    #[test]
    fn orphan_record_reports_fallback() {
        let snap = snapshot(
            vec![record(1, Owner::product(3, 21), "x.jpg", true)],
            &["originals/x.jpg", "thumbnails/x.jpg"],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(
            report.findings[0].kind,
            FindingKind::OrphanRecord {
                fallback: Some(Location {
                    step: FallbackStep::Originals,
                    path: "originals/x.jpg".into()
                })
            }
        );
    }

    #[test]
    fn orphan_record_without_fallback() {
        let snap = snapshot(vec![record(1, Owner::store(4), "a.jpg", true)], &[]);
        let report = diagnose(&snap, &RepairPolicy::default());
        assert!(report.findings[0].is_unrecoverable());
    }

    #[test]
    fn empty_files_do_not_count() {
        let mut snap = snapshot(vec![record(1, Owner::store(4), "a.jpg", true)], &[]);
        snap.files.insert("stores/4/a.jpg".into(), 0);
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(kinds(&report), vec!["orphan-record"]);
    }

    #[test]
    fn recorded_legacy_path_is_preferred_fallback() {
        let snap = snapshot(
            vec![record(1, Owner::store(2), "https://cdn.test/uploads/legacy/a.jpg", true)],
            &["legacy/a.jpg", "a.jpg"],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(
            report.findings[0].kind,
            FindingKind::OrphanRecord {
                fallback: Some(Location {
                    step: FallbackStep::RecordedPath,
                    path: "legacy/a.jpg".into()
                })
            }
        );
    }

    #[test]
    fn mismatched_path_uses_physical_file() {
        let snap = snapshot(
            vec![record(
                1,
                Owner::product(3, 22),
                "/uploads/stores/3/products/21/x.jpg",
                true,
            )],
            &["stores/3/products/21/x.jpg"],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(report.findings.len(), 1, "source must not be an orphan file");
        assert_eq!(
            report.findings[0].kind,
            FindingKind::MismatchedPath {
                encoded_owner: Owner::product(3, 21),
                source: Some("stores/3/products/21/x.jpg".into())
            }
        );
    }

    #[test]
    fn mismatched_path_with_canonical_copy_present() {
        let snap = snapshot(
            vec![record(1, Owner::store(2), "/uploads/stores/9/x.jpg", true)],
            &["stores/2/x.jpg"],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(
            report.findings[0].kind,
            FindingKind::MismatchedPath {
                encoded_owner: Owner::store(9),
                source: None
            }
        );
    }

    #[test]
    fn mismatched_path_with_no_file_is_an_orphan_record() {
        let snap = snapshot(
            vec![record(1, Owner::store(2), "/uploads/stores/9/x.jpg", true)],
            &[],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(kinds(&report), vec!["orphan-record"]);
    }

    #[test]
    fn broken_references() {
        let snap = snapshot(
            vec![
                record(1, Owner::store(1), "blob:http://host/abc", true),
                record(2, Owner::store(1), "", false),
                record(3, Owner::store(1), "data:image/png;base64,AA", false),
                record(4, Owner::store(1), "placeholder.png", false),
            ],
            &[],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(
            kinds(&report),
            vec!["broken-reference", "broken-reference", "broken-reference"]
        );
    }

    #[test]
    fn duplicate_primaries_keep_latest_created() {
        let now = Utc::now();
        let mut a = record(1, Owner::store(3), "a.jpg", true);
        a.created_at = now - Duration::hours(2);
        let mut b = record(2, Owner::store(3), "b.jpg", true);
        b.created_at = now;
        let mut c = record(3, Owner::store(3), "c.jpg", true);
        c.created_at = now - Duration::hours(1);
        let snap = snapshot(vec![a, b, c], &["stores/3/a.jpg", "stores/3/b.jpg", "stores/3/c.jpg"]);

        let report = diagnose(&snap, &RepairPolicy::default());
        let id = |seq| RecordId::new(OwnerKind::Store, seq);
        assert_eq!(
            report.findings[0].kind,
            FindingKind::DuplicatePrimary {
                keep: id(2),
                demote: vec![id(3), id(1)]
            }
        );
    }

    #[test]
    fn duplicate_tie_breaks_on_id() {
        let now = Utc::now();
        let mut a = record(1, Owner::store(3), "a.jpg", true);
        a.created_at = now;
        let mut b = record(2, Owner::store(3), "b.jpg", true);
        b.created_at = now;
        let snap = snapshot(vec![a, b], &["stores/3/a.jpg", "stores/3/b.jpg"]);
        let report = diagnose(&snap, &RepairPolicy::default());
        match &report.findings[0].kind {
            FindingKind::DuplicatePrimary { keep, .. } => assert_eq!(keep.seq, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn orphan_files_in_canonical_directories() {
        let snap = snapshot(
            vec![record(1, Owner::product(4, 12), "z.jpg", true)],
            &[
                "stores/4/products/12/z.jpg",
                "stores/4/products/11/y.jpg",
                "stores/4/products/11/thumbnails/y.jpg",
                "stores/4/thumbnails/lonely.jpg",
                "random/legacy.jpg",
            ],
        );
        let report = diagnose(&snap, &RepairPolicy::default());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].owner, Owner::product(4, 11));
        assert_eq!(
            report.findings[0].kind,
            FindingKind::OrphanFile {
                path: "stores/4/products/11/y.jpg".into(),
                filename: "y.jpg".into(),
                thumbnail: true
            }
        );
    }

    #[test]
    fn legacy_url_records_claim_their_file() {
        let snap = snapshot(
            vec![record(1, Owner::store(4), "http://shop.test/uploads/stores/4/a.jpg", true)],
            &["stores/4/a.jpg"],
        );
        assert!(diagnose(&snap, &RepairPolicy::default()).is_clean());
    }
}
