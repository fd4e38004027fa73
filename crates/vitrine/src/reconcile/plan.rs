//! Turn a [`Report`] into ordered repair actions.
//!
//! Actions come out grouped by type in execution order:
//! copies, inserts, updates, deletes, removals. Record updates are merged per
//! record. A file is removed only when no surviving record still refers to it,
//! and only after every copy reading from it has been verified.

use super::{Finding, FindingKind, Report, RepairPolicy, Snapshot};
use crate::model::{ImageRecord, NewImage, Owner, RecordId};
use crate::paths::{self, StoredReference};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RepairAction {
    CopyFile {
        from: String,
        to: String,
    },
    InsertRecord {
        image: NewImage,
        requires: Vec<String>,
    },
    UpdateRecord {
        record: ImageRecord,
        requires: Vec<String>,
    },
    DeleteRecord {
        id: RecordId,
    },
    RemoveFile {
        path: String,
        requires: Vec<String>,
    },
}

impl RepairAction {
    /// Files that must exist and be non-empty before this action may run.
    pub fn requires(&self) -> &[String] {
        match self {
            RepairAction::InsertRecord { requires, .. }
            | RepairAction::UpdateRecord { requires, .. }
            | RepairAction::RemoveFile { requires, .. } => requires,
            RepairAction::CopyFile { .. } | RepairAction::DeleteRecord { .. } => &[],
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::CopyFile { from, to } => write!(f, "copy {} -> {}", from, to),
            RepairAction::InsertRecord { image, .. } => write!(
                f,
                "register {} for {}{}",
                image.filename,
                image.owner,
                if image.is_primary { " (primary)" } else { "" }
            ),
            RepairAction::UpdateRecord { record, .. } => write!(
                f,
                "update {} of {}: filename={} primary={}",
                record.id, record.owner, record.filename, record.is_primary
            ),
            RepairAction::DeleteRecord { id } => write!(f, "delete record {}", id),
            RepairAction::RemoveFile { path, .. } => write!(f, "remove {}", path),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairPlan {
    pub actions: Vec<RepairAction>,
    /// Findings deliberately left alone under the current policy.
    pub needs_attention: Vec<Finding>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Pure: no store or file access.
pub fn plan(report: &Report, snapshot: &Snapshot, policy: &RepairPolicy) -> RepairPlan {
    let mut planner = Planner::new(snapshot, policy);

    // Deletions first so later findings skip records that are going away.
    for finding in &report.findings {
        if let FindingKind::DuplicatePrimary { demote, .. } = &finding.kind {
            for id in demote {
                planner.demote(*id);
            }
        }
    }

    let mut orphan_files: BTreeMap<Owner, Vec<(&str, &str, bool)>> = BTreeMap::new();
    for finding in &report.findings {
        match &finding.kind {
            FindingKind::DuplicatePrimary { .. } => {}
            FindingKind::OrphanFile {
                path,
                filename,
                thumbnail,
            } => orphan_files
                .entry(finding.owner)
                .or_default()
                .push((path, filename, *thumbnail)),
            _ => planner.repair_record(finding),
        }
    }

    for (owner, files) in orphan_files {
        planner.register(owner, &files);
    }

    planner.finish()
}

struct Planner<'a> {
    snapshot: &'a Snapshot,
    policy: &'a RepairPolicy,
    edits: BTreeMap<RecordId, ImageRecord>,
    requires: BTreeMap<RecordId, BTreeSet<String>>,
    deleted: BTreeSet<RecordId>,
    /// destination → source
    copies: BTreeMap<String, String>,
    /// source → destinations
    readers: BTreeMap<String, BTreeSet<String>>,
    /// Files of deleted records.
    purge: BTreeSet<String>,
    inserts: Vec<RepairAction>,
    needs_attention: Vec<Finding>,
}

impl<'a> Planner<'a> {
    fn new(snapshot: &'a Snapshot, policy: &'a RepairPolicy) -> Self {
        Self {
            snapshot,
            policy,
            edits: BTreeMap::new(),
            requires: BTreeMap::new(),
            deleted: BTreeSet::new(),
            copies: BTreeMap::new(),
            readers: BTreeMap::new(),
            purge: BTreeSet::new(),
            inserts: Vec::new(),
            needs_attention: Vec::new(),
        }
    }

    /// Working copy of a surviving record.
    fn edit(&mut self, id: RecordId) -> Option<&mut ImageRecord> {
        if self.deleted.contains(&id) {
            return None;
        }
        let snapshot = self.snapshot;
        let original = snapshot.record(id)?;
        Some(self.edits.entry(id).or_insert_with(|| original.clone()))
    }

    fn demote(&mut self, id: RecordId) {
        if !self.policy.dedupe {
            if let Some(record) = self.edit(id) {
                record.is_primary = false;
            }
            return;
        }

        let Some(record) = self.snapshot.record(id) else {
            return;
        };
        self.deleted.insert(id);
        self.edits.remove(&id);
        for name in claimed_names(record) {
            let candidates = [
                paths::build_path(&record.owner, &name),
                paths::build_thumbnail_path(&record.owner, &name),
            ];
            for path in candidates.into_iter().flatten() {
                if self.snapshot.files.contains_key(&path) {
                    self.purge.insert(path);
                }
            }
        }
    }

    fn placeholder(&mut self, id: RecordId) {
        let filename = self.policy.placeholder_filename.clone();
        if let Some(record) = self.edit(id) {
            record.filename = filename;
            record.thumbnail_filename = None;
        }
    }

    /// Point `id` at the bare `name` and copy `from` into its canonical place.
    fn relocate(&mut self, id: RecordId, owner: &Owner, name: &str, from: Option<&str>) {
        if self.deleted.contains(&id) {
            // Dedupe: the record's only copy goes with it.
            if let Some(from) = from {
                self.purge.insert(from.to_string());
            }
            return;
        }
        let Ok(canonical) = paths::build_path(owner, name) else {
            return;
        };

        if let Some(from) = from {
            self.copies
                .entry(canonical.clone())
                .or_insert_with(|| from.to_string());
            self.readers
                .entry(from.to_string())
                .or_default()
                .insert(canonical.clone());
            self.requires.entry(id).or_default().insert(canonical);
        }
        if let Some(record) = self.edit(id) {
            record.filename = name.to_string();
        }
    }

    fn repair_record(&mut self, finding: &Finding) {
        let Some(id) = finding.record else {
            return;
        };
        let Some(name) = self.snapshot.record(id).and_then(|r| r.base_name()) else {
            if matches!(finding.kind, FindingKind::BrokenReference { .. }) {
                self.placeholder(id);
            }
            return;
        };

        match &finding.kind {
            FindingKind::BrokenReference { .. } => self.placeholder(id),
            FindingKind::MismatchedPath { source, .. } => {
                self.relocate(id, &finding.owner, &name, source.as_deref())
            }
            FindingKind::OrphanRecord {
                fallback: Some(location),
            } => self.relocate(id, &finding.owner, &name, Some(&location.path)),
            FindingKind::OrphanRecord { fallback: None } => {
                if self.deleted.contains(&id) {
                    return;
                }
                if self.policy.placeholder_unrecoverable {
                    self.placeholder(id);
                } else {
                    self.needs_attention.push(finding.clone());
                }
            }
            FindingKind::OrphanFile { .. } | FindingKind::DuplicatePrimary { .. } => {}
        }
    }

    /// New records for unreferenced files, sorted by name. The first becomes
    /// primary when the owner has no records at all.
    fn register(&mut self, owner: Owner, files: &[(&str, &str, bool)]) {
        let survivors: Vec<&ImageRecord> = self
            .snapshot
            .records_of(&owner)
            .filter(|r| !self.deleted.contains(&r.id))
            .collect();
        let make_primary = survivors.is_empty();
        let mut order = survivors
            .iter()
            .map(|r| r.display_order)
            .max()
            .map_or(0, |max| max.saturating_add(1));

        let mut files = files.to_vec();
        files.sort_by(|a, b| a.1.cmp(b.1));
        for (index, (path, filename, thumbnail)) in files.into_iter().enumerate() {
            let mut image = NewImage::new(owner, filename).with_display_order(order);
            image.is_primary = make_primary && index == 0;
            if thumbnail {
                image = image.with_thumbnail(filename);
            }
            self.inserts.push(RepairAction::InsertRecord {
                image,
                requires: vec![path.to_string()],
            });
            order = order.saturating_add(1);
        }
    }

    fn still_referenced(&self, path: &str, survivors: &[ImageRecord]) -> bool {
        match paths::parse_canonical(path) {
            Some(canonical) => survivors.iter().any(|r| {
                r.owner == canonical.owner && claimed_names(r).contains(&canonical.filename)
            }),
            None => false,
        }
    }

    fn finish(self) -> RepairPlan {
        let survivors: Vec<ImageRecord> = self
            .snapshot
            .records
            .iter()
            .filter(|r| !self.deleted.contains(&r.id))
            .map(|r| self.edits.get(&r.id).unwrap_or(r).clone())
            .collect();

        let mut actions: Vec<RepairAction> = self
            .copies
            .iter()
            .map(|(to, from)| RepairAction::CopyFile {
                from: from.clone(),
                to: to.clone(),
            })
            .collect();

        actions.extend(self.inserts.iter().cloned());

        for (id, edited) in &self.edits {
            if self.snapshot.record(*id) == Some(edited) {
                continue;
            }
            let requires = self
                .requires
                .get(id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            actions.push(RepairAction::UpdateRecord {
                record: edited.clone(),
                requires,
            });
        }

        actions.extend(
            self.deleted
                .iter()
                .map(|id| RepairAction::DeleteRecord { id: *id }),
        );

        let candidates: BTreeSet<&String> = self.readers.keys().chain(self.purge.iter()).collect();
        for path in candidates {
            if self.still_referenced(path, &survivors) {
                continue;
            }
            let requires = self
                .readers
                .get(path)
                .map(|dests| dests.iter().cloned().collect())
                .unwrap_or_default();
            actions.push(RepairAction::RemoveFile {
                path: path.clone(),
                requires,
            });
        }

        RepairPlan {
            actions,
            needs_attention: self.needs_attention,
        }
    }
}

/// Base names a record points at: its image and its thumbnail.
fn claimed_names(record: &ImageRecord) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if let Some(name) = record.base_name() {
        names.insert(name);
    }
    if let Some(thumb) = record
        .thumbnail_filename
        .as_deref()
        .map(StoredReference::parse)
        .as_ref()
        .and_then(StoredReference::base_name)
    {
        names.insert(thumb.to_string());
    }
    names
}
