//! Merge/replace reconciliation against an external record store.
//!
//! The store is a collaborator, not something this crate owns; single-writer
//! access for the duration of an import is the caller's responsibility.
//! Commits are atomic per category: a cancelled import keeps every category
//! already committed and discards the one in flight.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Category, HealthRecord};
use crate::progress::CancelToken;

use super::{CategoryCounts, ImportError, ReconcileMode};

#[derive(Error, Debug)]
#[error("Record store error: {0}")]
pub struct StoreError(pub String);

/// External destination of an import. `snapshot` is read once before
/// reconciliation starts; `commit_category` replaces one category's state
/// atomically.
pub trait RecordStore {
    fn snapshot(&self) -> Result<HealthRecord, StoreError>;
    fn commit_category(&mut self, category: Category, staged: &HealthRecord)
        -> Result<(), StoreError>;
}

/// In-memory store; the reference reconciliation target in tests and a
/// usable default for callers without persistence.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    record: HealthRecord,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: HealthRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &HealthRecord {
        &self.record
    }
}

impl RecordStore for MemoryStore {
    fn snapshot(&self) -> Result<HealthRecord, StoreError> {
        Ok(self.record.clone())
    }

    fn commit_category(
        &mut self,
        category: Category,
        staged: &HealthRecord,
    ) -> Result<(), StoreError> {
        match category {
            Category::Profile => self.record.profile = staged.profile.clone(),
            Category::Labs => self.record.labs = staged.labs.clone(),
            Category::Medications => self.record.medications = staged.medications.clone(),
            Category::Conditions => self.record.conditions = staged.conditions.clone(),
            Category::Procedures => self.record.procedures = staged.procedures.clone(),
            Category::Allergies => self.record.allergies = staged.allergies.clone(),
            Category::Immunizations => self.record.immunizations = staged.immunizations.clone(),
            Category::Vitals => self.record.vitals = staged.vitals.clone(),
            Category::Imaging => self.record.imaging = staged.imaging.clone(),
            Category::Timeline => self.record.timeline = staged.timeline.clone(),
            Category::Notes => self.record.notes = staged.notes.clone(),
        }
        Ok(())
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::Merge => write!(f, "merge"),
            ReconcileMode::Replace => write!(f, "replace"),
        }
    }
}

/// Reconcile validated input into the store, one category at a time.
/// Returns per-category imported/skipped counts; `present` limits which
/// categories a replace clears.
pub fn reconcile(
    store: &mut dyn RecordStore,
    incoming: &HealthRecord,
    present: &[Category],
    mode: ReconcileMode,
    cancel: &CancelToken,
    mut on_category: impl FnMut(usize),
) -> Result<Vec<(Category, CategoryCounts)>, ImportError> {
    let existing = store.snapshot()?;
    let mut counts = Vec::new();
    let mut processed = 0;

    for category in Category::ALL {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        if !present.contains(&category) {
            continue;
        }

        let mut staged = existing.clone();
        let category_counts = stage_category(&mut staged, incoming, category, mode);
        store.commit_category(category, &staged)?;

        processed += incoming.category_count(category);
        on_category(processed);
        counts.push((category, category_counts));
    }

    Ok(counts)
}

fn stage_category(
    staged: &mut HealthRecord,
    incoming: &HealthRecord,
    category: Category,
    mode: ReconcileMode,
) -> CategoryCounts {
    let mut counts = CategoryCounts::default();

    if category == Category::Profile {
        match (mode, &staged.profile, &incoming.profile) {
            (_, _, None) => {}
            (ReconcileMode::Merge, Some(_), Some(_)) => counts.skipped += 1,
            (_, _, Some(profile)) => {
                staged.profile = Some(profile.clone());
                counts.imported += 1;
            }
        }
        return counts;
    }

    match category {
        Category::Labs => stage_entries(&mut staged.labs, &incoming.labs, |e| e.id, mode, &mut counts),
        Category::Medications => {
            stage_entries(&mut staged.medications, &incoming.medications, |e| e.id, mode, &mut counts)
        }
        Category::Conditions => {
            stage_entries(&mut staged.conditions, &incoming.conditions, |e| e.id, mode, &mut counts)
        }
        Category::Procedures => {
            stage_entries(&mut staged.procedures, &incoming.procedures, |e| e.id, mode, &mut counts)
        }
        Category::Allergies => {
            stage_entries(&mut staged.allergies, &incoming.allergies, |e| e.id, mode, &mut counts)
        }
        Category::Immunizations => stage_entries(
            &mut staged.immunizations,
            &incoming.immunizations,
            |e| e.id,
            mode,
            &mut counts,
        ),
        Category::Vitals => stage_entries(&mut staged.vitals, &incoming.vitals, |e| e.id, mode, &mut counts),
        Category::Imaging => {
            stage_entries(&mut staged.imaging, &incoming.imaging, |e| e.id, mode, &mut counts)
        }
        Category::Timeline => {
            stage_entries(&mut staged.timeline, &incoming.timeline, |e| e.id, mode, &mut counts)
        }
        Category::Notes => stage_entries(&mut staged.notes, &incoming.notes, |e| e.id, mode, &mut counts),
        Category::Profile => {}
    }

    counts
}

/// Merge: identifier collisions are skipped, new ids appended.
/// Replace: the category starts empty and every incoming entry lands.
fn stage_entries<T: Clone>(
    staged: &mut Vec<T>,
    incoming: &[T],
    id_of: impl Fn(&T) -> Uuid,
    mode: ReconcileMode,
    counts: &mut CategoryCounts,
) {
    match mode {
        ReconcileMode::Replace => {
            staged.clear();
            staged.extend_from_slice(incoming);
            counts.imported += incoming.len();
        }
        ReconcileMode::Merge => {
            let existing: std::collections::HashSet<Uuid> = staged.iter().map(&id_of).collect();
            for entry in incoming {
                if existing.contains(&id_of(entry)) {
                    counts.skipped += 1;
                } else {
                    staged.push(entry.clone());
                    counts.imported += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::NaiveDate;

    fn condition_named(name: &str) -> Condition {
        Condition {
            id: Uuid::new_v4(),
            name: name.into(),
            code: None,
            status: ConditionStatus::Active,
            onset_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            resolved_date: None,
            notes: None,
        }
    }

    fn run(
        store: &mut MemoryStore,
        incoming: &HealthRecord,
        mode: ReconcileMode,
    ) -> Vec<(Category, CategoryCounts)> {
        reconcile(
            store,
            incoming,
            &Category::ALL,
            mode,
            &CancelToken::new(),
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn merge_skips_existing_ids() {
        let shared = condition_named("Hypertension");
        let fresh = condition_named("Asthma");
        let mut store = MemoryStore::with_record(HealthRecord {
            conditions: vec![shared.clone()],
            ..Default::default()
        });
        let incoming = HealthRecord {
            conditions: vec![shared, fresh.clone()],
            ..Default::default()
        };

        let counts = run(&mut store, &incoming, ReconcileMode::Merge);
        let (_, c) = counts
            .iter()
            .find(|(cat, _)| *cat == Category::Conditions)
            .unwrap();
        assert_eq!(c.imported, 1);
        assert_eq!(c.skipped, 1);
        assert_eq!(store.record().conditions.len(), 2);
        assert!(store.record().conditions.contains(&fresh));
    }

    #[test]
    fn merge_twice_imports_nothing_new() {
        let incoming = HealthRecord {
            conditions: vec![condition_named("Hypertension"), condition_named("Asthma")],
            ..Default::default()
        };
        let mut store = MemoryStore::new();
        run(&mut store, &incoming, ReconcileMode::Merge);
        let counts = run(&mut store, &incoming, ReconcileMode::Merge);
        let (_, c) = counts
            .iter()
            .find(|(cat, _)| *cat == Category::Conditions)
            .unwrap();
        assert_eq!(c.imported, 0);
        assert_eq!(c.skipped, 2);
    }

    #[test]
    fn replace_clears_then_inserts() {
        let mut store = MemoryStore::with_record(HealthRecord {
            conditions: vec![condition_named("Old")],
            ..Default::default()
        });
        let incoming = HealthRecord {
            conditions: vec![condition_named("New")],
            ..Default::default()
        };
        run(&mut store, &incoming, ReconcileMode::Replace);
        assert_eq!(store.record().conditions.len(), 1);
        assert_eq!(store.record().conditions[0].name, "New");
    }

    #[test]
    fn replace_is_deterministic() {
        let incoming = HealthRecord {
            conditions: vec![condition_named("Hypertension")],
            labs: Vec::new(),
            ..Default::default()
        };
        let mut store = MemoryStore::with_record(HealthRecord {
            conditions: vec![condition_named("Pre-existing")],
            ..Default::default()
        });
        run(&mut store, &incoming, ReconcileMode::Replace);
        let first = store.record().clone();
        run(&mut store, &incoming, ReconcileMode::Replace);
        assert_eq!(store.record(), &first);
    }

    #[test]
    fn replace_only_touches_present_categories() {
        let untouched = condition_named("Keep me");
        let mut store = MemoryStore::with_record(HealthRecord {
            conditions: vec![untouched.clone()],
            ..Default::default()
        });
        let incoming = HealthRecord {
            notes: vec![Note {
                id: Uuid::new_v4(),
                title: "Visit".into(),
                body: "ok".into(),
                created_at: NaiveDate::from_ymd_opt(2026, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            }],
            ..Default::default()
        };

        reconcile(
            &mut store,
            &incoming,
            &[Category::Notes],
            ReconcileMode::Replace,
            &CancelToken::new(),
            |_| {},
        )
        .unwrap();
        assert_eq!(store.record().conditions, vec![untouched]);
        assert_eq!(store.record().notes.len(), 1);
    }

    #[test]
    fn merge_profile_keeps_existing() {
        let mut store = MemoryStore::with_record(HealthRecord {
            profile: Some(PatientProfile::named("Existing")),
            ..Default::default()
        });
        let incoming = HealthRecord {
            profile: Some(PatientProfile::named("Incoming")),
            ..Default::default()
        };
        let counts = run(&mut store, &incoming, ReconcileMode::Merge);
        let (_, c) = counts
            .iter()
            .find(|(cat, _)| *cat == Category::Profile)
            .unwrap();
        assert_eq!(c.skipped, 1);
        assert_eq!(store.record().profile.as_ref().unwrap().full_name, "Existing");
    }

    #[test]
    fn cancellation_keeps_committed_categories() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let before = HealthRecord {
            conditions: vec![condition_named("Untouched")],
            ..Default::default()
        };
        let mut store = MemoryStore::with_record(before.clone());
        let incoming = HealthRecord {
            conditions: vec![condition_named("Never lands")],
            ..Default::default()
        };

        let result = reconcile(
            &mut store,
            &incoming,
            &Category::ALL,
            ReconcileMode::Merge,
            &cancel,
            |_| {},
        );
        assert!(matches!(result, Err(ImportError::Cancelled)));
        assert_eq!(store.record(), &before);
    }
}
