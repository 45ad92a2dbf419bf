//! Record Selector: pure category + date-range filtering.
//!
//! Given a full `HealthRecord`, a category set, and an optional inclusive
//! date range, produces a new record containing only the requested
//! categories with entries whose timestamp falls inside the range.
//! Entries without a timestamp (the profile) are always kept. No I/O,
//! never fails; an empty category set yields an empty record.

use crate::models::{Category, DateRange, HealthRecord};

/// Filter `record` down to `categories`, each restricted to `range` when
/// one is given. The source record is never mutated.
pub fn select_records(
    record: &HealthRecord,
    categories: &[Category],
    range: Option<DateRange>,
) -> HealthRecord {
    let wanted = |category: Category| categories.contains(&category);
    let in_range = |date: chrono::NaiveDate| range.map_or(true, |r| r.contains(date));

    HealthRecord {
        profile: if wanted(Category::Profile) {
            record.profile.clone()
        } else {
            None
        },
        labs: filter(&record.labs, wanted(Category::Labs), |e| {
            in_range(e.collection_date)
        }),
        medications: filter(&record.medications, wanted(Category::Medications), |e| {
            in_range(e.start_date)
        }),
        conditions: filter(&record.conditions, wanted(Category::Conditions), |e| {
            in_range(e.onset_date)
        }),
        procedures: filter(&record.procedures, wanted(Category::Procedures), |e| {
            in_range(e.date)
        }),
        allergies: filter(&record.allergies, wanted(Category::Allergies), |e| {
            in_range(e.recorded_date)
        }),
        immunizations: filter(&record.immunizations, wanted(Category::Immunizations), |e| {
            in_range(e.date)
        }),
        vitals: filter(&record.vitals, wanted(Category::Vitals), |e| {
            in_range(e.measured_at.date())
        }),
        imaging: filter(&record.imaging, wanted(Category::Imaging), |e| {
            in_range(e.date)
        }),
        timeline: filter(&record.timeline, wanted(Category::Timeline), |e| {
            in_range(e.date)
        }),
        notes: filter(&record.notes, wanted(Category::Notes), |e| {
            in_range(e.created_at.date())
        }),
    }
}

fn filter<T: Clone>(entries: &[T], wanted: bool, keep: impl Fn(&T) -> bool) -> Vec<T> {
    if !wanted {
        return Vec::new();
    }
    entries.iter().filter(|e| keep(e)).cloned().collect()
}
