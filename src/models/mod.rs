//! Domain model: the categorized personal health record.
//!
//! A `HealthRecord` is the complete set of a person's categorized data:
//! one optional profile plus an ordered collection per category. Entries
//! within a category are unique by id. The record is immutable input to
//! export; the engine never mutates the source.

pub mod allergy;
pub mod condition;
pub mod enums;
pub mod imaging;
pub mod immunization;
pub mod lab;
pub mod medication;
pub mod note;
pub mod procedure;
pub mod profile;
pub mod timeline_event;
pub mod vital_sign;

pub use allergy::*;
pub use condition::*;
pub use enums::*;
pub use imaging::*;
pub use immunization::*;
pub use lab::*;
pub use medication::*;
pub use note::*;
pub use procedure::*;
pub use profile::*;
pub use timeline_event::*;
pub use vital_sign::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid {field} value: '{value}'")]
    InvalidEnum { field: String, value: String },
}

/// Inclusive date range. `start <= end` is enforced at option validation,
/// not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// The complete categorized health record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub profile: Option<PatientProfile>,
    pub labs: Vec<LabResult>,
    pub medications: Vec<Medication>,
    pub conditions: Vec<Condition>,
    pub procedures: Vec<Procedure>,
    pub allergies: Vec<Allergy>,
    pub immunizations: Vec<Immunization>,
    pub vitals: Vec<VitalSign>,
    pub imaging: Vec<ImagingStudy>,
    pub timeline: Vec<TimelineEvent>,
    pub notes: Vec<Note>,
}

impl HealthRecord {
    /// Entry count for one category. Profile counts as 0 or 1.
    pub fn category_count(&self, category: Category) -> usize {
        match category {
            Category::Profile => usize::from(self.profile.is_some()),
            Category::Labs => self.labs.len(),
            Category::Medications => self.medications.len(),
            Category::Conditions => self.conditions.len(),
            Category::Procedures => self.procedures.len(),
            Category::Allergies => self.allergies.len(),
            Category::Immunizations => self.immunizations.len(),
            Category::Vitals => self.vitals.len(),
            Category::Imaging => self.imaging.len(),
            Category::Timeline => self.timeline.len(),
            Category::Notes => self.notes.len(),
        }
    }

    /// Total entry count across every category.
    pub fn total_entries(&self) -> usize {
        Category::ALL.iter().map(|c| self.category_count(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_has_zero_entries() {
        let record = HealthRecord::default();
        assert_eq!(record.total_entries(), 0);
        assert!(record.is_empty());
    }

    #[test]
    fn profile_counts_as_one_entry() {
        let record = HealthRecord {
            profile: Some(PatientProfile::named("Marie Dubois")),
            ..Default::default()
        };
        assert_eq!(record.category_count(Category::Profile), 1);
        assert_eq!(record.total_entries(), 1);
    }

    #[test]
    fn date_range_is_inclusive() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        assert!(range.contains(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
    }
}
