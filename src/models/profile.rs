use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Patient demographics. At most one per record; carries no timestamp,
/// so date-range selection always keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub blood_type: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub primary_language: Option<String>,
}

impl PatientProfile {
    pub fn named(full_name: &str) -> Self {
        Self {
            full_name: full_name.into(),
            date_of_birth: None,
            sex: None,
            blood_type: None,
            height_cm: None,
            weight_kg: None,
            primary_language: None,
        }
    }
}
