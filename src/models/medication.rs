use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MedicationStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub generic_name: String,
    pub brand_name: Option<String>,
    pub dose: String,
    pub frequency: String,
    pub route: String,
    pub status: MedicationStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_otc: bool,
    /// Condition this medication treats, by entry id. Exported as an
    /// explicit cross-reference in the interoperability bundle.
    pub condition_id: Option<Uuid>,
    pub instructions: Option<String>,
}
