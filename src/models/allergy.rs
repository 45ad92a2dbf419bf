use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AllergySeverity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allergy {
    pub id: Uuid,
    pub allergen: String,
    pub reaction: Option<String>,
    pub severity: AllergySeverity,
    pub recorded_date: NaiveDate,
}
