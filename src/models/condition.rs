use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ConditionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub name: String,
    /// Coding-system code (ICD-10 or similar) when known.
    pub code: Option<String>,
    pub status: ConditionStatus,
    pub onset_date: NaiveDate,
    pub resolved_date: Option<NaiveDate>,
    pub notes: Option<String>,
}
