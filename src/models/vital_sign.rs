use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::VitalType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSign {
    pub id: Uuid,
    pub vital_type: VitalType,
    pub value: f64,
    /// Diastolic pressure for blood pressure readings; unused otherwise.
    pub secondary_value: Option<f64>,
    pub unit: String,
    pub measured_at: NaiveDateTime,
}
