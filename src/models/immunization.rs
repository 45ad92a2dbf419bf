use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Immunization {
    pub id: Uuid,
    pub vaccine: String,
    pub dose_number: Option<u32>,
    pub date: NaiveDate,
    pub facility: Option<String>,
}
