use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub event_type: String,
    pub description: String,
    pub date: NaiveDate,
    pub severity: Option<i32>,
}
