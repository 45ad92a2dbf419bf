use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub facility: Option<String>,
    pub outcome: Option<String>,
    pub follow_up_required: bool,
}
