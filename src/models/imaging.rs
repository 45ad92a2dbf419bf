use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ImagingModality;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingStudy {
    pub id: Uuid,
    pub modality: ImagingModality,
    pub body_site: String,
    pub date: NaiveDate,
    pub facility: Option<String>,
    pub findings: Option<String>,
}
