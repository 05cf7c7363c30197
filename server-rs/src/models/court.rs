use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Court {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub sport_id: Uuid,
    pub name: String,
    pub hourly_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One row of a court's weekly timetable. `weekday` counts from Sunday = 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHours {
    pub court_id: Uuid,
    pub weekday: i16,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

/// Display names joined at read time for booking responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourtLabels {
    pub court_name: String,
    pub facility_name: String,
    pub sport_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSlot {
    pub id: Uuid,
    pub court_id: Uuid,
    #[sqlx(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[sqlx(rename = "end_time")]
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourtRequest {
    pub name: String,
    pub sport_id: Uuid,
    pub hourly_rate: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourtRequest {
    pub name: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HoursEntry {
    pub weekday: i16,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct SetHoursRequest {
    pub hours: Vec<HoursEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
}
