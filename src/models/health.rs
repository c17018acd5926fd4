use serde::Serialize;
use chrono::{DateTime, Utc};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// "ok" when the data store answered, "unavailable" otherwise
    pub storage: &'static str,
    pub time: DateTime<Utc>,
}
