/// Database row types for the alert journal.
/// Used by sqlx for typed queries.
use serde::Serialize;

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub worker: String,
    pub symbol: String,
    pub trigger_kind: String,
    pub value: f64,
    pub price: Option<f64>,
    pub message: String,
    pub delivered: i64,
    pub sent_at_ms: i64,
}

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct WorkerAlertCount {
    pub worker: String,
    pub total: i64,
}

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct TriggerAlertCount {
    pub trigger_kind: String,
    pub total: i64,
}
