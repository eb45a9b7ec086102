use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::api::health::HealthState;
use crate::error::Result;
use crate::types::AlertEvent;

/// Receives AlertEvents from the workers and persists them to SQLite.
/// Runs as a dedicated background task so a slow disk never blocks a scan.
pub struct AlertJournal {
    pool: sqlx::SqlitePool,
    alert_rx: mpsc::Receiver<AlertEvent>,
    health: Arc<HealthState>,
}

impl AlertJournal {
    pub fn new(
        pool: sqlx::SqlitePool,
        alert_rx: mpsc::Receiver<AlertEvent>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            pool,
            alert_rx,
            health,
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.alert_rx.recv().await {
            if let Err(e) = self.write_alert(&event).await {
                error!("Alert journal write error: {e}");
            }
        }
    }

    async fn write_alert(&self, a: &AlertEvent) -> Result<()> {
        let trigger_kind = a.trigger.as_str();
        let delivered = i64::from(a.delivered);

        sqlx::query(
            r#"
            INSERT INTO alerts (
                worker, symbol, trigger_kind, value, price,
                message, delivered, sent_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(a.worker)
        .bind(&a.symbol)
        .bind(trigger_kind)
        .bind(a.value)
        .bind(a.price)
        .bind(&a.message)
        .bind(delivered)
        .bind(a.sent_at_ms)
        .execute(&self.pool)
        .await?;

        self.health.inc_alerts_written();
        self.health.set_last_alert_at_ms(a.sent_at_ms.max(0) as u64);
        Ok(())
    }
}
