use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::Notifier;
use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::Result;
use crate::types::SendOutcome;

/// Bot API response envelope. `result` is a message object for sendMessage /
/// editMessageText but a bare `true` for pinChatMessage, so it stays untyped.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", cfg.telegram_api_url, cfg.telegram_bot_token),
            chat_id: cfg.telegram_chat_id.clone(),
        })
    }

    async fn call(&self, method: &str, body: Value) -> SendOutcome {
        let url = format!("{}/{}", self.base_url, method);
        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(method, "telegram request failed: {e}");
                return SendOutcome::failed(e.to_string());
            }
        };

        let status = resp.status();
        match resp.json::<ApiResponse>().await {
            Ok(api) => {
                let outcome = outcome_from(api);
                if let Some(err) = &outcome.error {
                    warn!(method, "telegram rejected message: {err}");
                }
                outcome
            }
            Err(e) => {
                warn!(method, %status, "telegram response unreadable: {e}");
                SendOutcome::failed(format!("HTTP {status}: {e}"))
            }
        }
    }
}

fn outcome_from(resp: ApiResponse) -> SendOutcome {
    if resp.ok {
        SendOutcome {
            success: true,
            message_id: resp
                .result
                .as_ref()
                .and_then(|r| r.get("message_id"))
                .and_then(|m| m.as_i64()),
            error: None,
        }
    } else {
        SendOutcome::failed(
            resp.description
                .unwrap_or_else(|| "unknown telegram error".to_string()),
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> SendOutcome {
        self.call(
            "sendMessage",
            json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    async fn send_formatted(&self, html: &str) -> SendOutcome {
        self.call(
            "sendMessage",
            json!({
                "chat_id": self.chat_id,
                "text": html,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    async fn edit(&self, message_id: i64, html: &str) -> SendOutcome {
        self.call(
            "editMessageText",
            json!({
                "chat_id": self.chat_id,
                "message_id": message_id,
                "text": html,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    async fn pin(&self, message_id: i64) -> SendOutcome {
        self.call(
            "pinChatMessage",
            json!({
                "chat_id": self.chat_id,
                "message_id": message_id,
                "disable_notification": true,
            }),
        )
        .await
    }
}
