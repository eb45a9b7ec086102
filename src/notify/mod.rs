mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;

use crate::types::SendOutcome;

/// Delivery seam for alerts and status messages. Implementations fold their
/// transport failures into `SendOutcome` instead of returning errors, so that
/// callers key dedup-state updates off actual delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Plain-text message to the configured chat.
    async fn send(&self, text: &str) -> SendOutcome;

    /// HTML-formatted message.
    async fn send_formatted(&self, html: &str) -> SendOutcome;

    /// Replace the text of a previously sent message.
    async fn edit(&self, message_id: i64, html: &str) -> SendOutcome;

    /// Pin a previously sent message in the chat.
    async fn pin(&self, message_id: i64) -> SendOutcome;
}
