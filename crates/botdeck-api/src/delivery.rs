use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ledger::Ledger;

/// Background task that flips a queued message to delivered after `delay`.
///
/// Nothing waits on it and it cannot be cancelled. Failures are logged and
/// dropped; the request that queued the message has already been answered.
pub fn schedule(ledger: Arc<Ledger>, message_id: Uuid, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        match tokio::task::spawn_blocking(move || ledger.deliver(message_id, Utc::now())).await {
            Ok(Ok(true)) => debug!("Message {} delivered", message_id),
            Ok(Ok(false)) => debug!("Message {} was already delivered", message_id),
            Ok(Err(e)) => warn!("Delivery of message {} failed: {:#}", message_id, e),
            Err(e) => warn!("Delivery task for message {} aborted: {}", message_id, e),
        }
    });
}

/// Reschedule messages left queued by a previous run. The delay still counts
/// from when each message was sent, so overdue ones fire immediately.
pub fn resume_pending(ledger: &Arc<Ledger>, delay: Duration) -> anyhow::Result<usize> {
    let pending = ledger.pending_deliveries()?;
    let now = Utc::now();

    for message in &pending {
        let waited = (now - message.sent_at).to_std().unwrap_or_default();
        schedule(ledger.clone(), message.id, delay.saturating_sub(waited));
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::ledger::{DeployBot, SendMessage};
    use crate::process::LoggingProcessControl;
    use botdeck_db::Database;
    use botdeck_types::models::MessageStatus;

    async fn wait_for_delivery(ledger: &Ledger, message_id: Uuid) -> bool {
        for _ in 0..100 {
            let message = ledger.db().get_message(message_id).unwrap().unwrap();
            if message.status == MessageStatus::Delivered {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn pending_messages_are_resumed() {
        let uploads = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::new(
            Arc::new(Database::open_in_memory().unwrap()),
            CredentialStore::new(uploads.path()),
            Arc::new(LoggingProcessControl),
        ));

        let alice = ledger.register(Some("alice"), Some("pw")).unwrap();
        let bot = ledger
            .deploy_bot(
                alice.id,
                DeployBot {
                    name: Some("A".into()),
                    webhook_url: Some("https://example.com/hook".into()),
                    credentials: Some(b"{}".to_vec()),
                },
                Utc::now(),
            )
            .unwrap();
        let message = ledger
            .send_message(
                alice.id,
                SendMessage {
                    bot_id: Some(bot.id.to_string()),
                    phone_number: Some("+15550100".into()),
                    body: Some("hello".into()),
                },
                Utc::now(),
            )
            .unwrap();

        let resumed = resume_pending(&ledger, Duration::from_millis(20)).unwrap();
        assert_eq!(resumed, 1);
        assert!(wait_for_delivery(&ledger, message.id).await);
        assert_eq!(ledger.list_bots(alice.id).unwrap()[0].messages_processed, 1);
    }
}
