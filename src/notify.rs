// Notification sink: tells connected clients a fight changed.
//
// Notifications are sent after the action has committed. A failure here is
// the caller's to log; it never undoes the action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::db::Fight;

/// Summary pushed to subscribers after a successful action.
#[derive(Debug, Clone, Serialize)]
pub struct FightNotification {
    pub fight_id: i64,
    pub action: &'static str,
    pub sequence: i32,
    pub updated_at: String,
    pub sent_at: DateTime<Utc>,
}

impl FightNotification {
    pub fn new(action: &'static str, fight: &Fight) -> Self {
        Self {
            fight_id: fight.id,
            action,
            sequence: fight.sequence,
            updated_at: fight.updated_at.clone(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait NotificationSink: Send + Sync {
    fn fight_updated(&self, notification: FightNotification) -> Result<(), NotifyError>;
}

/// An encoded notification tagged with its fight, so subscribers can filter.
#[derive(Debug, Clone)]
pub struct FightMessage {
    pub fight_id: i64,
    pub payload: String,
}

/// Fans notifications out over a broadcast channel to WebSocket subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<FightMessage>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FightMessage> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn fight_updated(&self, notification: FightNotification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&notification)?;
        // No subscribers is not an error; nobody is watching this fight.
        let delivered = self
            .tx
            .send(FightMessage {
                fight_id: notification.fight_id,
                payload,
            })
            .unwrap_or(0);
        tracing::debug!(
            fight_id = notification.fight_id,
            action = notification.action,
            delivered,
            "fight notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fight(id: i64) -> Fight {
        Fight {
            id,
            name: "Warehouse".into(),
            active: true,
            sequence: 2,
            archived: false,
            campaign_id: None,
            created_at: String::new(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_send_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(4);
        assert!(notifier
            .fight_updated(FightNotification::new("boost", &fight(1)))
            .is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_receives_payload() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        notifier
            .fight_updated(FightNotification::new("up_check", &fight(9)))
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.fight_id, 9);
        let value: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(value["action"], "up_check");
        assert_eq!(value["sequence"], 2);
        assert!(value["sent_at"].is_string());
    }
}
