use crate::domain::notification::Notification;
use crate::domain::ports::NotificationSink;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Outbox {
    seen: HashSet<String>,
    events: Vec<Notification>,
}

/// Collects notifications in memory, dropping repeats of the same event key.
#[derive(Default, Clone)]
pub struct InMemoryOutbox {
    inner: Arc<RwLock<Outbox>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Notification> {
        self.inner.read().await.events.clone()
    }

    pub async fn events_for(&self, target: &str) -> Vec<Notification> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|event| event.target.as_str() == target)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for InMemoryOutbox {
    async fn emit(&self, notification: Notification) -> Result<()> {
        let mut outbox = self.inner.write().await;
        if outbox.seen.insert(notification.event_key()) {
            outbox.events.push(notification);
        }
        Ok(())
    }
}

/// Writes every notification to the log. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn emit(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            target_actor = %notification.target,
            kind = %notification.kind,
            order_id = %notification.related_order,
            payload = %notification.payload,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationKind;

    #[tokio::test]
    async fn test_outbox_deduplicates_by_event_key() {
        let outbox = InMemoryOutbox::new();
        let event = Notification::new("b1".into(), NotificationKind::OrderCompleted, "o1".into());

        outbox.emit(event.clone()).await.unwrap();
        outbox.emit(event).await.unwrap();
        outbox
            .emit(Notification::new(
                "s1".into(),
                NotificationKind::OrderCompleted,
                "o1".into(),
            ))
            .await
            .unwrap();

        assert_eq!(outbox.events().await.len(), 2);
        assert_eq!(outbox.events_for("b1").await.len(), 1);
    }
}
