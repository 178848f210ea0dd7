//! Per-user record of messages the bot sent, so stale prompts and menus can
//! be cleared from the chat.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::channels::MessageHandle;

/// Messages kept after delivering generated content.
pub const KEEP_AFTER_CONTENT: usize = 3;
/// Messages kept after an onboarding step.
pub const KEEP_AFTER_STEP: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub handle: MessageHandle,
}

#[derive(Default)]
pub struct MessageHistory {
    sent: Mutex<HashMap<String, VecDeque<SentMessage>>>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, user_id: &str, channel: &str, handle: MessageHandle) {
        self.sent
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push_back(SentMessage {
                channel: channel.to_string(),
                handle,
            });
    }

    /// Drop all but the newest `keep` messages and return the dropped ones,
    /// oldest first.
    pub async fn trim(&self, user_id: &str, keep: usize) -> Vec<SentMessage> {
        let mut sent = self.sent.lock().await;
        let Some(queue) = sent.get_mut(user_id) else {
            return Vec::new();
        };
        let excess = queue.len().saturating_sub(keep);
        let dropped: Vec<SentMessage> = queue.drain(..excess).collect();
        if queue.is_empty() {
            sent.remove(user_id);
        }
        dropped
    }

    pub async fn len(&self, user_id: &str) -> usize {
        self.sent.lock().await.get(user_id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trim_returns_oldest_first() {
        let history = MessageHistory::new();
        for i in 1..=5 {
            history.record("u1", "telegram", i.to_string()).await;
        }

        let dropped = history.trim("u1", KEEP_AFTER_CONTENT).await;
        let handles: Vec<&str> = dropped.iter().map(|m| m.handle.as_str()).collect();
        assert_eq!(handles, vec!["1", "2"]);
        assert_eq!(history.len("u1").await, 3);

        assert_eq!(history.trim("u1", KEEP_AFTER_STEP).await.len(), 3);
        assert_eq!(history.len("u1").await, 0);
    }

    #[tokio::test]
    async fn users_are_independent() {
        let history = MessageHistory::new();
        history.record("u1", "cli", "a".into()).await;
        history.record("u2", "cli", "b".into()).await;

        assert_eq!(history.trim("u1", 0).await.len(), 1);
        assert!(history.trim("u1", 0).await.is_empty());
        assert_eq!(history.len("u2").await, 1);
    }
}
