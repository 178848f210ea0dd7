//! ChannelManager: fans in every channel's stream and routes replies back.

use std::sync::Arc;

use futures::stream;
use tokio::sync::RwLock;

use crate::channels::{
    Channel, IncomingMessage, MessageHandle, MessageStream, OutgoingResponse, StatusUpdate,
};
use crate::error::ChannelError;

/// Owns the registered channels. The first one added is the default route
/// for pushes that are not replies (reminders, broadcasts).
#[derive(Default)]
pub struct ChannelManager {
    channels: RwLock<Vec<Arc<dyn Channel>>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, channel: Arc<dyn Channel>) {
        tracing::info!(channel = channel.name(), "Channel registered");
        self.channels.write().await.push(channel);
    }

    async fn get(&self, name: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        self.channels
            .read()
            .await
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| ChannelError::SendFailed {
                name: name.to_string(),
                reason: "channel not registered".into(),
            })
    }

    async fn default_channel(&self) -> Result<Arc<dyn Channel>, ChannelError> {
        self.channels
            .read()
            .await
            .first()
            .cloned()
            .ok_or_else(|| ChannelError::SendFailed {
                name: "none".into(),
                reason: "no channels registered".into(),
            })
    }

    /// Start every channel and merge their streams. Channels that fail their
    /// health check or fail to start are logged and skipped.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let channels = self.channels.read().await.clone();
        let mut streams = Vec::new();
        for channel in channels {
            if let Err(e) = channel.health_check().await {
                tracing::error!(channel = channel.name(), "Channel health check failed: {e}");
                continue;
            }
            match channel.start().await {
                Ok(s) => streams.push(s),
                Err(e) => tracing::error!(channel = channel.name(), "Channel failed to start: {e}"),
            }
        }
        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        self.get(&msg.channel).await?.respond(msg, response).await
    }

    /// Push to a user through the default channel.
    pub async fn notify(
        &self,
        user_id: &str,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        self.default_channel().await?.send_to(user_id, response).await
    }

    pub async fn retract(
        &self,
        channel: &str,
        user_id: &str,
        handle: &MessageHandle,
    ) -> Result<(), ChannelError> {
        self.get(channel).await?.retract(user_id, handle).await
    }

    pub async fn send_status(
        &self,
        msg: &IncomingMessage,
        status: StatusUpdate,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)
            .await?
            .send_status(status, &msg.metadata)
            .await
    }

    pub async fn shutdown_all(&self) {
        for channel in self.channels.read().await.iter() {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), "Channel shutdown failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    struct FakeChannel {
        name: &'static str,
        inbound: Vec<&'static str>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeChannel {
        fn new(name: &'static str, inbound: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                inbound,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let msgs: Vec<IncomingMessage> = self
                .inbound
                .iter()
                .map(|t| IncomingMessage::new(self.name, "u1", t))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<Option<MessageHandle>, ChannelError> {
            self.send_to(&msg.user_id, response).await
        }

        async fn send_to(
            &self,
            user_id: &str,
            response: OutgoingResponse,
        ) -> Result<Option<MessageHandle>, ChannelError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((user_id.to_string(), response.content));
            Ok(Some(sent.len().to_string()))
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn merges_streams_from_all_channels() {
        let manager = ChannelManager::new();
        manager.add(FakeChannel::new("a", vec!["one", "two"])).await;
        manager.add(FakeChannel::new("b", vec!["three"])).await;

        let stream = manager.start_all().await.unwrap();
        let mut contents: Vec<String> = stream.take(3).map(|m| m.content).collect().await;
        contents.sort();
        assert_eq!(contents, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn respond_routes_to_origin_channel() {
        let manager = ChannelManager::new();
        let a = FakeChannel::new("a", vec![]);
        let b = FakeChannel::new("b", vec![]);
        manager.add(a.clone()).await;
        manager.add(b.clone()).await;

        let msg = IncomingMessage::new("b", "u1", "hi");
        let handle = manager
            .respond(&msg, OutgoingResponse::text("hello"))
            .await
            .unwrap();
        assert_eq!(handle.as_deref(), Some("1"));
        assert!(a.sent.lock().unwrap().is_empty());
        assert_eq!(b.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notify_uses_first_channel() {
        let manager = ChannelManager::new();
        let a = FakeChannel::new("a", vec![]);
        manager.add(a.clone()).await;
        manager.add(FakeChannel::new("b", vec![])).await;

        manager
            .notify("u9", OutgoingResponse::text("reminder"))
            .await
            .unwrap();
        assert_eq!(
            a.sent.lock().unwrap().as_slice(),
            &[("u9".to_string(), "reminder".to_string())]
        );
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let manager = ChannelManager::new();
        let msg = IncomingMessage::new("ghost", "u1", "hi");
        assert!(manager
            .respond(&msg, OutgoingResponse::text("x"))
            .await
            .is_err());
        assert!(manager.start_all().await.is_err());
    }
}
