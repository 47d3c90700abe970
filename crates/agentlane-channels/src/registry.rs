use crate::dispatcher::Dispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Process-wide `channel -> dispatcher` map. Read-mostly: writes only happen
/// at startup/reconfiguration. Registration is last-writer-wins so a
/// restart can cleanly rebuild the map by re-registering every adapter.
#[derive(Default)]
pub struct EgressRegistry {
    dispatchers: RwLock<HashMap<String, Arc<dyn Dispatcher>>>,
}

impl EgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, dispatcher: Arc<dyn Dispatcher>) {
        let channel = dispatcher.channel().to_string();
        let mut map = self.dispatchers.write().await;
        if map.insert(channel.clone(), dispatcher).is_some() {
            info!(channel = %channel, "dispatcher re-registered, replacing previous one");
        } else {
            info!(channel = %channel, "dispatcher registered");
        }
    }

    pub async fn unregister(&self, channel: &str) {
        self.dispatchers.write().await.remove(channel);
    }

    /// Returns `None` when the channel has no registered dispatcher —
    /// callers surface this as `NoDispatcher`.
    pub async fn get_chat_sender(&self, channel: &str) -> Option<Arc<dyn Dispatcher>> {
        self.dispatchers.read().await.get(channel).cloned()
    }

    pub async fn registered_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dispatchers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{SendOutcome, SendTextParams};
    use crate::error::Result;
    use async_trait::async_trait;

    struct FakeDispatcher {
        channel: &'static str,
    }

    #[async_trait]
    impl Dispatcher for FakeDispatcher {
        fn channel(&self) -> &str {
            self.channel
        }

        async fn send_text(&self, _params: SendTextParams) -> Result<SendOutcome> {
            Ok(SendOutcome::ok())
        }
    }

    #[tokio::test]
    async fn unregistered_channel_returns_none() {
        let registry = EgressRegistry::new();
        assert!(registry.get_chat_sender("telegram").await.is_none());
    }

    #[tokio::test]
    async fn registration_is_last_writer_wins() {
        let registry = EgressRegistry::new();
        let first: Arc<dyn Dispatcher> = Arc::new(FakeDispatcher { channel: "telegram" });
        let second: Arc<dyn Dispatcher> = Arc::new(FakeDispatcher { channel: "telegram" });
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;
        let sender = registry.get_chat_sender("telegram").await.unwrap();
        assert!(Arc::ptr_eq(&sender, &second));
        assert!(!Arc::ptr_eq(&sender, &first));
    }

    #[tokio::test]
    async fn registered_channels_lists_all() {
        let registry = EgressRegistry::new();
        registry.register(Arc::new(FakeDispatcher { channel: "telegram" })).await;
        registry.register(Arc::new(FakeDispatcher { channel: "feishu" })).await;
        assert_eq!(registry.registered_channels().await, vec!["feishu".to_string(), "telegram".to_string()]);
    }
}
