use crate::error::{Result, RouterError};
use agentlane_channels::{EgressRegistry, SendOutcome, SendTextParams};
use agentlane_core::{ChatKey, Role};
use agentlane_transcript::TranscriptStore;
use std::sync::Arc;
use tracing::instrument;

/// Parses chat keys and recovers the platform-native dispatch parameters
/// (`messageId`, `threadId`, `chatType`) a reply needs from prior ingress —
/// these are never minted, only ever copied forward from a message the
/// platform itself sent us.
pub struct ChatKeyRouter {
    registry: Arc<EgressRegistry>,
}

impl ChatKeyRouter {
    pub fn new(registry: Arc<EgressRegistry>) -> Self {
        Self { registry }
    }

    pub fn parse(chat_key: &str) -> Result<ChatKey> {
        ChatKey::parse(chat_key).map_err(|e| RouterError::BadChatKey(e.0))
    }

    #[instrument(skip(self, store), fields(chat_key = %chat_key))]
    pub async fn send_text_by_chat_key(
        &self,
        chat_key: &str,
        text: &str,
        store: &TranscriptStore,
    ) -> Result<SendOutcome> {
        let key = Self::parse(chat_key)?;
        let dispatcher = self
            .registry
            .get_chat_sender(&key.channel().to_string())
            .await
            .ok_or_else(|| RouterError::NoDispatcher(key.channel().to_string()))?;

        let mut thread_id = key.thread_id().map(str::to_string);
        let mut chat_type = key.chat_type().map(|t| t.to_string());
        let mut message_id: Option<String> = None;

        let loaded = store.load_all()?;
        for msg in loaded.messages.iter().rev() {
            if msg.role != Role::User {
                continue;
            }
            let md = &msg.metadata;
            if thread_id.is_none() {
                thread_id = md.thread_id.clone();
            }
            if chat_type.is_none() {
                chat_type = md.target_type.clone();
            }
            if message_id.is_none() {
                message_id = md.message_id.clone();
            }
            if thread_id.is_some() && chat_type.is_some() && message_id.is_some() {
                break;
            }
        }

        if matches!(key.channel(), agentlane_core::Channel::Qq) && (chat_type.is_none() || message_id.is_none()) {
            return Err(RouterError::QqReplyContextMissing);
        }

        let params = SendTextParams {
            chat_id: key.chat_id().to_string(),
            text: text.to_string(),
            message_thread_id: thread_id,
            chat_type,
            message_id,
        };
        dispatcher.send_text(params).await.map_err(|e| RouterError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlane_channels::Dispatcher;
    use agentlane_core::Channel;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingDispatcher {
        channel: &'static str,
        last: Mutex<Option<SendTextParams>>,
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        fn channel(&self) -> &str {
            self.channel
        }

        async fn send_text(&self, params: SendTextParams) -> agentlane_channels::error::Result<SendOutcome> {
            *self.last.lock().unwrap() = Some(params);
            Ok(SendOutcome::ok())
        }
    }

    async fn setup(channel: &'static str) -> (Arc<RecordingDispatcher>, ChatKeyRouter) {
        let registry = Arc::new(EgressRegistry::new());
        let dispatcher = Arc::new(RecordingDispatcher { channel, last: Mutex::new(None) });
        registry.register(dispatcher.clone()).await;
        (dispatcher, ChatKeyRouter::new(registry))
    }

    #[tokio::test]
    async fn bad_chat_key_is_rejected() {
        let (_d, router) = setup("telegram").await;
        let dir = TempDir::new().unwrap();
        let key = ChatKey::new(Channel::Telegram, "1", None, None).unwrap();
        let store = TranscriptStore::new(dir.path(), key);
        let err = router.send_text_by_chat_key("not-a-chat-key", "hi", &store).await.unwrap_err();
        assert!(matches!(err, RouterError::BadChatKey(_)));
    }

    #[tokio::test]
    async fn missing_dispatcher_surfaces_no_dispatcher() {
        let registry = Arc::new(EgressRegistry::new());
        let router = ChatKeyRouter::new(registry);
        let dir = TempDir::new().unwrap();
        let key = ChatKey::new(Channel::Telegram, "1", None, None).unwrap();
        let store = TranscriptStore::new(dir.path(), key);
        let err = router.send_text_by_chat_key("telegram-chat-1", "hi", &store).await.unwrap_err();
        assert!(matches!(err, RouterError::NoDispatcher(_)));
    }

    #[tokio::test]
    async fn qq_without_prior_ingress_fails_with_reply_context_missing() {
        let (_d, router) = setup("qq").await;
        let dir = TempDir::new().unwrap();
        let key = ChatKey::new(Channel::Qq, "777", None, Some(agentlane_core::QqChatType::Group)).unwrap();
        let store = TranscriptStore::new(dir.path(), key);
        let err = router.send_text_by_chat_key("qq-group-777", "hi", &store).await.unwrap_err();
        assert!(matches!(err, RouterError::QqReplyContextMissing));
    }

    #[tokio::test]
    async fn qq_scenario_s3_recovers_message_id_from_transcript() {
        let (dispatcher, router) = setup("qq").await;
        let dir = TempDir::new().unwrap();
        let key = ChatKey::new(Channel::Qq, "777", None, Some(agentlane_core::QqChatType::Group)).unwrap();
        let store = TranscriptStore::new(dir.path(), key.clone());
        let mut msg = store.create_user_text_message("hello", 0, None, None, Some("m9".into()), None, None);
        msg.metadata.target_type = Some("group".into());
        store.append(&msg).await.unwrap();

        let outcome = router.send_text_by_chat_key("qq-group-777", "hi", &store).await.unwrap();
        assert!(outcome.success);
        let last = dispatcher.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.chat_id, "777");
        assert_eq!(last.chat_type.as_deref(), Some("group"));
        assert_eq!(last.message_id.as_deref(), Some("m9"));
    }
}
