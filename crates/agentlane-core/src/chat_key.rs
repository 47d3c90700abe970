use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chat platforms the kernel knows how to route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Telegram,
    Feishu,
    Qq,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Telegram => write!(f, "telegram"),
            Channel::Feishu => write!(f, "feishu"),
            Channel::Qq => write!(f, "qq"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Channel::Telegram),
            "feishu" => Ok(Channel::Feishu),
            "qq" => Ok(Channel::Qq),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// QQ distinguishes group chats, one-on-one chats and channel (guild) chats;
/// a passive reply must echo back whichever one the ingress message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QqChatType {
    Group,
    C2c,
    Channel,
}

impl fmt::Display for QqChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QqChatType::Group => write!(f, "group"),
            QqChatType::C2c => write!(f, "c2c"),
            QqChatType::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for QqChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(QqChatType::Group),
            "c2c" => Ok(QqChatType::C2c),
            "channel" => Ok(QqChatType::Channel),
            other => Err(format!("unknown qq chat type: {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("bad chat key: {0}")]
pub struct ChatKeyError(pub String);

/// Opaque per-conversation identifier. Two different platform sessions always
/// yield different chat keys; a chat key is its own lane identity in the
/// scheduler and its own directory name (percent-encoded) in the transcript
/// store.
///
/// Canonical string forms:
/// - `telegram-chat-<chatId>` or `telegram-chat-<chatId>-topic-<threadId>`
/// - `feishu-chat-<chatId>`
/// - `qq-<chatType>-<chatId>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChatKey {
    raw: String,
    channel: Channel,
    chat_id: String,
    thread_id: Option<String>,
    chat_type: Option<QqChatType>,
}

impl ChatKey {
    pub fn new(
        channel: Channel,
        chat_id: &str,
        thread_id: Option<&str>,
        chat_type: Option<QqChatType>,
    ) -> Result<Self, ChatKeyError> {
        if chat_id.is_empty() {
            return Err(ChatKeyError("chat id must not be empty".into()));
        }
        let raw = match channel {
            Channel::Telegram => match thread_id {
                Some(t) => format!("telegram-chat-{chat_id}-topic-{t}"),
                None => format!("telegram-chat-{chat_id}"),
            },
            Channel::Feishu => {
                if thread_id.is_some() {
                    return Err(ChatKeyError("feishu does not support thread ids".into()));
                }
                format!("feishu-chat-{chat_id}")
            }
            Channel::Qq => {
                let ct = chat_type
                    .ok_or_else(|| ChatKeyError("qq chat keys require a chat type".into()))?;
                if thread_id.is_some() {
                    return Err(ChatKeyError("qq does not support thread ids".into()));
                }
                format!("qq-{ct}-{chat_id}")
            }
        };
        Ok(Self {
            raw,
            channel,
            chat_id: chat_id.to_string(),
            thread_id: thread_id.map(str::to_string),
            chat_type,
        })
    }

    pub fn parse(s: &str) -> Result<Self, ChatKeyError> {
        if let Some(rest) = s.strip_prefix("telegram-chat-") {
            return match rest.split_once("-topic-") {
                Some((chat_id, thread_id)) if !chat_id.is_empty() && !thread_id.is_empty() => {
                    ChatKey::new(Channel::Telegram, chat_id, Some(thread_id), None)
                }
                Some(_) => Err(ChatKeyError(format!("malformed telegram chat key: {s}"))),
                None if !rest.is_empty() => ChatKey::new(Channel::Telegram, rest, None, None),
                None => Err(ChatKeyError(format!("malformed telegram chat key: {s}"))),
            };
        }
        if let Some(rest) = s.strip_prefix("feishu-chat-") {
            if rest.is_empty() {
                return Err(ChatKeyError(format!("malformed feishu chat key: {s}")));
            }
            return ChatKey::new(Channel::Feishu, rest, None, None);
        }
        if let Some(rest) = s.strip_prefix("qq-") {
            let (chat_type, chat_id) = rest
                .split_once('-')
                .ok_or_else(|| ChatKeyError(format!("malformed qq chat key: {s}")))?;
            if chat_id.is_empty() {
                return Err(ChatKeyError(format!("malformed qq chat key: {s}")));
            }
            let chat_type = QqChatType::from_str(chat_type)
                .map_err(|_| ChatKeyError(format!("malformed qq chat key: {s}")))?;
            return ChatKey::new(Channel::Qq, chat_id, None, Some(chat_type));
        }
        Err(ChatKeyError(format!("unrecognized chat key grammar: {s}")))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn chat_type(&self) -> Option<QqChatType> {
        self.chat_type
    }

    /// Percent-escapes everything outside `[A-Za-z0-9_-]` so the chat key is
    /// safe to use as a single filesystem path component.
    pub fn encoded(&self) -> String {
        use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
        const UNSAFE: &AsciiSet = &CONTROLS
            .add(b'/')
            .add(b'\\')
            .add(b':')
            .add(b'*')
            .add(b'?')
            .add(b'"')
            .add(b'<')
            .add(b'>')
            .add(b'|')
            .add(b' ')
            .add(b'.')
            .add(b'%');
        utf8_percent_encode(&self.raw, UNSAFE).to_string()
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for ChatKey {
    type Err = ChatKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChatKey::parse(s)
    }
}

impl TryFrom<String> for ChatKey {
    type Error = ChatKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ChatKey::parse(&s)
    }
}

impl From<ChatKey> for String {
    fn from(k: ChatKey) -> Self {
        k.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_telegram_simple() {
        let k = ChatKey::new(Channel::Telegram, "123", None, None).unwrap();
        assert_eq!(k.as_str(), "telegram-chat-123");
        let parsed = ChatKey::parse(k.as_str()).unwrap();
        assert_eq!(parsed, k);
    }

    #[test]
    fn roundtrip_telegram_topic() {
        let k = ChatKey::new(Channel::Telegram, "123", Some("9"), None).unwrap();
        assert_eq!(k.as_str(), "telegram-chat-123-topic-9");
        let parsed = ChatKey::parse(k.as_str()).unwrap();
        assert_eq!(parsed.thread_id(), Some("9"));
        assert_eq!(parsed, k);
    }

    #[test]
    fn roundtrip_feishu() {
        let k = ChatKey::new(Channel::Feishu, "oc_abc", None, None).unwrap();
        let parsed = ChatKey::parse(k.as_str()).unwrap();
        assert_eq!(parsed, k);
    }

    #[test]
    fn roundtrip_qq_group() {
        let k = ChatKey::new(Channel::Qq, "777", None, Some(QqChatType::Group)).unwrap();
        assert_eq!(k.as_str(), "qq-group-777");
        let parsed = ChatKey::parse(k.as_str()).unwrap();
        assert_eq!(parsed.chat_type(), Some(QqChatType::Group));
        assert_eq!(parsed, k);
    }

    #[test]
    fn different_channels_never_collide() {
        let t = ChatKey::new(Channel::Telegram, "1", None, None).unwrap();
        let f = ChatKey::new(Channel::Feishu, "1", None, None).unwrap();
        assert_ne!(t.as_str(), f.as_str());
    }

    #[test]
    fn qq_requires_chat_type() {
        assert!(ChatKey::new(Channel::Qq, "1", None, None).is_err());
    }

    #[test]
    fn parse_rejects_unknown_grammar() {
        assert!(ChatKey::parse("discord-chat-1").is_err());
        assert!(ChatKey::parse("telegram-chat-").is_err());
        assert!(ChatKey::parse("qq-bogus-1").is_err());
    }

    #[test]
    fn encoded_strips_unsafe_filename_chars() {
        let k = ChatKey::new(Channel::Telegram, "1", Some("2"), None).unwrap();
        let enc = k.encoded();
        assert!(!enc.contains('/'));
        assert_eq!(ChatKey::parse(k.as_str()).unwrap(), k);
    }
}
