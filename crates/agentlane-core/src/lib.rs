pub mod chat_key;
pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use chat_key::{ChatKey, ChatKeyError, Channel, QqChatType};
pub use config::RuntimeConfig;
pub use error::{AgentlaneError, Result};
pub use message::{
    new_message_id, Message, MessageKind, MessageMetadata, MessagePart, MessageSource,
    MessagesMeta, Role, SkillRecord, SourceRange,
};
pub use types::{fingerprint, RequestId};
