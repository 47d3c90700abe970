use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one agent run end-to-end across logs. UUIDv7 embeds a
/// timestamp so request ids sort and correlate with the log stream they
/// were emitted into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Short content fingerprint used to make `chat_send` idempotent within one
/// run: the same `(chatKey, fingerprint(text))` pair is only dispatched
/// once even if the model calls the tool twice with identical text.
pub fn fingerprint(text: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_distinguishes_content() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("world"));
    }

    #[test]
    fn request_id_round_trips_as_string() {
        let id = RequestId::new();
        let s = id.to_string();
        let back = RequestId::from(s.clone());
        assert_eq!(back.as_str(), s);
    }
}
