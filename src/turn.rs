//! Conversation turns as persisted by the message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix applied to a user turn's id to derive the id of the reply to it.
pub const ASSISTANT_ID_PREFIX: &str = "reply-";

/// Who produced a turn. Each variant carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Speaker {
    User {
        author_id: String,
        author_name: String,
    },
    Assistant {
        /// Id of the user turn this reply answers.
        in_reply_to: String,
    },
}

impl Speaker {
    pub fn role(&self) -> &'static str {
        match self {
            Speaker::User { .. } => "user",
            Speaker::Assistant { .. } => "assistant",
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Speaker::Assistant { .. })
    }
}

/// Write-side shape of a turn; the store stamps `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    pub channel_id: String,
    pub guild_id: String,
    pub vector: Option<Vec<f32>>,
}

/// An immutable, persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    pub channel_id: String,
    pub guild_id: String,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn has_vector(&self) -> bool {
        self.vector.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Fields the caller supplies when recording a user utterance.
#[derive(Debug, Clone)]
pub struct UserMessage {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub channel_id: String,
    pub guild_id: String,
}

impl UserMessage {
    pub fn into_new_turn(self, vector: Option<Vec<f32>>) -> NewTurn {
        NewTurn {
            id: self.id,
            speaker: Speaker::User {
                author_id: self.author_id,
                author_name: self.author_name,
            },
            content: self.content,
            channel_id: self.channel_id,
            guild_id: self.guild_id,
            vector,
        }
    }
}

/// Fields the caller supplies when recording the assistant's reply.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    /// Id of the user turn that provoked the reply.
    pub in_reply_to: String,
    pub content: String,
    pub channel_id: String,
    pub guild_id: String,
}

impl AssistantMessage {
    pub fn turn_id(&self) -> String {
        format!("{}{}", ASSISTANT_ID_PREFIX, self.in_reply_to)
    }

    pub fn into_new_turn(self, vector: Option<Vec<f32>>) -> NewTurn {
        NewTurn {
            id: self.turn_id(),
            speaker: Speaker::Assistant {
                in_reply_to: self.in_reply_to,
            },
            content: self.content,
            channel_id: self.channel_id,
            guild_id: self.guild_id,
            vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_id_is_derived_from_user_id() {
        let msg = AssistantMessage {
            in_reply_to: "1234".to_string(),
            content: "hi".to_string(),
            channel_id: "c1".to_string(),
            guild_id: "g1".to_string(),
        };
        assert_eq!(msg.turn_id(), "reply-1234");

        let turn = msg.into_new_turn(None);
        assert_eq!(turn.id, "reply-1234");
        assert_eq!(
            turn.speaker,
            Speaker::Assistant {
                in_reply_to: "1234".to_string()
            }
        );
        assert_eq!(turn.speaker.role(), "assistant");
    }

    #[test]
    fn test_speaker_serializes_with_role_tag() {
        let speaker = Speaker::User {
            author_id: "u1".to_string(),
            author_name: "Alice".to_string(),
        };
        let json = serde_json::to_value(&speaker).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["author_name"], "Alice");
    }
}
