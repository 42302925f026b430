use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message};

/// Change events pushed by the document backend's subscription feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    /// A conversation was created or its metadata changed
    /// (last message, unread counters, repaired buyer image).
    ConversationUpsert { conversation: Conversation },

    /// A new message was appended to a conversation
    MessageAppend { message: Message },

    /// A participant marked the conversation read; read flags flipped
    MessagesRead {
        conversation_id: String,
        reader_id: String,
    },
}

impl ChangeEvent {
    /// The conversation this event is scoped to.
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::ConversationUpsert { conversation } => &conversation.id,
            Self::MessageAppend { message } => &message.conversation_id,
            Self::MessagesRead { conversation_id, .. } => conversation_id,
        }
    }

    /// True if this event can change a conversation list (ordering,
    /// unread counters, last message).
    pub fn touches_conversation(&self) -> bool {
        matches!(self, Self::ConversationUpsert { .. })
    }
}
