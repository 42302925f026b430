use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use soukify_notify::NotificationPrefs;
use soukify_types::{ChangeEvent, Conversation, Message, Role, UserProfile};

use crate::backend::ChatBackend;

/// In-process backend used by tests and the demo binary.
///
/// Conversations and messages live under one lock so `record_message`
/// and `mark_read` stay atomic the way the managed backend's
/// transactions are.
pub struct MemoryBackend {
    state: RwLock<State>,
    profiles: RwLock<HashMap<String, UserProfile>>,
    prefs: RwLock<HashMap<String, NotificationPrefs>>,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(1024);
        Self {
            state: RwLock::new(State::default()),
            profiles: RwLock::new(HashMap::new()),
            prefs: RwLock::new(HashMap::new()),
            changes_tx,
        }
    }

    pub async fn add_profile(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    pub async fn set_prefs(&self, user_id: impl Into<String>, prefs: NotificationPrefs) {
        self.prefs.write().await.insert(user_id.into(), prefs);
    }

    fn emit(&self, event: ChangeEvent) {
        // No receivers is fine; nobody is subscribed yet.
        let _ = self.changes_tx.send(event);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(conversation_id)
            .cloned())
    }

    async fn create_if_absent(&self, conversation: Conversation) -> Result<Conversation> {
        let stored = {
            let mut state = self.state.write().await;
            if let Some(existing) = state.conversations.get(&conversation.id) {
                return Ok(existing.clone());
            }
            state.messages.entry(conversation.id.clone()).or_default();
            state
                .conversations
                .insert(conversation.id.clone(), conversation.clone());
            conversation
        };

        self.emit(ChangeEvent::ConversationUpsert {
            conversation: stored.clone(),
        });
        Ok(stored)
    }

    async fn update_buyer_image(&self, conversation_id: &str, image: &str) -> Result<()> {
        let updated = {
            let mut state = self.state.write().await;
            let Some(conversation) = state.conversations.get_mut(conversation_id) else {
                bail!("conversation not found: {conversation_id}");
            };
            conversation.buyer_image = image.to_string();
            conversation.clone()
        };

        self.emit(ChangeEvent::ConversationUpsert {
            conversation: updated,
        });
        Ok(())
    }

    async fn record_message(&self, message: Message) -> Result<Conversation> {
        let updated = {
            let mut state = self.state.write().await;
            let Some(conversation) = state.conversations.get_mut(&message.conversation_id) else {
                bail!("conversation not found: {}", message.conversation_id);
            };
            let Some(sender_role) = conversation.role_of(&message.sender_id) else {
                bail!(
                    "sender {} is not a participant of {}",
                    message.sender_id,
                    message.conversation_id
                );
            };

            conversation.last_message = message.text.clone();
            conversation.last_message_timestamp = message.timestamp;
            conversation.bump_unread(sender_role.other());
            let updated = conversation.clone();

            state
                .messages
                .entry(message.conversation_id.clone())
                .or_default()
                .push(message.clone());
            updated
        };

        self.emit(ChangeEvent::MessageAppend { message });
        self.emit(ChangeEvent::ConversationUpsert {
            conversation: updated.clone(),
        });
        Ok(updated)
    }

    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<()> {
        let updated = {
            let mut state = self.state.write().await;
            let Some(conversation) = state.conversations.get_mut(conversation_id) else {
                bail!("conversation not found: {conversation_id}");
            };
            let Some(role) = conversation.role_of(reader_id) else {
                bail!("reader {reader_id} is not a participant of {conversation_id}");
            };

            conversation.set_unread(role, 0);
            let updated = conversation.clone();

            if let Some(messages) = state.messages.get_mut(conversation_id) {
                for message in messages.iter_mut() {
                    if message.sender_id != reader_id {
                        message.read = true;
                    }
                }
            }
            updated
        };

        self.emit(ChangeEvent::ConversationUpsert {
            conversation: updated,
        });
        self.emit(ChangeEvent::MessagesRead {
            conversation_id: conversation_id.to_string(),
            reader_id: reader_id.to_string(),
        });
        Ok(())
    }

    async fn conversations_for(&self, role: Role, user_id: &str) -> Result<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.participant(role) == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
        Ok(conversations)
    }

    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages = state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn notification_prefs(&self, user_id: &str) -> Result<Option<NotificationPrefs>> {
        Ok(self.prefs.read().await.get(user_id).cloned())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }
}
