use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use soukify_notify::NotificationPrefs;
use soukify_types::{ChangeEvent, Conversation, Message, Role, UserProfile};

/// The remote document backend the sync layer mirrors.
///
/// Implementations must make `create_if_absent` and `record_message`
/// atomic: concurrent creates for the same conversation key collapse onto
/// one document, and a recorded message updates the conversation's
/// last-message fields plus exactly the recipient's unread counter in the
/// same step. Every mutation is echoed on the change feed.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Create the conversation unless one with the same id exists;
    /// returns the stored document either way.
    async fn create_if_absent(&self, conversation: Conversation) -> Result<Conversation>;

    async fn update_buyer_image(&self, conversation_id: &str, image: &str) -> Result<()>;

    /// Append a message, update the conversation's last-message fields
    /// and bump the recipient's unread counter. Returns the updated
    /// conversation.
    async fn record_message(&self, message: Message) -> Result<Conversation>;

    /// Zero the reader's unread counter and flip the read flag on
    /// messages sent by the other party.
    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<()>;

    /// Conversations where `user_id` fills the given role field.
    async fn conversations_for(&self, role: Role, user_id: &str) -> Result<Vec<Conversation>>;

    /// Messages of one conversation, ordered by timestamp ascending.
    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn notification_prefs(&self, user_id: &str) -> Result<Option<NotificationPrefs>>;

    /// Push-style change feed. The delivering task is backend-defined;
    /// consumers must not assume any particular thread.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
