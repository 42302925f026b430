use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use soukify_notify::{Notification, NotificationKind, NotificationSink};
use soukify_types::{ChangeEvent, Conversation, Message, Role, SyncError, models};

use crate::backend::ChatBackend;
use crate::identity::Identity;

/// Display name used when a profile is missing or unreadable.
const DEFAULT_DISPLAY_NAME: &str = "User";

/// Everything needed to open a conversation with a shop's seller.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub shop_id: String,
    pub shop_name: String,
    pub shop_image: String,
    pub seller_id: String,
}

/// A live subscription. Each item is either a fresh snapshot or a
/// terminal error; the stream ends after an error or cancellation.
/// Dropping the feed cancels the underlying task.
pub struct Feed<T> {
    rx: mpsc::UnboundedReceiver<Result<T, SyncError>>,
    abort: AbortHandle,
}

pub type ConversationFeed = Feed<Vec<Conversation>>;
pub type MessageFeed = Feed<Vec<Message>>;
pub type UnreadFeed = Feed<u32>;

impl<T> Feed<T> {
    pub async fn recv(&mut self) -> Option<Result<T, SyncError>> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FeedKey {
    Conversations(Role, String),
    Messages(String),
    Unread(Role, String),
}

/// Real-time mirror of conversations and messages for the signed-in user.
///
/// Holds no durable state of its own; the backend is authoritative and
/// this layer only reshapes its snapshots and change feed for the UI.
pub struct ConversationSync<B: ChatBackend> {
    backend: Arc<B>,
    identity: Arc<dyn Identity>,
    sink: Arc<dyn NotificationSink>,
    feeds: Mutex<HashMap<FeedKey, AbortHandle>>,
}

impl<B: ChatBackend> ConversationSync<B> {
    pub fn new(backend: Arc<B>, identity: Arc<dyn Identity>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            backend,
            identity,
            sink,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    fn user_id(&self) -> Result<String, SyncError> {
        self.identity.current_user_id().ok_or(SyncError::NotSignedIn)
    }

    /// Replace any previous feed for the same key so resubscription never
    /// double-delivers.
    fn install_feed(&self, key: FeedKey, abort: AbortHandle) {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = feeds.insert(key, abort) {
            previous.abort();
        }
    }

    /// Live, role-filtered conversation list for the signed-in user,
    /// newest last message first. Re-delivered in full on every change.
    pub fn subscribe_conversations(&self, role: Role) -> Result<ConversationFeed, SyncError> {
        let user_id = self.user_id()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let changes = backend.changes();
        let uid = user_id.clone();

        let handle = tokio::spawn(async move {
            conversation_feed_task(backend, changes, role, uid, tx).await;
        });
        let abort = handle.abort_handle();
        self.install_feed(FeedKey::Conversations(role, user_id), abort.clone());

        Ok(Feed { rx, abort })
    }

    /// Live message list for one open conversation, timestamp ascending.
    pub fn subscribe_messages(&self, conversation_id: &str) -> Result<MessageFeed, SyncError> {
        if conversation_id.is_empty() {
            return Err(SyncError::MissingField("conversation_id"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let changes = backend.changes();
        let id = conversation_id.to_string();

        let handle = tokio::spawn(async move {
            message_feed_task(backend, changes, id, tx).await;
        });
        let abort = handle.abort_handle();
        self.install_feed(FeedKey::Messages(conversation_id.to_string()), abort.clone());

        Ok(Feed { rx, abort })
    }

    /// Live sum of the signed-in user's unread counters for one role.
    /// Only distinct values are delivered.
    pub fn subscribe_unread_total(&self, role: Role) -> Result<UnreadFeed, SyncError> {
        let user_id = self.user_id()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let changes = backend.changes();
        let uid = user_id.clone();

        let handle = tokio::spawn(async move {
            unread_feed_task(backend, changes, role, uid, tx).await;
        });
        let abort = handle.abort_handle();
        self.install_feed(FeedKey::Unread(role, user_id), abort.clone());

        Ok(Feed { rx, abort })
    }

    /// Look up or create the conversation between the signed-in buyer and
    /// a shop. The deterministic key makes concurrent calls converge on
    /// one document. An existing conversation with a missing buyer image
    /// gets repaired from the profile.
    pub async fn get_or_create_conversation(
        &self,
        request: NewConversation,
    ) -> Result<Conversation, SyncError> {
        let buyer_id = self.user_id()?;
        if request.shop_id.is_empty() {
            return Err(SyncError::MissingField("shop_id"));
        }
        if request.seller_id.is_empty() {
            return Err(SyncError::MissingField("seller_id"));
        }

        let conversation_id = Conversation::key(&buyer_id, &request.shop_id);

        if let Some(mut existing) = self.backend.get_conversation(&conversation_id).await? {
            if existing.buyer_image.is_empty() {
                let (_, image) = self.display_info(&buyer_id).await;
                if !image.is_empty() {
                    self.backend
                        .update_buyer_image(&conversation_id, &image)
                        .await?;
                    existing.buyer_image = image;
                }
            }
            return Ok(existing);
        }

        let (buyer_name, buyer_image) = self.display_info(&buyer_id).await;
        let conversation = Conversation {
            id: conversation_id,
            buyer_id,
            buyer_name,
            buyer_image,
            seller_id: request.seller_id,
            shop_id: request.shop_id,
            shop_name: request.shop_name,
            shop_image: request.shop_image,
            last_message: String::new(),
            last_message_timestamp: Utc::now().timestamp_millis(),
            unread_count_buyer: 0,
            unread_count_seller: 0,
            created_at: Utc::now(),
        };

        Ok(self.backend.create_if_absent(conversation).await?)
    }

    /// Send a message as the signed-in user. Blank text is rejected
    /// before touching the backend. The push notification to the
    /// recipient is fire-and-forget; its failure never rolls back the
    /// send.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Message, SyncError> {
        let sender_id = self.user_id()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        if conversation_id.is_empty() {
            return Err(SyncError::MissingField("conversation_id"));
        }

        let (sender_name, _) = self.display_info(&sender_id).await;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.clone(),
            sender_name,
            text: text.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            read: false,
        };

        let conversation = self.backend.record_message(message.clone()).await?;
        self.notify_recipient(&conversation, &sender_id, &message);
        Ok(message)
    }

    /// Zero the signed-in user's unread counter for a conversation.
    /// Idempotent: marking an already-read conversation is a no-op.
    pub async fn mark_read(&self, conversation_id: &str) -> Result<(), SyncError> {
        let reader_id = self.user_id()?;
        if conversation_id.is_empty() {
            return Err(SyncError::MissingField("conversation_id"));
        }
        self.backend.mark_read(conversation_id, &reader_id).await?;
        Ok(())
    }

    async fn display_info(&self, user_id: &str) -> (String, String) {
        match self.backend.profile(user_id).await {
            Ok(Some(profile)) => {
                let name = if profile.full_name.is_empty() {
                    DEFAULT_DISPLAY_NAME.to_string()
                } else {
                    profile.full_name
                };
                (name, profile.profile_image)
            }
            Ok(None) => (DEFAULT_DISPLAY_NAME.to_string(), String::new()),
            Err(e) => {
                warn!(user_id, "profile lookup failed, using defaults: {e}");
                (DEFAULT_DISPLAY_NAME.to_string(), String::new())
            }
        }
    }

    fn notify_recipient(&self, conversation: &Conversation, sender_id: &str, message: &Message) {
        let Some(sender_role) = conversation.role_of(sender_id) else {
            warn!(
                conversation_id = %conversation.id,
                sender_id, "sender is not a participant, skipping notification"
            );
            return;
        };
        let recipient = conversation.participant(sender_role.other()).to_string();
        let notification = Notification::message(
            &recipient,
            &message.sender_name,
            &message.text,
            &message.conversation_id,
        );

        let backend = self.backend.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let allowed = match backend.notification_prefs(&recipient).await {
                Ok(Some(prefs)) => prefs.allows_now(NotificationKind::Message),
                Ok(None) => true,
                Err(e) => {
                    warn!(recipient = %recipient, "preference check failed, sending anyway: {e}");
                    true
                }
            };

            if allowed {
                sink.dispatch(notification);
            } else {
                debug!(recipient = %recipient, "message notifications muted by preferences");
            }
        });
    }
}

async fn conversation_feed_task<B: ChatBackend>(
    backend: Arc<B>,
    mut changes: broadcast::Receiver<ChangeEvent>,
    role: Role,
    user_id: String,
    tx: mpsc::UnboundedSender<Result<Vec<Conversation>, SyncError>>,
) {
    if !push_conversations(&backend, role, &user_id, &tx).await {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(ChangeEvent::ConversationUpsert { conversation })
                if conversation.participant(role) == user_id =>
            {
                if !push_conversations(&backend, role, &user_id, &tx).await {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "conversation feed lagged, refreshing snapshot");
                if !push_conversations(&backend, role, &user_id, &tx).await {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Returns false when the feed should stop (consumer gone or backend
/// failed). A backend failure is delivered as a terminal error item; the
/// consumer keeps whatever list it last received.
async fn push_conversations<B: ChatBackend>(
    backend: &Arc<B>,
    role: Role,
    user_id: &str,
    tx: &mpsc::UnboundedSender<Result<Vec<Conversation>, SyncError>>,
) -> bool {
    match backend.conversations_for(role, user_id).await {
        Ok(mut conversations) => {
            conversations.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
            tx.send(Ok(conversations)).is_ok()
        }
        Err(e) => {
            let _ = tx.send(Err(SyncError::from(e)));
            false
        }
    }
}

async fn message_feed_task<B: ChatBackend>(
    backend: Arc<B>,
    mut changes: broadcast::Receiver<ChangeEvent>,
    conversation_id: String,
    tx: mpsc::UnboundedSender<Result<Vec<Message>, SyncError>>,
) {
    if !push_messages(&backend, &conversation_id, &tx).await {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(event) if touches_messages(&event, &conversation_id) => {
                if !push_messages(&backend, &conversation_id, &tx).await {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "message feed lagged, refreshing snapshot");
                if !push_messages(&backend, &conversation_id, &tx).await {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Message lists change on appends and read-flag flips; conversation
/// metadata updates alone do not touch them.
fn touches_messages(event: &ChangeEvent, conversation_id: &str) -> bool {
    !event.touches_conversation() && event.conversation_id() == conversation_id
}

async fn push_messages<B: ChatBackend>(
    backend: &Arc<B>,
    conversation_id: &str,
    tx: &mpsc::UnboundedSender<Result<Vec<Message>, SyncError>>,
) -> bool {
    match backend.messages_for(conversation_id).await {
        Ok(mut messages) => {
            messages.sort_by_key(|m| m.timestamp);
            tx.send(Ok(messages)).is_ok()
        }
        Err(e) => {
            let _ = tx.send(Err(SyncError::from(e)));
            false
        }
    }
}

async fn unread_feed_task<B: ChatBackend>(
    backend: Arc<B>,
    mut changes: broadcast::Receiver<ChangeEvent>,
    role: Role,
    user_id: String,
    tx: mpsc::UnboundedSender<Result<u32, SyncError>>,
) {
    let mut last_total = None;
    if !push_unread(&backend, role, &user_id, &tx, &mut last_total).await {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(ChangeEvent::ConversationUpsert { conversation })
                if conversation.participant(role) == user_id =>
            {
                if !push_unread(&backend, role, &user_id, &tx, &mut last_total).await {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "unread feed lagged, refreshing snapshot");
                if !push_unread(&backend, role, &user_id, &tx, &mut last_total).await {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn push_unread<B: ChatBackend>(
    backend: &Arc<B>,
    role: Role,
    user_id: &str,
    tx: &mpsc::UnboundedSender<Result<u32, SyncError>>,
    last_total: &mut Option<u32>,
) -> bool {
    match backend.conversations_for(role, user_id).await {
        Ok(conversations) => {
            let total = models::unread_total(&conversations, role);
            if *last_total == Some(total) {
                return true;
            }
            *last_total = Some(total);
            tx.send(Ok(total)).is_ok()
        }
        Err(e) => {
            let _ = tx.send(Err(SyncError::from(e)));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Session;
    use crate::memory::MemoryBackend;
    use soukify_types::UserProfile;
    use std::sync::Mutex as StdMutex;

    struct NullSink;

    impl NotificationSink for NullSink {
        fn dispatch(&self, _notification: Notification) {}
    }

    struct RecordingSink {
        sent: StdMutex<Vec<Notification>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn dispatch(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    fn request() -> NewConversation {
        NewConversation {
            shop_id: "shop-42".into(),
            shop_name: "Atlas Pottery".into(),
            shop_image: "https://img.example/atlas.jpg".into(),
            seller_id: "seller-1".into(),
        }
    }

    fn sync_for(
        backend: Arc<MemoryBackend>,
        user_id: &str,
    ) -> ConversationSync<MemoryBackend> {
        ConversationSync::new(
            backend,
            Arc::new(Session::signed_in(user_id)),
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn operations_require_a_signed_in_user() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = ConversationSync::new(backend, Arc::new(Session::new()), Arc::new(NullSink));

        let err = sync.get_or_create_conversation(request()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotSignedIn));

        let err = sync.send_message("c1", "hello").await.unwrap_err();
        assert!(matches!(err, SyncError::NotSignedIn));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = sync_for(backend.clone(), "buyer-1");

        let first = sync.get_or_create_conversation(request()).await.unwrap();
        let second = sync.get_or_create_conversation(request()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.unread_count_buyer, 0);
        assert_eq!(first.unread_count_seller, 0);
        assert_eq!(first.last_message, "");

        let buyer_side = backend
            .conversations_for(Role::Buyer, "buyer-1")
            .await
            .unwrap();
        assert_eq!(buyer_side.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_do_not_duplicate() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = Arc::new(sync_for(backend.clone(), "buyer-1"));

        let a = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.get_or_create_conversation(request()).await })
        };
        let b = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.get_or_create_conversation(request()).await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.id, b.id);

        let buyer_side = backend
            .conversations_for(Role::Buyer, "buyer-1")
            .await
            .unwrap();
        assert_eq!(buyer_side.len(), 1);
    }

    #[tokio::test]
    async fn missing_profile_falls_back_to_default_name() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = sync_for(backend, "buyer-1");

        let conversation = sync.get_or_create_conversation(request()).await.unwrap();
        assert_eq!(conversation.buyer_name, DEFAULT_DISPLAY_NAME);
    }

    #[tokio::test]
    async fn existing_conversation_gets_buyer_image_repaired() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = sync_for(backend.clone(), "buyer-1");

        // Created before the buyer had a profile image.
        let created = sync.get_or_create_conversation(request()).await.unwrap();
        assert_eq!(created.buyer_image, "");

        backend
            .add_profile(UserProfile {
                id: "buyer-1".into(),
                full_name: "Amina".into(),
                profile_image: "https://img.example/amina.jpg".into(),
            })
            .await;

        let repaired = sync.get_or_create_conversation(request()).await.unwrap();
        assert_eq!(repaired.buyer_image, "https://img.example/amina.jpg");

        let stored = backend.get_conversation(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.buyer_image, "https://img.example/amina.jpg");
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_state_change() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = sync_for(backend.clone(), "buyer-1");
        let conversation = sync.get_or_create_conversation(request()).await.unwrap();

        for text in ["", "   ", "\n\t"] {
            let err = sync.send_message(&conversation.id, text).await.unwrap_err();
            assert!(matches!(err, SyncError::EmptyMessage), "text {text:?}");
        }

        assert!(backend.messages_for(&conversation.id).await.unwrap().is_empty());
        let stored = backend
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.unread_count_seller, 0);
        assert_eq!(stored.last_message, "");
    }

    #[tokio::test]
    async fn send_message_trims_and_bumps_recipient_unread() {
        let backend = Arc::new(MemoryBackend::new());
        let sync = sync_for(backend.clone(), "buyer-1");
        let conversation = sync.get_or_create_conversation(request()).await.unwrap();

        let message = sync
            .send_message(&conversation.id, "  Is this available?  ")
            .await
            .unwrap();
        assert_eq!(message.text, "Is this available?");
        assert!(!message.read);

        let stored = backend
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_message, "Is this available?");
        assert_eq!(stored.unread_count_seller, 1);
        assert_eq!(stored.unread_count_buyer, 0);
    }

    #[tokio::test]
    async fn notification_goes_to_the_counterpart() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .add_profile(UserProfile {
                id: "buyer-1".into(),
                full_name: "Amina".into(),
                profile_image: String::new(),
            })
            .await;
        let sink = RecordingSink::new();
        let sync = ConversationSync::new(
            backend.clone(),
            Arc::new(Session::signed_in("buyer-1")),
            sink.clone(),
        );

        let conversation = sync.get_or_create_conversation(request()).await.unwrap();
        sync.send_message(&conversation.id, "Is this available?")
            .await
            .unwrap();

        let sent = wait_for_dispatch(&sink, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "seller-1");
        assert_eq!(sent[0].title, "New message from Amina");
        assert_eq!(sent[0].conversation_id.as_deref(), Some(conversation.id.as_str()));
    }

    #[tokio::test]
    async fn muted_recipient_gets_no_notification() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set_prefs(
                "seller-1",
                soukify_notify::NotificationPrefs {
                    push: false,
                    ..Default::default()
                },
            )
            .await;
        let sink = RecordingSink::new();
        let sync = ConversationSync::new(
            backend,
            Arc::new(Session::signed_in("buyer-1")),
            sink.clone(),
        );

        let conversation = sync.get_or_create_conversation(request()).await.unwrap();
        sync.send_message(&conversation.id, "hello").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn mark_read_zeroes_reader_counter_and_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let buyer = sync_for(backend.clone(), "buyer-1");
        let conversation = buyer.get_or_create_conversation(request()).await.unwrap();
        buyer.send_message(&conversation.id, "ping").await.unwrap();
        buyer.send_message(&conversation.id, "pong").await.unwrap();

        let seller = sync_for(backend.clone(), "seller-1");
        seller.mark_read(&conversation.id).await.unwrap();
        seller.mark_read(&conversation.id).await.unwrap();

        let stored = backend
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.unread_count_seller, 0);

        let messages = backend.messages_for(&conversation.id).await.unwrap();
        assert!(messages.iter().all(|m| m.read));
    }

    async fn wait_for_dispatch(sink: &Arc<RecordingSink>, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = sink.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        sink.sent()
    }
}
