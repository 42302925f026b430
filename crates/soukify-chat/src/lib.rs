pub mod backend;
pub mod identity;
pub mod memory;
pub mod sync;

pub use backend::ChatBackend;
pub use identity::{Identity, Session};
pub use memory::MemoryBackend;
pub use sync::{ConversationFeed, ConversationSync, MessageFeed, NewConversation, UnreadFeed};
