pub mod error;
pub mod events;
pub mod models;

pub use error::SyncError;
pub use events::ChangeEvent;
pub use models::{Conversation, ConversationView, Message, Role, UserProfile, unread_total};
