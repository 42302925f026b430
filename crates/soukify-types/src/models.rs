use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a conversation a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Buyer => Role::Seller,
            Role::Seller => Role::Buyer,
        }
    }
}

/// A persistent thread between one buyer and one seller about one shop.
///
/// The id is deterministic per (buyer, shop) pair so concurrent creates
/// collapse onto the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub buyer_id: String,
    pub buyer_name: String,
    pub buyer_image: String,
    pub seller_id: String,
    pub shop_id: String,
    pub shop_name: String,
    pub shop_image: String,
    pub last_message: String,
    /// Epoch milliseconds of the last message; drives list ordering.
    pub last_message_timestamp: i64,
    pub unread_count_buyer: u32,
    pub unread_count_seller: u32,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Deterministic conversation key for a (buyer, shop) pair.
    pub fn key(buyer_id: &str, shop_id: &str) -> String {
        format!("conv_{buyer_id}_{shop_id}")
    }

    /// The role `user_id` plays in this conversation, if any.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if user_id == self.buyer_id {
            Some(Role::Buyer)
        } else if user_id == self.seller_id {
            Some(Role::Seller)
        } else {
            None
        }
    }

    pub fn participant(&self, role: Role) -> &str {
        match role {
            Role::Buyer => &self.buyer_id,
            Role::Seller => &self.seller_id,
        }
    }

    pub fn unread_for(&self, role: Role) -> u32 {
        match role {
            Role::Buyer => self.unread_count_buyer,
            Role::Seller => self.unread_count_seller,
        }
    }

    pub fn set_unread(&mut self, role: Role, count: u32) {
        match role {
            Role::Buyer => self.unread_count_buyer = count,
            Role::Seller => self.unread_count_seller = count,
        }
    }

    pub fn bump_unread(&mut self, role: Role) {
        self.set_unread(role, self.unread_for(role) + 1);
    }
}

/// One chat message. Immutable after creation except for `read`,
/// which flips false -> true exactly once when the recipient reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Epoch milliseconds; message lists are ordered ascending by this.
    pub timestamp: i64,
    pub read: bool,
}

/// Public profile fields the sync layer needs from the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub full_name: String,
    pub profile_image: String,
}

/// What one participant sees in their conversation list.
///
/// Computed from `(conversation, viewer)` so the buyer/seller symmetry
/// holds by construction: a buyer sees the shop, a seller sees the buyer,
/// and each sees only their own unread counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub role: Role,
    pub title: String,
    pub image: String,
    pub last_message: String,
    pub last_message_timestamp: i64,
    pub unread: u32,
}

impl ConversationView {
    /// Project a conversation for the given viewer. `None` if the viewer
    /// is not a participant.
    pub fn for_viewer(conversation: &Conversation, viewer_id: &str) -> Option<Self> {
        let role = conversation.role_of(viewer_id)?;
        let (title, image) = match role {
            Role::Buyer => (conversation.shop_name.clone(), conversation.shop_image.clone()),
            Role::Seller => (conversation.buyer_name.clone(), conversation.buyer_image.clone()),
        };
        Some(Self {
            conversation_id: conversation.id.clone(),
            role,
            title,
            image,
            last_message: conversation.last_message.clone(),
            last_message_timestamp: conversation.last_message_timestamp,
            unread: conversation.unread_for(role),
        })
    }
}

/// Sum of unread counters for one role across a conversation list.
pub fn unread_total(conversations: &[Conversation], role: Role) -> u32 {
    conversations.iter().map(|c| c.unread_for(role)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            id: Conversation::key("buyer-1", "shop-42"),
            buyer_id: "buyer-1".into(),
            buyer_name: "Amina".into(),
            buyer_image: "https://img.example/amina.jpg".into(),
            seller_id: "seller-1".into(),
            shop_id: "shop-42".into(),
            shop_name: "Atlas Pottery".into(),
            shop_image: "https://img.example/atlas.jpg".into(),
            last_message: "Is this available?".into(),
            last_message_timestamp: 1_700_000_000_000,
            unread_count_buyer: 0,
            unread_count_seller: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(
            Conversation::key("buyer-1", "shop-42"),
            "conv_buyer-1_shop-42"
        );
    }

    #[test]
    fn projection_is_role_symmetric() {
        let conv = conversation();

        let buyer_view = ConversationView::for_viewer(&conv, "buyer-1").unwrap();
        assert_eq!(buyer_view.role, Role::Buyer);
        assert_eq!(buyer_view.title, "Atlas Pottery");
        assert_eq!(buyer_view.unread, 0);

        let seller_view = ConversationView::for_viewer(&conv, "seller-1").unwrap();
        assert_eq!(seller_view.role, Role::Seller);
        assert_eq!(seller_view.title, "Amina");
        assert_eq!(seller_view.unread, 3);

        assert!(ConversationView::for_viewer(&conv, "stranger").is_none());
    }

    #[test]
    fn unread_totals_per_role() {
        let mut a = conversation();
        let mut b = conversation();
        b.id = Conversation::key("buyer-1", "shop-7");
        a.unread_count_buyer = 2;
        b.unread_count_buyer = 1;
        b.unread_count_seller = 5;

        let all = vec![a, b];
        assert_eq!(unread_total(&all, Role::Buyer), 3);
        assert_eq!(unread_total(&all, Role::Seller), 8);
    }
}
