use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use soukify_chat::{ConversationSync, MemoryBackend, NewConversation, Session};
use soukify_notify::{NotificationSender, RelayConfig};
use soukify_sync::{
    FavoriteStore, LikeStore, LikeToggle, ProductInteractions, ProductObserver, ProductStateSync,
    ProductUpdate,
};
use soukify_types::{Role, UserProfile, unread_total};

/// In-memory like store standing in for the remote backend.
struct DemoLikeStore {
    liked_by: Mutex<HashMap<String, HashSet<String>>>,
}

impl DemoLikeStore {
    fn new() -> Self {
        Self {
            liked_by: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LikeStore for DemoLikeStore {
    async fn toggle_like(&self, user_id: &str, product_id: &str) -> Result<LikeToggle> {
        let mut liked_by = self
            .liked_by
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let users = liked_by.entry(product_id.to_string()).or_default();
        let liked = if users.contains(user_id) {
            users.remove(user_id);
            false
        } else {
            users.insert(user_id.to_string());
            true
        };
        Ok(LikeToggle {
            liked,
            count: users.len() as u32,
        })
    }
}

/// Observer playing the part of a product screen.
struct ScreenLogger {
    name: &'static str,
}

impl ProductObserver for ScreenLogger {
    fn on_product_update(&self, product_id: &str, update: ProductUpdate) {
        info!(screen = self.name, product_id, ?update, "screen refreshed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soukify=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("SOUKIFY_DB_PATH").unwrap_or_else(|_| "soukify.db".into());

    let db = Arc::new(soukify_db::Database::open(&PathBuf::from(&db_path))?);
    let sender = Arc::new(NotificationSender::new(RelayConfig::from_env()));

    let backend = Arc::new(MemoryBackend::new());
    backend
        .add_profile(UserProfile {
            id: "buyer-1".into(),
            full_name: "Amina".into(),
            profile_image: "https://img.example/amina.jpg".into(),
        })
        .await;
    backend
        .add_profile(UserProfile {
            id: "seller-1".into(),
            full_name: "Youssef".into(),
            profile_image: String::new(),
        })
        .await;

    // Two clients sharing one backend, one per signed-in user.
    let buyer = ConversationSync::new(
        backend.clone(),
        Arc::new(Session::signed_in("buyer-1")),
        sender.clone(),
    );
    let seller = ConversationSync::new(
        backend.clone(),
        Arc::new(Session::signed_in("seller-1")),
        sender,
    );

    let mut seller_feed = seller.subscribe_conversations(Role::Seller)?;
    let mut unread_feed = seller.subscribe_unread_total(Role::Seller)?;

    let conversation = buyer
        .get_or_create_conversation(NewConversation {
            shop_id: "shop-42".into(),
            shop_name: "Atlas Pottery".into(),
            shop_image: "https://img.example/atlas.jpg".into(),
            seller_id: "seller-1".into(),
        })
        .await?;
    info!(conversation = %conversation.id, "conversation opened");

    buyer
        .send_message(&conversation.id, "Is the tagine pot still available?")
        .await?;

    // Drain the feeds up to the send.
    while let Some(list) = seller_feed.recv().await {
        let list = list?;
        info!(
            conversations = list.len(),
            unread = unread_total(&list, Role::Seller),
            "seller inbox"
        );
        if unread_total(&list, Role::Seller) > 0 {
            break;
        }
    }
    while let Some(total) = unread_feed.recv().await {
        let total = total?;
        info!(total, "seller unread badge");
        if total > 0 {
            break;
        }
    }

    seller.mark_read(&conversation.id).await?;
    if let Some(total) = unread_feed.recv().await {
        info!(total = total?, "seller unread badge after read");
    }

    // Product state: likes and favorites shared across screens.
    let favorites: Arc<dyn FavoriteStore> = db.clone();
    let state = Arc::new(ProductStateSync::new(favorites.clone()));
    let detail: Arc<dyn ProductObserver> = Arc::new(ScreenLogger { name: "detail" });
    let feed_screen: Arc<dyn ProductObserver> = Arc::new(ScreenLogger { name: "feed" });
    state.register(&detail);
    state.register(&feed_screen);

    let interactions =
        ProductInteractions::new(Arc::new(DemoLikeStore::new()), favorites, state.clone());

    let like = interactions.toggle_like("buyer-1", "prod-7").await?;
    info!(liked = like.liked, count = like.count, "like toggled");

    let favorite = interactions.toggle_favorite("prod-7").await?;
    info!(favorite = favorite.favorite, "favorite toggled");
    info!(
        cached = state.favorite_state("prod-7").favorite,
        "favorite survives in cache"
    );

    info!("demo complete");
    Ok(())
}
