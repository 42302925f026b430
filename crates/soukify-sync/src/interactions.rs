use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::state::{FavoriteState, FavoriteStore, LikeState, ProductStateSync};

/// Result of an authoritative like toggle: the caller's new flag and the
/// product's aggregate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub count: u32,
}

/// The remote store holding per-user like flags and aggregate counts.
/// Toggles must be transactional so the flag and the count move together.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn toggle_like(&self, user_id: &str, product_id: &str) -> Result<LikeToggle>;
}

/// Write path for like/favorite toggles: the authoritative store is
/// updated first, the in-memory cache and its observers only after the
/// write succeeded. A failed write leaves the cache untouched.
pub struct ProductInteractions<S: LikeStore> {
    likes: Arc<S>,
    favorites: Arc<dyn FavoriteStore>,
    state: Arc<ProductStateSync>,
}

impl<S: LikeStore> ProductInteractions<S> {
    pub fn new(likes: Arc<S>, favorites: Arc<dyn FavoriteStore>, state: Arc<ProductStateSync>) -> Self {
        Self {
            likes,
            favorites,
            state,
        }
    }

    pub async fn toggle_like(&self, user_id: &str, product_id: &str) -> Result<LikeState> {
        let toggle = self.likes.toggle_like(user_id, product_id).await?;
        self.state
            .update_like(product_id, toggle.liked, toggle.count);
        debug!(product_id, liked = toggle.liked, count = toggle.count, "like toggled");
        Ok(LikeState {
            liked: toggle.liked,
            count: toggle.count,
        })
    }

    pub async fn toggle_favorite(&self, product_id: &str) -> Result<FavoriteState> {
        let next = !self.state.favorite_state(product_id).favorite;

        // rusqlite is blocking; keep it off the async runtime.
        let store = self.favorites.clone();
        let id = product_id.to_string();
        tokio::task::spawn_blocking(move || store.set_favorite(&id, next)).await??;

        self.state.update_favorite(product_id, next);
        debug!(product_id, favorite = next, "favorite toggled");
        Ok(FavoriteState { favorite: next })
    }
}
