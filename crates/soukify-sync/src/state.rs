use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cached like state for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: u32,
}

/// Cached favorite state for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteState {
    pub favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductUpdate {
    Like(LikeState),
    Favorite(FavoriteState),
}

/// A screen currently showing a product. Held weakly by the cache so a
/// destroyed screen neither leaks nor receives stale callbacks.
pub trait ProductObserver: Send + Sync {
    fn on_product_update(&self, product_id: &str, update: ProductUpdate);
}

/// The local persistent store backing favorite read-through.
pub trait FavoriteStore: Send + Sync {
    fn is_favorite(&self, product_id: &str) -> Result<bool>;
    fn set_favorite(&self, product_id: &str, favorite: bool) -> Result<()>;
}

impl FavoriteStore for soukify_db::Database {
    fn is_favorite(&self, product_id: &str) -> Result<bool> {
        soukify_db::Database::is_favorite(self, product_id)
    }

    fn set_favorite(&self, product_id: &str, favorite: bool) -> Result<()> {
        soukify_db::Database::set_favorite(self, product_id, favorite)
    }
}

/// Process-wide source of truth for "is this product liked/favorited
/// right now", shared by every screen showing the product.
///
/// All operations are synchronous and in-memory; observers are notified
/// before an update call returns, so a screen that writes and then
/// re-reads its own bound view sees the new value. Safe to call from any
/// thread.
pub struct ProductStateSync {
    likes: RwLock<HashMap<String, LikeState>>,
    favorites: RwLock<HashMap<String, FavoriteState>>,
    observers: Mutex<Vec<Weak<dyn ProductObserver>>>,
    store: Arc<dyn FavoriteStore>,
}

impl ProductStateSync {
    pub fn new(store: Arc<dyn FavoriteStore>) -> Self {
        Self {
            likes: RwLock::new(HashMap::new()),
            favorites: RwLock::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            store,
        }
    }

    /// Pure cache read; never touches the backend.
    pub fn like_state(&self, product_id: &str) -> Option<LikeState> {
        self.likes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(product_id)
            .copied()
    }

    /// Overwrite and notify every live observer before returning.
    /// Last write wins under concurrent calls.
    pub fn update_like(&self, product_id: &str, liked: bool, count: u32) {
        let state = LikeState { liked, count };
        self.likes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(product_id.to_string(), state);
        self.notify(product_id, ProductUpdate::Like(state));
    }

    /// Read-through: a cache miss queries the local store once and caches
    /// the answer. An unreachable store degrades to "not favorited"
    /// without caching, so a later read can retry.
    pub fn favorite_state(&self, product_id: &str) -> FavoriteState {
        if let Some(state) = self
            .favorites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(product_id)
        {
            return *state;
        }

        match self.store.is_favorite(product_id) {
            Ok(favorite) => {
                let state = FavoriteState { favorite };
                self.favorites
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(product_id.to_string(), state);
                state
            }
            Err(e) => {
                warn!(product_id, "favorite read-through failed: {e}");
                FavoriteState { favorite: false }
            }
        }
    }

    pub fn update_favorite(&self, product_id: &str, favorite: bool) {
        let state = FavoriteState { favorite };
        self.favorites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(product_id.to_string(), state);
        self.notify(product_id, ProductUpdate::Favorite(state));
    }

    pub fn register(&self, observer: &Arc<dyn ProductObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(observer));
    }

    pub fn unregister(&self, observer: &Arc<dyn ProductObserver>) {
        let target = Arc::downgrade(observer);
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|w| w.strong_count() > 0 && !Weak::ptr_eq(w, &target));
    }

    /// Wipe all cached state. Used on logout; registrations survive.
    pub fn clear(&self) {
        self.likes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.favorites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn notify(&self, product_id: &str, update: ProductUpdate) {
        // Upgrade under the lock, call outside it: a callback may
        // re-enter register/unregister.
        let live: Vec<Arc<dyn ProductObserver>> = {
            let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        for observer in live {
            observer.on_product_update(product_id, update);
        }
    }
}
