pub mod interactions;
pub mod state;

pub use interactions::{LikeStore, LikeToggle, ProductInteractions};
pub use state::{FavoriteState, FavoriteStore, LikeState, ProductObserver, ProductStateSync, ProductUpdate};
