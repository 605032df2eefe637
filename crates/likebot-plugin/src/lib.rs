//! likebot-plugin: daily likes for subscribers.
//!
//! # Architecture
//!
//! ```text
//! platform events ──► LikePlugin::handle_message ──► LikeExecutor::like
//!                                                        │
//! RandomScheduler ─(once per cycle)─► like_random ───────┤
//!        │                                               ▼
//!        └─(cycle boundary)─► ledger.reset_all    SubscriptionLedger
//! ```

pub mod executor;
pub mod platform;
pub mod plugin;
pub mod utils;

#[cfg(test)]
mod testing;

pub use executor::{LikeExecutor, RANDOM_LIKE_BATCH};
pub use platform::{LikePlatform, PlatformError};
pub use plugin::LikePlugin;
