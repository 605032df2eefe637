//! The chat platform as seen by the plugin.
//!
//! Implementations live in their own crates (see `likebot-onebot`) and only
//! need to map these calls onto the platform's API.

use async_trait::async_trait;

use likebot_types::{ProfileLikeInfo, ReplyTarget, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform processed the call and refused it.
    #[error("{message}")]
    Rejected {
        retcode: Option<i64>,
        message: String,
    },
    /// The call did not reach the platform or the reply was unreadable.
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Trait for chat platforms that can deliver likes.
///
/// Profile lookups report "no data" as `None`; implementations must not
/// turn a missing profile into an error.
#[async_trait]
pub trait LikePlatform: Send + Sync {
    /// Give `user_id` `times` like units.
    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), PlatformError>;

    /// Account ids of the bot's friends.
    async fn get_friend_list(&self) -> anyhow::Result<Vec<String>>;

    async fn get_group_member_profile(&self, group_id: &str, user_id: &str)
        -> Option<UserProfile>;

    async fn get_stranger_profile(&self, user_id: &str) -> Option<UserProfile>;

    /// Likes the bot account itself has received.
    async fn get_self_like_info(&self) -> anyhow::Result<ProfileLikeInfo>;

    async fn send_text(&self, target: &ReplyTarget, text: &str) -> anyhow::Result<()>;
}
