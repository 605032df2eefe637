//! Like execution: single likes and the daily random batch.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use likebot_storage::SubscriptionLedger;
use likebot_types::{LikeOutcome, ProfileLikeInfo};

use crate::platform::LikePlatform;

/// Most subscribers liked by one random batch.
pub const RANDOM_LIKE_BATCH: usize = 20;

pub struct LikeExecutor {
    platform: Arc<dyn LikePlatform>,
    ledger: Arc<SubscriptionLedger>,
    per_like_times: u32,
}

impl LikeExecutor {
    pub fn new(
        platform: Arc<dyn LikePlatform>,
        ledger: Arc<SubscriptionLedger>,
        per_like_times: u32,
    ) -> Self {
        Self {
            platform,
            ledger,
            per_like_times,
        }
    }

    pub fn per_like_times(&self) -> u32 {
        self.per_like_times
    }

    /// Like `user_id` once with the configured quota.
    ///
    /// Platform refusals come back as a failed [`LikeOutcome`], never as an error.
    pub async fn like(&self, user_id: &str) -> LikeOutcome {
        let times = self.per_like_times;
        match self.platform.send_like(user_id, times).await {
            Ok(()) => {
                if let Err(e) = self.ledger.increase(user_id, u64::from(times)) {
                    warn!(user_id, "Like applied but ledger update failed: {e}");
                }
                LikeOutcome::applied(times)
            }
            Err(e) => {
                error!(user_id, "Like failed: {e}");
                LikeOutcome::refused(e.to_string())
            }
        }
    }

    /// Like up to [`RANDOM_LIKE_BATCH`] random subscribers, one after another.
    ///
    /// Returns how many likes succeeded.
    pub async fn like_random(&self) -> usize {
        let users = self.ledger.all_user_ids();
        if users.is_empty() {
            return 0;
        }

        let picked: Vec<String> = {
            let mut rng = rand::thread_rng();
            users
                .choose_multiple(&mut rng, RANDOM_LIKE_BATCH.min(users.len()))
                .cloned()
                .collect()
        };

        let mut liked = 0;
        for user_id in &picked {
            if self.like(user_id).await.success {
                liked += 1;
            }
        }
        info!(picked = picked.len(), liked, "Random like batch finished");
        liked
    }

    /// Render who liked the bot, one line per user.
    pub async fn get_self_like_info(&self) -> anyhow::Result<String> {
        let info = self.platform.get_self_like_info().await?;
        Ok(format_like_info(&info))
    }
}

fn format_like_info(info: &ProfileLikeInfo) -> String {
    let lines: Vec<String> = info
        .favorite_info
        .user_infos
        .iter()
        .filter(|u| u.count > 0)
        .filter_map(|u| {
            let nick = u.nick.as_deref().filter(|n| !n.is_empty())?;
            Some(format!("【{nick}】赞了我{}次", u.count))
        })
        .collect();

    if lines.is_empty() {
        "暂无有效的点赞信息".to_string()
    } else {
        lines.join("\n")
    }
}
