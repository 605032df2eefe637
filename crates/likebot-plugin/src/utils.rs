//! Lookups shared by the command handlers.

use tracing::warn;

use likebot_types::IncomingMessage;

use crate::platform::LikePlatform;

/// Ids the message targets: mention segments other than the bot, then
/// `@<digits>` tokens typed as plain text.
pub fn get_ats(msg: &IncomingMessage) -> Vec<String> {
    let mut ats: Vec<String> = msg
        .mentions
        .iter()
        .filter(|id| **id != msg.self_id)
        .cloned()
        .collect();

    for arg in msg.text.split_whitespace() {
        if let Some(id) = arg.strip_prefix('@') {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                ats.push(id.to_string());
            }
        }
    }
    ats
}

/// Whether `user_id` is on the bot's friend list. Lookup failures count as "no".
pub async fn is_friend(platform: &dyn LikePlatform, user_id: &str) -> bool {
    match platform.get_friend_list().await {
        Ok(friends) => friends.iter().any(|f| f == user_id),
        Err(e) => {
            warn!(user_id, "Friend list lookup failed: {e:#}");
            false
        }
    }
}

/// Group card or nickname of `user_id`, falling back to the stranger profile
/// and finally to the id itself.
pub async fn get_nickname(
    platform: &dyn LikePlatform,
    group_id: Option<&str>,
    user_id: &str,
) -> String {
    if let Some(group_id) = group_id.filter(|g| g.chars().all(|c| c.is_ascii_digit())) {
        if let Some(name) = platform
            .get_group_member_profile(group_id, user_id)
            .await
            .as_ref()
            .and_then(|p| p.display_name())
        {
            return name.to_string();
        }
    }

    platform
        .get_stranger_profile(user_id)
        .await
        .as_ref()
        .and_then(|p| p.display_name())
        .map(str::to_string)
        .unwrap_or_else(|| user_id.to_string())
}
