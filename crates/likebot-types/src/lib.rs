use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

// ──────────────────── Subscription Types ────────────────────

/// A subscribed user and the likes it received in the current cycle.
///
/// Persisted as a single-entry object, `{"<user_id>": <like_count>}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub like_count: u64,
}

impl SubscriptionRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            like_count: 0,
        }
    }
}

impl Serialize for SubscriptionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.user_id, &self.like_count)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for SubscriptionRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = SubscriptionRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a single-entry object {\"user_id\": count}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: BTreeMap<String, u64> = BTreeMap::new();
                while let Some((k, v)) = access.next_entry::<String, u64>()? {
                    entries.insert(k, v);
                }
                if entries.len() != 1 {
                    return Err(de::Error::invalid_length(entries.len(), &self));
                }
                let (user_id, like_count) = entries.into_iter().next().ok_or_else(|| {
                    de::Error::custom("subscription record has no entry")
                })?;
                Ok(SubscriptionRecord {
                    user_id,
                    like_count,
                })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

// ──────────────────── Like Types ────────────────────

/// Why a like call was refused by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeFailureKind {
    /// The daily like limit for this target has been reached.
    DailyLimit,
    /// The target's privacy settings forbid likes from the bot.
    PermissionDenied,
    /// The target is not on the bot's friend list.
    NotFriend,
    Other,
}

impl LikeFailureKind {
    /// Classify a platform reason string.
    ///
    /// OneBot implementations report refusals as free text with a non-specific
    /// retcode, so the wording is the only signal available.
    pub fn classify(reason: &str) -> Self {
        if reason.contains("已达") || reason.contains("上限") {
            Self::DailyLimit
        } else if reason.contains("权限") {
            Self::PermissionDenied
        } else if reason.contains("好友") {
            Self::NotFriend
        } else {
            Self::Other
        }
    }
}

/// Result of a single like call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub success: bool,
    /// Like units applied; zero on failure.
    pub times_applied: u32,
    /// Human-readable result or platform reason.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<LikeFailureKind>,
}

impl LikeOutcome {
    pub fn applied(times: u32) -> Self {
        Self {
            success: true,
            times_applied: times,
            message: "点赞成功".to_string(),
            failure: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        let message = reason.into();
        let kind = LikeFailureKind::classify(&message);
        Self {
            success: false,
            times_applied: 0,
            message,
            failure: Some(kind),
        }
    }
}

// ──────────────────── Platform Types ────────────────────

/// A chat message delivered to the plugin by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// The bot's own account id.
    pub self_id: String,
    /// Group the message was posted in; `None` for private chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Plain text with mention segments stripped.
    pub text: String,
    /// Account ids mentioned in the message, in order of appearance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    /// Message timestamp (unix seconds).
    #[serde(default)]
    pub timestamp: i64,
}

impl IncomingMessage {
    /// Whether the message mentions the bot itself.
    pub fn mentions_self(&self) -> bool {
        self.mentions.iter().any(|m| *m == self.self_id)
    }

    /// Where a reply to this message should be sent.
    pub fn reply_target(&self) -> ReplyTarget {
        match &self.group_id {
            Some(group_id) => ReplyTarget::Group(group_id.clone()),
            None => ReplyTarget::Private(self.sender_id.clone()),
        }
    }
}

/// Destination of an outgoing text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ReplyTarget {
    Group(String),
    Private(String),
}

/// Profile data returned by group member or stranger lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
}

impl UserProfile {
    /// First non-empty of group card, nickname, nick.
    pub fn display_name(&self) -> Option<&str> {
        [&self.card, &self.nickname, &self.nick]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|s| !s.is_empty())
    }
}

/// Likes the bot account has received, as reported by `get_profile_like`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileLikeInfo {
    #[serde(default)]
    pub favorite_info: FavoriteInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteInfo {
    #[serde(default)]
    pub user_infos: Vec<LikedByUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LikedByUser {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub count: i64,
}
