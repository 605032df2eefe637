//! OneBot v11 types (minimal subset).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Generic action response wrapper.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ActionResponse<T> {
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
}

impl<T> ActionResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.status == "ok" && self.retcode == 0
    }

    /// Best human-readable failure text.
    pub fn reason(&self) -> String {
        [&self.wording, &self.message]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("retcode {}", self.retcode))
    }
}

#[derive(Debug, Serialize)]
pub struct SendLikeParams {
    pub user_id: i64,
    pub times: u32,
}

#[derive(Debug, Serialize)]
pub struct GroupMemberInfoParams {
    pub group_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct StrangerInfoParams {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SendGroupMsgParams {
    pub group_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendPrivateMsgParams {
    pub user_id: i64,
    pub message: String,
}

/// Entry of `get_friend_list`.
#[derive(Debug, Deserialize)]
pub struct FriendInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// An event pushed over the WebSocket. Only message events are consumed.
#[derive(Debug, Deserialize)]
pub struct Event {
    pub post_type: String,
    #[serde(default)]
    pub message_type: Option<String>,
    pub self_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub message: Option<MessageBody>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub time: i64,
}

/// Message content in either of the two OneBot formats.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Segments(Vec<MessageSegment>),
    CqString(String),
}

#[derive(Debug, Deserialize)]
pub struct MessageSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl MessageSegment {
    /// A data field as a string; OneBot implementations disagree on number vs string.
    pub fn field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> Option<String> {
        [&self.card, &self.nickname]
            .into_iter()
            .filter_map(|s| s.clone())
            .find(|s| !s.is_empty())
    }
}
