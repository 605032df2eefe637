//! In-memory collaborators shared by the crate's tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use likebot_config::PluginConfig;
use likebot_llm::{ChatMessage, LlmProvider};
use likebot_storage::{LedgerSink, SubscriptionLedger};
use likebot_types::{
    FavoriteInfo, LikedByUser, ProfileLikeInfo, ReplyTarget, SubscriptionRecord, UserProfile,
};

use crate::platform::{LikePlatform, PlatformError};

pub struct NullSink;

impl LedgerSink for NullSink {
    fn save(&self, _records: &[SubscriptionRecord]) -> likebot_storage::Result<()> {
        Ok(())
    }
}

pub fn ledger_with(ids: &[&str]) -> Arc<SubscriptionLedger> {
    let records = ids.iter().map(|id| SubscriptionRecord::new(*id)).collect();
    Arc::new(SubscriptionLedger::new(records, Arc::new(NullSink)))
}

#[derive(Default)]
pub struct MockPlatform {
    pub friends: Vec<String>,
    /// Users whose likes are refused, with the refusal text.
    pub refusals: HashMap<String, String>,
    pub profiles: HashMap<String, UserProfile>,
    pub like_calls: Mutex<Vec<(String, u32)>>,
    pub sent: Mutex<Vec<(ReplyTarget, String)>>,
}

impl MockPlatform {
    pub fn with_friends(ids: &[&str]) -> Self {
        Self {
            friends: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn refuse(mut self, user_id: &str, reason: &str) -> Self {
        self.refusals.insert(user_id.into(), reason.into());
        self
    }

    pub fn like_calls(&self) -> Vec<(String, u32)> {
        self.like_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LikePlatform for MockPlatform {
    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), PlatformError> {
        self.like_calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), times));
        match self.refusals.get(user_id) {
            Some(reason) => Err(PlatformError::Rejected {
                retcode: Some(200),
                message: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn get_friend_list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.friends.clone())
    }

    async fn get_group_member_profile(
        &self,
        _group_id: &str,
        user_id: &str,
    ) -> Option<UserProfile> {
        self.profiles.get(user_id).cloned()
    }

    async fn get_stranger_profile(&self, _user_id: &str) -> Option<UserProfile> {
        None
    }

    async fn get_self_like_info(&self) -> anyhow::Result<ProfileLikeInfo> {
        Ok(ProfileLikeInfo {
            favorite_info: FavoriteInfo {
                user_infos: vec![
                    LikedByUser {
                        nick: Some("alice".into()),
                        count: 3,
                    },
                    LikedByUser {
                        nick: None,
                        count: 9,
                    },
                ],
            },
        })
    }

    async fn send_text(&self, target: &ReplyTarget, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        Ok(())
    }
}

/// Echoes the reply scenario back as a valid JSON reply.
pub struct EchoLlm;

#[async_trait]
impl LlmProvider for EchoLlm {
    fn id(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        prompt: &str,
        _history: &[ChatMessage],
    ) -> anyhow::Result<String> {
        let scenario = prompt
            .split("【场景】")
            .nth(1)
            .and_then(|rest| rest.split("【回复风格】").next())
            .unwrap_or_default()
            .trim();
        Ok(format!(r#"{{"text":"LLM:{scenario}"}}"#))
    }
}

pub fn test_config() -> PluginConfig {
    PluginConfig {
        per_like_times: 10,
        auto_like: false,
        admins: vec!["admin".into()],
        ..Default::default()
    }
}
