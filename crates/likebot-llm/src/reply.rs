//! Short in-character replies for like results.
//!
//! The model is asked for a one-field JSON object; anything else is treated
//! as "no reply" and the caller falls back to its own text.

use std::sync::Arc;

use likebot_config::PluginConfig;

use crate::provider::{ChatMessage, LlmProvider};

/// What happened, from the bot's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success { total_likes: u32 },
    Limit,
    Stranger,
    Permission,
}

/// Reply tone per [`ReplyKind`].
#[derive(Debug, Clone)]
pub struct ReplyStyles {
    pub success: String,
    pub limit: String,
    pub stranger: String,
    pub permission: String,
}

impl ReplyStyles {
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            success: config.llm_success_style.clone(),
            limit: config.llm_limit_style.clone(),
            stranger: config.llm_stranger_style.clone(),
            permission: config.llm_permission_style.clone(),
        }
    }

    fn for_kind(&self, kind: ReplyKind) -> &str {
        match kind {
            ReplyKind::Success { .. } => &self.success,
            ReplyKind::Limit => &self.limit,
            ReplyKind::Stranger => &self.stranger,
            ReplyKind::Permission => &self.permission,
        }
    }
}

pub struct ReplyComposer {
    provider: Option<Arc<dyn LlmProvider>>,
    system_prompt: String,
    styles: ReplyStyles,
}

impl ReplyComposer {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        system_prompt: String,
        styles: ReplyStyles,
    ) -> Self {
        Self {
            provider,
            system_prompt,
            styles,
        }
    }

    /// Compose a reply for `username`, or `None` if the model gave nothing usable.
    ///
    /// The plugin currently always passes an empty `history`.
    pub async fn compose(
        &self,
        kind: ReplyKind,
        username: &str,
        history: &[ChatMessage],
    ) -> Option<String> {
        let provider = self.provider.as_ref()?;
        let prompt = build_prompt(self.styles.for_kind(kind), &scenario(kind, username));

        match provider.complete(&self.system_prompt, &prompt, history).await {
            Ok(raw) => parse_reply(&raw),
            Err(e) => {
                tracing::error!("LLM call failed: {e:#}");
                None
            }
        }
    }
}

fn scenario(kind: ReplyKind, username: &str) -> String {
    match kind {
        ReplyKind::Success { total_likes } => {
            format!("你刚刚成功给 {username} 点赞 {total_likes} 次。")
        }
        ReplyKind::Limit => {
            format!("{username}想要你的赞，但是今天已经给 {username} 点赞到上限，不能再点了。")
        }
        ReplyKind::Stranger => {
            format!("{username} 想要你赞Ta，但是{username} 不是你的好友，你点不了赞")
        }
        ReplyKind::Permission => {
            "对方想让你给Ta点赞，但Ta设了权限不许你这个陌生人赞Ta".to_string()
        }
    }
}

/// The JSON-only reply prompt for a scenario and style.
pub fn build_prompt(style: &str, scenario: &str) -> String {
    format!(
        r#"
你正在用 QQ 和别人聊天，需要给出一句自然的回复。

【硬性规则】
1. 只允许输出 JSON
2. JSON 只能包含一个字段 text
3. 不允许输出解释、注释、Markdown
4. 不允许出现换行符

JSON 格式：
{{"text":"回复内容"}}

【场景】
{scenario}

【回复风格】
{style}
"#
    )
}

/// Extract the trimmed, non-empty `text` field of a JSON object.
pub fn parse_reply(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let text = value.as_object()?.get("text")?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
