//! OneBot v11 platform adapter for likebot.
//!
//! Actions go over the HTTP API; events arrive on a forward WebSocket.
//!
//! # Configuration
//!
//! ```json5
//! onebot: {
//!     http_url: "http://127.0.0.1:3000",
//!     ws_url: "ws://127.0.0.1:3001",
//!     access_token: "optional",
//! }
//! ```

pub mod api;
pub mod events;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use likebot_config::OneBotConfig;
use likebot_plugin::{LikePlatform, PlatformError};
use likebot_types::{IncomingMessage, ProfileLikeInfo, ReplyTarget, UserProfile};

use api::{OneBotApi, parse_id};
use types::{
    GroupMemberInfoParams, SendGroupMsgParams, SendLikeParams, SendPrivateMsgParams,
    StrangerInfoParams,
};

pub use events::{run_event_loop, to_incoming};

/// `LikePlatform` backed by a OneBot v11 implementation.
pub struct OneBotPlatform {
    api: OneBotApi,
}

impl OneBotPlatform {
    pub fn new(api: OneBotApi) -> Self {
        Self { api }
    }

    pub fn from_config(config: &OneBotConfig) -> Self {
        Self::new(OneBotApi::new(
            &config.http_url,
            config.access_token.clone(),
        ))
    }

    pub fn api(&self) -> &OneBotApi {
        &self.api
    }
}

/// Spawn the WebSocket event loop described by `config`.
pub fn spawn_event_loop(
    config: &OneBotConfig,
    sender: mpsc::Sender<IncomingMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_event_loop(
        config.ws_url.clone(),
        config.access_token.clone(),
        sender,
        cancel,
    ))
}

#[async_trait]
impl LikePlatform for OneBotPlatform {
    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), PlatformError> {
        let user_id = parse_id(user_id).map_err(|e| PlatformError::Rejected {
            retcode: None,
            message: e.to_string(),
        })?;
        let resp = self
            .api
            .send_like(&SendLikeParams { user_id, times })
            .await?;
        if resp.is_ok() {
            Ok(())
        } else {
            Err(PlatformError::Rejected {
                retcode: Some(resp.retcode),
                message: resp.reason(),
            })
        }
    }

    async fn get_friend_list(&self) -> anyhow::Result<Vec<String>> {
        let friends = self.api.get_friend_list().await?;
        Ok(friends.into_iter().map(|f| f.user_id.to_string()).collect())
    }

    async fn get_group_member_profile(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Option<UserProfile> {
        let (Ok(group_id), Ok(user_id)) = (parse_id(group_id), parse_id(user_id)) else {
            debug!(group_id, user_id, "Non-numeric id in member lookup");
            return None;
        };
        match self
            .api
            .get_group_member_info(&GroupMemberInfoParams { group_id, user_id })
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(group_id, user_id, error = %e, "Group member lookup failed");
                None
            }
        }
    }

    async fn get_stranger_profile(&self, user_id: &str) -> Option<UserProfile> {
        let user_id = parse_id(user_id).ok()?;
        match self
            .api
            .get_stranger_info(&StrangerInfoParams { user_id })
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id, error = %e, "Stranger lookup failed");
                None
            }
        }
    }

    async fn get_self_like_info(&self) -> anyhow::Result<ProfileLikeInfo> {
        self.api.get_profile_like().await
    }

    async fn send_text(&self, target: &ReplyTarget, text: &str) -> anyhow::Result<()> {
        match target {
            ReplyTarget::Group(group_id) => {
                self.api
                    .send_group_msg(&SendGroupMsgParams {
                        group_id: parse_id(group_id)?,
                        message: text.to_string(),
                    })
                    .await
            }
            ReplyTarget::Private(user_id) => {
                self.api
                    .send_private_msg(&SendPrivateMsgParams {
                        user_id: parse_id(user_id)?,
                        message: text.to_string(),
                    })
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::serve_once;

    fn platform(url: &str) -> OneBotPlatform {
        OneBotPlatform::new(OneBotApi::new(url, None))
    }

    #[tokio::test]
    async fn test_send_like_refusal_is_rejected() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"failed","retcode":200,"data":null,"wording":"今日同一好友点赞数已达上限"}"#,
        )
        .await;
        let err = platform(&url).send_like("42", 10).await.unwrap_err();
        match err {
            PlatformError::Rejected { retcode, message } => {
                assert_eq!(retcode, Some(200));
                assert!(message.contains("上限"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_like_transport_error() {
        // Nothing listens on port 1.
        let err = platform("http://127.0.0.1:1")
            .send_like("42", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_like_invalid_id() {
        let err = platform("http://127.0.0.1:1")
            .send_like("not-a-number", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rejected { retcode: None, .. }));
    }

    #[tokio::test]
    async fn test_friend_ids_are_strings() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"ok","retcode":0,"data":[{"user_id":123456},{"user_id":654321}]}"#,
        )
        .await;
        let ids = platform(&url).get_friend_list().await.unwrap();
        assert_eq!(ids, vec!["123456", "654321"]);
    }

    #[tokio::test]
    async fn test_member_profile() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"ok","retcode":0,"data":{"card":"","nickname":"小明"}}"#,
        )
        .await;
        let profile = platform(&url)
            .get_group_member_profile("777", "42")
            .await
            .unwrap();
        assert_eq!(profile.display_name(), Some("小明"));
    }

    #[tokio::test]
    async fn test_profile_lookup_failure_is_none() {
        let (url, _server) =
            serve_once("200 OK", r#"{"status":"failed","retcode":100}"#).await;
        assert!(platform(&url).get_stranger_profile("42").await.is_none());
        assert!(
            platform("http://127.0.0.1:1")
                .get_group_member_profile("x", "42")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_self_like_info() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"ok","retcode":0,"data":{"favoriteInfo":{"userInfos":[{"nick":"alice","count":3}]}}}"#,
        )
        .await;
        let info = platform(&url).get_self_like_info().await.unwrap();
        assert_eq!(info.favorite_info.user_infos.len(), 1);
        assert_eq!(info.favorite_info.user_infos[0].count, 3);
    }

    #[tokio::test]
    async fn test_send_text_routes_by_target() {
        let (url, server) =
            serve_once("200 OK", r#"{"status":"ok","retcode":0,"data":{"message_id":1}}"#).await;
        platform(&url)
            .send_text(&ReplyTarget::Group("777".into()), "hi")
            .await
            .unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /send_group_msg "));
        assert!(request.contains(r#""group_id":777"#));

        let (url, server) =
            serve_once("200 OK", r#"{"status":"ok","retcode":0,"data":{"message_id":2}}"#).await;
        platform(&url)
            .send_text(&ReplyTarget::Private("42".into()), "hi")
            .await
            .unwrap();
        assert!(server.await.unwrap().starts_with("POST /send_private_msg "));
    }
}
