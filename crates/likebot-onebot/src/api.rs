//! OneBot v11 HTTP action client.

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use likebot_types::{ProfileLikeInfo, UserProfile};

use crate::types::{
    ActionResponse, FriendInfo, GroupMemberInfoParams, SendGroupMsgParams, SendLikeParams,
    SendPrivateMsgParams, StrangerInfoParams,
};

/// HTTP client for the OneBot action API.
pub struct OneBotApi {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl OneBotApi {
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `{base}/{action}` and decode the response envelope.
    ///
    /// Non-ok envelopes are returned as-is so callers can inspect the retcode.
    pub async fn call<P, T>(&self, action: &str, params: &P) -> anyhow::Result<ActionResponse<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(action, "Calling OneBot action");
        let mut req = self
            .client
            .post(format!("{}/{action}", self.base_url))
            .json(params);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{action} request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("{action} failed: HTTP {status}");
        }
        resp.json()
            .await
            .with_context(|| format!("{action} response parse failed"))
    }

    /// Call an action and require an ok envelope.
    async fn call_ok<P, T>(&self, action: &str, params: &P) -> anyhow::Result<Option<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp: ActionResponse<T> = self.call(action, params).await?;
        if !resp.is_ok() {
            bail!("{action} failed: {}", resp.reason());
        }
        Ok(resp.data)
    }

    /// `send_like`. Returns the raw envelope; a refusal is not an error here.
    pub async fn send_like(
        &self,
        params: &SendLikeParams,
    ) -> anyhow::Result<ActionResponse<serde_json::Value>> {
        self.call("send_like", params).await
    }

    pub async fn get_friend_list(&self) -> anyhow::Result<Vec<FriendInfo>> {
        Ok(self
            .call_ok("get_friend_list", &serde_json::json!({}))
            .await?
            .unwrap_or_default())
    }

    pub async fn get_group_member_info(
        &self,
        params: &GroupMemberInfoParams,
    ) -> anyhow::Result<Option<UserProfile>> {
        self.call_ok("get_group_member_info", params).await
    }

    pub async fn get_stranger_info(
        &self,
        params: &StrangerInfoParams,
    ) -> anyhow::Result<Option<UserProfile>> {
        self.call_ok("get_stranger_info", params).await
    }

    /// `get_profile_like` for the logged-in account.
    pub async fn get_profile_like(&self) -> anyhow::Result<ProfileLikeInfo> {
        let data: Option<ProfileLikeInfo> = self
            .call_ok("get_profile_like", &serde_json::json!({}))
            .await?;
        data.ok_or_else(|| anyhow!("get_profile_like returned no data"))
    }

    pub async fn send_group_msg(&self, params: &SendGroupMsgParams) -> anyhow::Result<()> {
        self.call_ok::<_, serde_json::Value>("send_group_msg", params)
            .await?;
        Ok(())
    }

    pub async fn send_private_msg(&self, params: &SendPrivateMsgParams) -> anyhow::Result<()> {
        self.call_ok::<_, serde_json::Value>("send_private_msg", params)
            .await?;
        Ok(())
    }
}

/// Parse a decimal account id.
pub(crate) fn parse_id(id: &str) -> anyhow::Result<i64> {
    id.trim()
        .parse()
        .with_context(|| format!("invalid account id: {id:?}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single HTTP request with a JSON body; yields the raw request text.
    pub(crate) async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 123456 ").unwrap(), 123456);
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn test_base_url_trimmed_and_empty_token_dropped() {
        let api = OneBotApi::new("http://127.0.0.1:3000/", Some(String::new()));
        assert_eq!(api.base_url(), "http://127.0.0.1:3000");
        assert!(api.access_token.is_none());
    }

    #[tokio::test]
    async fn test_call_posts_action_with_bearer() {
        let (url, server) =
            serve_once("200 OK", r#"{"status":"ok","retcode":0,"data":null}"#).await;
        let api = OneBotApi::new(&url, Some("secret".into()));
        let resp = api
            .send_like(&SendLikeParams {
                user_id: 42,
                times: 10,
            })
            .await
            .unwrap();
        assert!(resp.is_ok());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /send_like "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""user_id":42"#));
        assert!(request.contains(r#""times":10"#));
    }

    #[tokio::test]
    async fn test_friend_list_parsed() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"ok","retcode":0,"data":[{"user_id":1,"nickname":"a"},{"user_id":2}]}"#,
        )
        .await;
        let api = OneBotApi::new(&url, None);
        let friends = api.get_friend_list().await.unwrap();
        let ids: Vec<i64> = friends.iter().map(|f| f.user_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_envelope_is_error_for_queries() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"status":"failed","retcode":100,"data":null,"message":"no such member"}"#,
        )
        .await;
        let api = OneBotApi::new(&url, None);
        let err = api
            .get_group_member_info(&GroupMemberInfoParams {
                group_id: 1,
                user_id: 2,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such member"));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, _server) = serve_once("401 Unauthorized", "{}").await;
        let api = OneBotApi::new(&url, None);
        let err = api.get_profile_like().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
