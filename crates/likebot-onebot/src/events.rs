//! Forward WebSocket event listener.

use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use likebot_types::IncomingMessage;

use crate::types::{Event, MessageBody, MessageSegment};

static CQ_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[CQ:at,qq=([^,\]]+)[^\]]*\]").unwrap());
static CQ_ANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[CQ:[^\]]*\]").unwrap());

/// Why a connection ended.
enum Disconnect {
    Cancelled,
    ReceiverClosed,
    Lost,
}

/// Convert a raw OneBot event into an `IncomingMessage`.
///
/// Returns `None` for anything that is not a message event with a sender.
pub fn to_incoming(event: Event) -> Option<IncomingMessage> {
    if event.post_type != "message" {
        return None;
    }
    let sender_id = event.user_id?.to_string();
    let group_id = match event.message_type.as_deref() {
        Some("private") => None,
        _ => event.group_id.map(|g| g.to_string()),
    };
    let (text, mentions) = match event.message {
        Some(MessageBody::Segments(segs)) => flatten_segments(&segs),
        Some(MessageBody::CqString(raw)) => parse_cq_string(&raw),
        None => (String::new(), Vec::new()),
    };

    Some(IncomingMessage {
        self_id: event.self_id.to_string(),
        group_id,
        sender_id,
        sender_name: event.sender.and_then(|s| s.display_name()),
        text,
        mentions,
        timestamp: event.time,
    })
}

fn flatten_segments(segs: &[MessageSegment]) -> (String, Vec<String>) {
    let mut text = String::new();
    let mut mentions = Vec::new();
    for seg in segs {
        match seg.kind.as_str() {
            "text" => {
                if let Some(t) = seg.field("text") {
                    text.push_str(&t);
                }
            }
            "at" => {
                // "all" is not an account
                if let Some(qq) = seg.field("qq").filter(|q| is_account_id(q)) {
                    mentions.push(qq);
                }
            }
            _ => {}
        }
    }
    (text.trim().to_string(), mentions)
}

fn parse_cq_string(raw: &str) -> (String, Vec<String>) {
    let mentions = CQ_AT
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|q| is_account_id(q))
        .collect();
    let text = unescape_cq(CQ_ANY.replace_all(raw, "").trim());
    (text, mentions)
}

fn unescape_cq(s: &str) -> String {
    s.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

fn is_account_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Run the event loop, forwarding message events to `sender`.
///
/// Reconnects with exponential backoff. Exits when `cancel` is cancelled
/// or the `sender` is closed.
pub async fn run_event_loop(
    ws_url: String,
    access_token: Option<String>,
    sender: mpsc::Sender<IncomingMessage>,
    cancel: CancellationToken,
) {
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!(ws_url, "OneBot event loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let request = match build_request(&ws_url, access_token.as_deref()) {
            Ok(r) => r,
            Err(e) => {
                warn!(ws_url, error = %e, "Invalid OneBot WebSocket URL, stopping");
                return;
            }
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(request) => result,
        };

        match connected {
            Ok((stream, _)) => {
                info!(ws_url, "Connected to OneBot event stream");
                backoff = Duration::from_secs(1);
                match pump(stream, &sender, &cancel).await {
                    Disconnect::Cancelled => break,
                    Disconnect::ReceiverClosed => {
                        info!("Inbound channel closed, stopping event loop");
                        return;
                    }
                    Disconnect::Lost => {
                        warn!(ws_url, "OneBot event stream lost, reconnecting");
                    }
                }
            }
            Err(e) => {
                warn!(
                    ws_url,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "OneBot connect failed, retrying"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {},
        }
        backoff = (backoff * 2).min(max_backoff);
    }

    info!(ws_url, "OneBot event loop stopped");
}

fn build_request(
    ws_url: &str,
    access_token: Option<&str>,
) -> anyhow::Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = ws_url.into_client_request()?;
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }
    Ok(request)
}

async fn pump<S>(
    mut stream: S,
    sender: &mpsc::Sender<IncomingMessage>,
    cancel: &CancellationToken,
) -> Disconnect
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::Cancelled,
            frame = stream.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Disconnect::Lost,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "OneBot WebSocket error");
                return Disconnect::Lost;
            }
        };

        let event: Event = match serde_json::from_str(&text) {
            Ok(ev) => ev,
            Err(e) => {
                // Action echoes and non-standard frames
                debug!(error = %e, "Skipping unrecognized OneBot frame");
                continue;
            }
        };
        let Some(incoming) = to_incoming(event) else {
            continue;
        };

        debug!(
            sender_id = %incoming.sender_id,
            group_id = ?incoming.group_id,
            "Forwarding OneBot message"
        );
        if sender.send(incoming).await.is_err() {
            return Disconnect::ReceiverClosed;
        }
    }
}
