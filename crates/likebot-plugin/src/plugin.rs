//! Message routing and lifecycle for the like plugin.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use likebot_config::PluginConfig;
use likebot_cron::{RandomScheduler, RefreshHook, ScheduledTask, SchedulerError, SchedulerOptions};
use likebot_llm::{ReplyComposer, ReplyKind};
use likebot_storage::SubscriptionLedger;
use likebot_types::{IncomingMessage, LikeFailureKind};

use crate::executor::LikeExecutor;
use crate::platform::LikePlatform;
use crate::utils::{get_ats, get_nickname, is_friend};

const SCHEDULER_JOB_PREFIX: &str = "AutoLike";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Subscribe,
    Unsubscribe,
    ListSubscribers,
    SelfLikes,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "订阅点赞" => Some(Self::Subscribe),
            "取消订阅点赞" => Some(Self::Unsubscribe),
            "订阅点赞列表" => Some(Self::ListSubscribers),
            "自身赞" => Some(Self::SelfLikes),
            _ => None,
        }
    }
}

/// The like plugin: subscription commands, on-demand likes and the daily batch.
pub struct LikePlugin {
    config: PluginConfig,
    platform: Arc<dyn LikePlatform>,
    ledger: Arc<SubscriptionLedger>,
    executor: Arc<LikeExecutor>,
    replies: ReplyComposer,
    scheduler: Mutex<Option<RandomScheduler>>,
}

impl LikePlugin {
    pub fn new(
        config: PluginConfig,
        platform: Arc<dyn LikePlatform>,
        ledger: Arc<SubscriptionLedger>,
        replies: ReplyComposer,
    ) -> Self {
        let executor = Arc::new(LikeExecutor::new(
            platform.clone(),
            ledger.clone(),
            config.per_like_times,
        ));
        Self {
            config,
            platform,
            ledger,
            executor,
            replies,
            scheduler: Mutex::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<SubscriptionLedger> {
        &self.ledger
    }

    pub fn executor(&self) -> &Arc<LikeExecutor> {
        &self.executor
    }

    /// Arm the daily random like when `auto_like` is on. Calling it again is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if !self.config.auto_like {
            info!("auto_like disabled, daily scheduler not started");
            return Ok(());
        }

        let mut slot = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Ok(());
        }

        let executor = self.executor.clone();
        let task: ScheduledTask = Arc::new(move || {
            let executor = executor.clone();
            Box::pin(async move {
                executor.like_random().await;
                Ok(())
            })
        });

        let ledger = self.ledger.clone();
        let on_refresh: RefreshHook = Arc::new(move || -> anyhow::Result<()> {
            ledger.reset_all()?;
            info!("Daily like counters reset");
            Ok(())
        });

        let scheduler = RandomScheduler::start(
            task,
            SchedulerOptions {
                job_prefix: SCHEDULER_JOB_PREFIX.to_string(),
                cron_expr: self.config.cron_expr.clone(),
                timezone: self.config.timezone.clone(),
                on_refresh: Some(on_refresh),
                ..Default::default()
            },
        )?;
        *slot = Some(scheduler);
        Ok(())
    }

    /// Ids of the scheduler's armed timers; empty when not running.
    pub fn scheduled_jobs(&self) -> Vec<String> {
        self.scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(RandomScheduler::pending_jobs)
            .unwrap_or_default()
    }

    /// Stop the scheduler. Safe to call more than once.
    pub fn terminate(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown();
        }
    }

    /// Handle inbound messages until `cancel` fires or the sender closes,
    /// sending each reply back where the message came from.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<IncomingMessage>,
        cancel: CancellationToken,
    ) {
        info!("Like plugin listening for messages");
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let plugin = self.clone();
            tokio::spawn(async move {
                let Some(reply) = plugin.handle_message(&msg).await else {
                    return;
                };
                if let Err(e) = plugin.platform.send_text(&msg.reply_target(), &reply).await {
                    warn!(sender_id = %msg.sender_id, "Failed to send reply: {e:#}");
                }
            });
        }
        info!("Like plugin stopped listening");
    }

    /// Route one message. Returns the reply text, if any.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Option<String> {
        let (text, has_prefix) = match msg.text.trim().strip_prefix(self.config.wake_prefix.as_str())
        {
            Some(rest) if !self.config.wake_prefix.is_empty() => (rest.trim(), true),
            _ => (msg.text.trim(), false),
        };
        let woken = has_prefix || msg.mentions_self() || msg.group_id.is_none();

        if let Some(command) = Command::parse(text) {
            if !woken {
                return None;
            }
            debug!(?command, sender_id = %msg.sender_id, "Command received");
            return self.run_command(command, msg).await;
        }

        if self.config.need_prefix && !woken {
            return None;
        }
        self.on_like(text, msg).await
    }

    async fn run_command(&self, command: Command, msg: &IncomingMessage) -> Option<String> {
        let sender_id = msg.sender_id.as_str();
        match command {
            Command::Subscribe => {
                if self.config.only_like_friend && !is_friend(&*self.platform, sender_id).await {
                    return Some("你没加我好友，不许订阅".into());
                }
                match self.ledger.add(sender_id) {
                    Ok(true) => Some("订阅成功！我将每天自动为你点赞".into()),
                    Ok(false) => Some("你订阅过了".into()),
                    Err(e) => {
                        error!(sender_id, "Subscribe failed: {e}");
                        Some("订阅失败，请稍后再试".into())
                    }
                }
            }
            Command::Unsubscribe => match self.ledger.remove(sender_id) {
                Ok(true) => Some("已取消订阅！我将不再自动给你点赞".into()),
                Ok(false) => Some("你还没订阅过".into()),
                Err(e) => {
                    error!(sender_id, "Unsubscribe failed: {e}");
                    Some("取消订阅失败，请稍后再试".into())
                }
            },
            Command::ListSubscribers => {
                let users = self.ledger.all_user_ids();
                if users.is_empty() {
                    Some("暂无订阅用户".into())
                } else {
                    Some(format!("订阅用户：\n{}", users.join("\n")))
                }
            }
            Command::SelfLikes => {
                if !self.config.admins.iter().any(|a| a == sender_id) {
                    return None;
                }
                match self.executor.get_self_like_info().await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        error!("Self like lookup failed: {e:#}");
                        None
                    }
                }
            }
        }
    }

    /// `赞我`, `赞 @someone`, or the occasional unprompted like for the sender.
    async fn on_like(&self, text: &str, msg: &IncomingMessage) -> Option<String> {
        let (target_id, need_reply) = if text.starts_with('赞') {
            if text == "赞我" {
                (msg.sender_id.clone(), true)
            } else {
                (get_ats(msg).into_iter().next()?, true)
            }
        } else if rand::random::<f64>() < self.config.random_like_prob {
            (msg.sender_id.clone(), false)
        } else {
            return None;
        };

        let group_id = msg.group_id.as_deref();

        if self.config.only_like_friend && !is_friend(&*self.platform, &target_id).await {
            if !need_reply {
                return None;
            }
            let username = get_nickname(&*self.platform, group_id, &msg.sender_id).await;
            let reply = self.replies.compose(ReplyKind::Stranger, &username, &[]).await;
            return Some(reply.unwrap_or_else(|| "没好友不赞".to_string()));
        }

        let outcome = self.executor.like(&target_id).await;
        if !need_reply {
            return None;
        }

        let kind = if outcome.success {
            Some(ReplyKind::Success {
                total_likes: outcome.times_applied,
            })
        } else {
            match outcome.failure {
                Some(LikeFailureKind::DailyLimit) => Some(ReplyKind::Limit),
                Some(LikeFailureKind::PermissionDenied) => Some(ReplyKind::Permission),
                _ => None,
            }
        };

        let reply = match kind {
            Some(kind) => {
                let username = get_nickname(&*self.platform, group_id, &msg.sender_id).await;
                self.replies.compose(kind, &username, &[]).await
            }
            None => None,
        };
        Some(reply.unwrap_or(outcome.message))
    }
}

impl Drop for LikePlugin {
    fn drop(&mut self) {
        self.terminate();
    }
}
