//! One-shot subcommands.

use std::path::Path;
use std::sync::Arc;

use likebot_config::{ConfigStore, PluginConfig};
use likebot_cron::parse_cycle;
use likebot_onebot::OneBotPlatform;
use likebot_plugin::{LikeExecutor, LikePlatform};
use likebot_storage::SubscriptionLedger;

fn executor(store: &Arc<ConfigStore>, times: Option<u32>) -> LikeExecutor {
    let config = store.read();
    let platform: Arc<dyn LikePlatform> = Arc::new(OneBotPlatform::from_config(&config.onebot));
    let ledger = Arc::new(SubscriptionLedger::from_config(store.clone()));
    LikeExecutor::new(
        platform,
        ledger,
        times.unwrap_or(config.per_like_times),
    )
}

pub async fn like_once(
    store: Arc<ConfigStore>,
    user_id: &str,
    times: Option<u32>,
) -> anyhow::Result<()> {
    let outcome = executor(&store, times).like(user_id).await;
    if outcome.success {
        println!("{} (x{})", outcome.message, outcome.times_applied);
        Ok(())
    } else {
        anyhow::bail!("like failed: {}", outcome.message)
    }
}

pub async fn print_self_likes(store: Arc<ConfigStore>) -> anyhow::Result<()> {
    let info = executor(&store, None).get_self_like_info().await?;
    println!("{info}");
    Ok(())
}

pub fn print_subscribers(store: &Arc<ConfigStore>) {
    let ledger = SubscriptionLedger::from_config(store.clone());
    print!("{}", format_subscribers(&ledger));
}

fn format_subscribers(ledger: &SubscriptionLedger) -> String {
    if ledger.is_empty() {
        return "暂无订阅用户\n".to_string();
    }
    let mut out = format!("{} subscriber(s)\n", ledger.len());
    for record in ledger.records() {
        out.push_str(&format!("  {}  liked {} time(s) this cycle\n", record.user_id, record.like_count));
    }
    out
}

pub fn print_health(store: &ConfigStore) {
    print!("{}", format_health(&store.read(), store.path()));
}

fn format_health(config: &PluginConfig, path: Option<&Path>) -> String {
    let mut out = String::from("likebot is healthy\n");
    let location = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".into());
    out.push_str(&format!("  config: {location}\n"));
    out.push_str(&format!("  onebot http: {}\n", config.onebot.http_url));
    out.push_str(&format!("  onebot ws: {}\n", config.onebot.ws_url));
    out.push_str(&format!("  subscribers: {}\n", config.subscribe_data.len()));
    out.push_str(&format!("  per like times: {}\n", config.per_like_times));
    let cycle = match parse_cycle(&config.cron_expr) {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("invalid ({e})"),
    };
    out.push_str(&format!(
        "  auto like: {} (cron \"{}\" {}, {cycle})\n",
        config.auto_like, config.cron_expr, config.timezone
    ));
    let llm = if config.llm.resolve_api_key().is_some() {
        config.llm.model.as_str()
    } else {
        "not configured"
    };
    out.push_str(&format!("  llm: {llm}\n"));
    out
}
