//! Postback Relay — tracking webhook receiver + trader verification bot.
//!
//!   platform ──postback──→ /sigmapostback ──→ RecordStore
//!   chat user ──trader id──→ LookupBot ──→ tier + one-time invite links
//!
//! Config comes from the environment (a `.env` file is loaded first).

use std::env;
use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use postback_relay::config::{RelayConfig, UpdateMode};
use postback_relay::server;
use postback_relay::telegram::{ChatPlatform, TelegramClient};
use postback_relay::AppState;

/// stdout always; a daily rolling file as well when `RELAY_LOG_DIR` is set.
/// The returned guard must live as long as the process.
fn init_tracing() -> Option<WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match env::var("RELAY_LOG_DIR").ok().filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "postback_relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = init_tracing();

    info!("═══════════════════════════════════════════════════");
    info!("  Postback Relay — postbacks + trader verification");
    info!("═══════════════════════════════════════════════════");

    let cfg = RelayConfig::from_env()?;
    info!(
        "📊 Config: db={} low={} high={} destinations={} expire={:?} limit={:?} mode={:?}",
        cfg.db_path.display(),
        cfg.tiers.low_threshold,
        cfg.tiers.high_threshold,
        cfg.destinations.iter().map(|d| d.key.as_str()).collect::<Vec<_>>().join(","),
        cfg.invite_policy.expire_after,
        cfg.invite_policy.member_limit,
        cfg.update_mode,
    );

    let chat: Arc<dyn ChatPlatform> = Arc::new(TelegramClient::new(cfg.telegram.clone())?);
    let state = AppState::from_config(&cfg, chat);

    let poller = match cfg.update_mode {
        UpdateMode::Polling => Some(tokio::spawn(
            state.bot.clone().run_polling(cfg.telegram.poll_timeout_secs),
        )),
        UpdateMode::Webhook => {
            info!("🤖 Webhook mode — updates arrive on POST /telegram/webhook");
            None
        }
    };

    let result = tokio::select! {
        r = server::serve(state, cfg.bind_addr) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl-C received — shutting down");
            Ok(())
        }
    };

    if let Some(handle) = poller {
        handle.abort();
    }
    result
}
