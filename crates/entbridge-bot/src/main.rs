//! entbridge service binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and long-polls the Telegram Bot API, dispatching
//! each inbound message to the conversation engine.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use entbridge_bot::{
  dispatch::Bot,
  telegram::{self, TelegramTransport},
  transport::ChatId,
  BotConfig,
};
use entbridge_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Pause before retrying after a failed poll round.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(author, version, about = "ENT referral intake bot")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ENTBRIDGE"))
    .build()
    .context("failed to read config file")?;

  let bot_cfg: BotConfig = settings
    .try_deserialize()
    .context("failed to deserialise BotConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&bot_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let transport =
    TelegramTransport::new(&bot_cfg.bot_token).context("building http client")?;

  // Commands and descriptions are cosmetic; failures here are logged inside
  // and only infrastructure errors surface.
  transport
    .best_effort_setup()
    .await
    .context("announcing bot commands")?;

  let bot = Arc::new(Bot::new(
    store,
    transport.clone(),
    ChatId(bot_cfg.target_chat_id),
    bot_cfg.max_archive_bytes(),
  ));

  tracing::info!(target_chat = bot_cfg.target_chat_id, "polling for updates");
  run_poll_loop(transport, bot, bot_cfg.poll_timeout_secs).await
}

// ─── Polling loop ─────────────────────────────────────────────────────────────

async fn run_poll_loop(
  transport: TelegramTransport,
  bot: Arc<Bot<SqliteStore, TelegramTransport>>,
  poll_timeout_secs: u64,
) -> anyhow::Result<()> {
  let mut offset: i64 = 0;

  loop {
    let updates = match transport.get_updates(offset, poll_timeout_secs).await {
      Ok(updates) => updates,
      Err(e) => {
        tracing::warn!(error = %e, "poll round failed");
        tokio::time::sleep(POLL_RETRY_DELAY).await;
        continue;
      }
    };

    for update in updates {
      offset = offset.max(update.update_id + 1);
      if let Some(event) = telegram::user_event(update) {
        // Enqueues onto the user's worker and returns; one user's events
        // are applied in poll order, distinct users run concurrently.
        bot.route_event(event).await;
      }
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
