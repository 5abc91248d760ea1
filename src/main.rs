use chrono::Utc;
use semantic_context::{config::Config, ContextManager, UserMessage};
use std::env;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONSOLE_GUILD: &str = "console";
const CONSOLE_CHANNEL: &str = "stdin";

/// Reads utterances from stdin, prints the context retrieved for each one as
/// JSON, then records the utterance.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::from_env()?;
    debug!("Loaded {:?}", config);
    if let Some(parent) = Path::new(&config.database_url)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }

    let manager = ContextManager::from_config(&config);
    if !manager.initialize().await {
        warn!("Context manager not in semantic mode: {:?}", manager.state());
    }
    info!(
        "Store statistics: {}",
        serde_json::to_string(&manager.get_statistics().await)?
    );

    let author = env::var("CONSOLE_AUTHOR").unwrap_or_else(|_| "console-user".to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seq = 0u64;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let context = manager
            .get_default_context(text, CONSOLE_GUILD, Some(&author))
            .await?;
        println!("{}", serde_json::to_string_pretty(&context)?);

        seq += 1;
        let outcome = manager
            .store_user_message(UserMessage {
                id: format!("console-{}-{}", Utc::now().timestamp_millis(), seq),
                content: text.to_string(),
                author_id: author.clone(),
                author_name: author.clone(),
                channel_id: CONSOLE_CHANNEL.to_string(),
                guild_id: CONSOLE_GUILD.to_string(),
            })
            .await;
        debug!("Console turn {}: {:?}", seq, outcome);
    }

    info!(
        "Session counters: {}",
        serde_json::to_string(&manager.session_counters())?
    );
    Ok(())
}
