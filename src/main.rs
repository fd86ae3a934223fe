use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use auraflow::commands;
use auraflow::database::Store;
use auraflow::services::{JsonFeedCollector, Supervisor};
use auraflow::utils::config;

const HELP: &str = "commands: status | confirm <severity 1-10> [symptom...] | resolve [event-id] | \
events [limit] | pattern | stats | cleanup [days] | settings | set <section.field> <value> | quit";

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let settings = config::load_settings(&data_dir).context("Failed to load settings")?;
    let store = Arc::new(
        Store::open(&config::database_path(&data_dir)).context("Failed to initialize database")?,
    );

    if settings.storage.auto_cleanup {
        match commands::storage::cleanup_old_data(&store, settings.storage.retention_days) {
            Ok(removed) if removed > 0 => log::info!("[Main] Removed {} old history samples", removed),
            Ok(_) => {}
            Err(e) => log::error!("[Main] Cleanup failed: {}", e),
        }
    }

    let feed_dir = data_dir.join(&settings.collection.feed_dir);
    std::fs::create_dir_all(&feed_dir)
        .with_context(|| format!("Failed to create feed directory {}", feed_dir.display()))?;

    let owner_id = config::owner_id();
    let mut supervisor = Supervisor::from_settings(store.clone(), settings)?;
    supervisor
        .start_session(&owner_id, JsonFeedCollector::all(&feed_dir))
        .await?;
    log::info!(
        "[Main] Watching {} for {}; {}",
        feed_dir.display(),
        owner_id,
        HELP
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = handle_command(&supervisor, &data_dir, &owner_id, &line).await {
                        break;
                    }
                }
                // Headless: keep collecting until interrupted.
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::error!("[Main] Failed to read command: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

async fn handle_command(
    supervisor: &Supervisor,
    data_dir: &Path,
    owner_id: &str,
    line: &str,
) -> Flow {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Flow::Continue;
    };
    let args: Vec<&str> = words.collect();
    let store = supervisor.store();
    let Some(session) = supervisor.session(owner_id) else {
        println!("no active session for {}", owner_id);
        return Flow::Quit;
    };

    let reply = match command {
        "status" => commands::risk::get_status(session).map(|r| commands::risk::describe(&r)),
        "confirm" => match args.first().and_then(|s| s.parse::<u8>().ok()) {
            Some(severity) => {
                let symptoms = args[1..].iter().map(|s| s.to_string()).collect();
                commands::events::confirm_migraine(session, severity, symptoms)
                    .await
                    .map(|e| format!("recorded migraine {} (severity {})", e.id, e.severity))
            }
            None => Err("usage: confirm <severity 1-10> [symptom...]".to_string()),
        },
        "resolve" => commands::events::resolve_migraine(session, store, args.first().copied())
            .await
            .map(|e| {
                format!(
                    "resolved {} after {} minutes",
                    e.id,
                    e.duration_minutes.unwrap_or(0)
                )
            }),
        "events" => {
            let limit = args.first().and_then(|s| s.parse().ok()).unwrap_or(10);
            commands::events::get_recent_events(store, owner_id, limit)
                .and_then(|events| serde_json::to_string_pretty(&events).map_err(|e| e.to_string()))
        }
        "pattern" => commands::events::get_learned_pattern(session)
            .await
            .and_then(|p| serde_json::to_string_pretty(&p).map_err(|e| e.to_string())),
        "stats" => commands::storage::get_storage_stats(store)
            .and_then(|s| serde_json::to_string_pretty(&s).map_err(|e| e.to_string())),
        "cleanup" => {
            let days = args
                .first()
                .and_then(|s| s.parse().ok())
                .unwrap_or(supervisor.settings().storage.retention_days);
            commands::storage::cleanup_old_data(store, days)
                .map(|n| format!("removed {} history samples", n))
        }
        "settings" => commands::settings::get_settings(data_dir)
            .and_then(|s| serde_json::to_string_pretty(&s).map_err(|e| e.to_string())),
        "set" => match args.as_slice() {
            [key, value @ ..] if !value.is_empty() => {
                commands::settings::set_setting(data_dir, key, &value.join(" "))
                    .map(|_| format!("saved {}; restart to apply", key))
            }
            _ => Err("usage: set <section.field> <value>".to_string()),
        },
        "quit" | "exit" => return Flow::Quit,
        _ => Ok(HELP.to_string()),
    };

    match reply {
        Ok(text) => println!("{}", text),
        Err(e) => println!("error: {}", e),
    }
    Flow::Continue
}
