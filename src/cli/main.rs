/**
 * chat_tail Entry Point
 *
 * Follows one conversation from the terminal: loads the newest page of
 * history, prints it, then prints every change pushed by the server.
 *
 * Configuration comes from the environment (or a .env file):
 * WEBCHAT_SERVER_URL, WEBCHAT_TOKEN and WEBCHAT_USER_ID.
 */
use std::sync::Arc;

use webchat_sync::client::{ChannelUpdate, Config, PushConnection, RestClient};
use webchat_sync::shared::messaging::{Message, MessageKind, MessageStatus};
use webchat_sync::storage::NameCacheDb;
use webchat_sync::sync::{ChatSession, RouteOutcome};

fn render(message: &Message) -> String {
    let body = match (message.status, message.kind) {
        (MessageStatus::Revoked, _) => "(message revoked)".to_string(),
        (_, MessageKind::Text) => message.content.clone(),
        (_, MessageKind::Image) => format!(
            "[image] {}",
            message.attachment_url.as_deref().unwrap_or_default()
        ),
        (_, MessageKind::File) => format!(
            "[file] {}",
            message.attachment_name.as_deref().unwrap_or("unnamed")
        ),
    };
    format!(
        "{} #{} user {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.id,
        message.sender_id,
        body
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "webchat_sync=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let Some(conversation_id) = std::env::args().nth(1) else {
        eprintln!("Usage: chat_tail <conversation-id>");
        std::process::exit(2);
    };

    let config = Config::from_env()?;
    let Some(user_id) = config.user_id() else {
        eprintln!("WEBCHAT_USER_ID must be set");
        std::process::exit(2);
    };
    if config.get_token().is_none() {
        eprintln!("WEBCHAT_TOKEN must be set");
        std::process::exit(2);
    }

    let (channel, mut updates) = PushConnection::spawn(&config)?;
    let backend = Arc::new(RestClient::new(config.clone()));
    let mut session = ChatSession::new(backend, channel, user_id, config.app().typing_timeout);

    let cache_path = config
        .app()
        .name_cache_path
        .clone()
        .unwrap_or_else(NameCacheDb::default_path);
    match NameCacheDb::open(&cache_path).await {
        Ok(db) => {
            session.attach_name_cache(db).await?;
        }
        Err(e) => tracing::warn!("[CACHE] Running without name cache: {}", e),
    }

    session.open(conversation_id.as_str().into())?;
    let loaded = session.load_older().await?;
    tracing::info!("[SYNC] Loaded {} messages", loaded);
    for message in session.messages() {
        println!("{}", render(message));
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                if let ChannelUpdate::Status(status) = &update {
                    eprintln!("-- {:?}", status);
                }
                match session.handle_update(update) {
                    RouteOutcome::Appended(id)
                    | RouteOutcome::Replaced(id)
                    | RouteOutcome::Updated(id)
                    | RouteOutcome::Revoked(id) => {
                        if let Some(message) = session.message(&id) {
                            println!("{}", render(message));
                        }
                    }
                    RouteOutcome::Removed(id) => println!("-- message #{} deleted", id),
                    RouteOutcome::Typing(Some(user)) => eprintln!("-- user {} is typing", user),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close();
    Ok(())
}
