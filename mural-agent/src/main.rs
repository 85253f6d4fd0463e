//! Mural Agent — headless board participant.
//!
//! Joins a room, keeps a durable local replica and relays it to the other
//! participants until interrupted. Configured through `MURAL_*` variables;
//! an optional first argument is a room name or share link.

use log::{error, info, warn};
use std::sync::Arc;

use mural_collab::{open_log, BoardEvent, RoomId, Session, SessionConfig, WebSocketTransport};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = SessionConfig::from_env();
    if let Some(arg) = std::env::args().nth(1) {
        config.room = if arg.contains("room=") {
            RoomId::from_share_link(&arg)
        } else {
            RoomId::new(arg)
        };
    }

    if let Err(e) = run(config).await {
        error!("agent stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(config: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Mural Agent in room {}...", config.room);

    let transport = WebSocketTransport::new(config.signaling.clone(), config.connect_timeout);
    let log = open_log(&config)?;
    let session = Session::open(config, Arc::new(transport), log)?;
    info!("share link: {}", session.share_link());

    let mut events = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(BoardEvent::Changed(collection)) => {
                    let state = session.state();
                    info!(
                        "{:?} changed: {} cards, {} areas, {} connectors, {} drawings",
                        collection,
                        state.cards.len(),
                        state.areas.len(),
                        state.connectors.len(),
                        state.drawings.len()
                    );
                }
                Ok(BoardEvent::Cursors(_)) => {}
                Ok(BoardEvent::Connection(state)) => info!("connection: {:?}", state),
                Ok(BoardEvent::PersistenceWarning(msg)) => warn!("persistence: {msg}"),
                Ok(BoardEvent::RejectedUpdate(msg)) => warn!("rejected remote update: {msg}"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("skipped {n} board events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!(
        "leaving room {} ({} participants online)",
        session.room(),
        session.participants().len()
    );
    session.close().await?;
    Ok(())
}
