//! A WebSocket chat room: every connection joins a single group on its
//! first frame (`{"join": "room-name"}`) and from then on every text frame
//! it sends is broadcast to the rest of that room.
//!
//! Run with `ACTON_server__port=8080 cargo run --example chat`.

use std::sync::Arc;

use acton_service::listeners::HttpListener;
use acton_service::prelude::*;
use parking_lot::Mutex;

#[derive(serde::Deserialize)]
struct Join {
    join: String,
}

/// Tracks which room each session joined, so a later frame from the same
/// session knows where to broadcast without the caller repeating `join`.
#[derive(Clone, Default)]
struct Rooms {
    by_session: Arc<Mutex<std::collections::HashMap<String, String>>>,
}

impl Rooms {
    fn room_for(&self, session_id: &str) -> Option<String> {
        self.by_session.lock().get(session_id).cloned()
    }

    fn set_room(&self, session_id: &str, room: String) {
        self.by_session.lock().insert(session_id.to_string(), room);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load_for_service("chat")?;
    if config.server.is_none() {
        config.server = Some(acton_service::config::ServerConfig::default());
    }

    init_tracing(&config)?;

    let dispatcher = Dispatcher::new(config.router.as_ref(), GroupConfig::default()).await?;

    let rooms = Rooms::default();
    dispatcher.configure_services(|services| {
        services.add_singleton(rooms.clone());
    });

    dispatcher.router().register_websocket(
        vec![],
        |ctx: WebSocketContext, rooms: Arc<Rooms>| async move {
            let session_id = ctx.session.id.clone();

            if let Ok(Join { join: room }) = ctx.json::<Join>() {
                if let Some(old_room) = rooms.room_for(&session_id) {
                    ctx.remove_from_group(old_room).await;
                }
                ctx.add_to_group(room.clone()).await;
                rooms.set_room(&session_id, room.clone());
                ctx.send(format!("joined {room}")).await?;
                return Ok(());
            }

            let Some(room) = rooms.room_for(&session_id) else {
                ctx.send("join a room first: {\"join\": \"room-name\"}").await?;
                return Ok(());
            };

            if let Some(text) = ctx.frame.as_text() {
                ctx.send_to_group(room, format!("{session_id}: {text}")).await;
            }

            Ok(())
        },
    );

    dispatcher.ensure_router_ready();

    let dispatcher = Arc::new(dispatcher);

    if let Some(http) = HttpListener::new(&config) {
        dispatcher.add_listener(Arc::new(http));
    }

    dispatcher.run().await
}
