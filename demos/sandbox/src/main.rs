//! Development server with an in-memory world.
//!
//! Seeds three users (ids 1-3) and one session on a small dungeon map, then
//! serves `ws://{ROLLPLAY_ADDR}/api/connect/{userId}/1`. Set `RUST_LOG` to
//! change verbosity.

use std::sync::Arc;

use rollplay::prelude::*;
use tracing_subscriber::EnvFilter;

const DUNGEON: [&str; 8] = [
    "..........",
    "..####....",
    "..#..#....",
    "..#.......",
    "..........",
    "......##..",
    "......#...",
    "..........",
];

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

async fn seed() -> (Arc<MemoryStore>, MemoryMaps) {
    let store = Arc::new(MemoryStore::new());
    for (id, login) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        store.add_user(UserId(id), login).await;
    }
    let session = store.add_session(MapId(1)).await;
    tracing::info!(session_id = %session.id, "seeded sandbox session");

    let maps = MemoryMaps::new().with_map(MapId(1), GridMap::parse(&DUNGEON));
    (store, maps)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("ROLLPLAY_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let (store, maps) = seed().await;

    let server = RollplayServerBuilder::new()
        .bind(&addr)
        .build(store, maps)
        .await?;
    tracing::info!(%addr, "sandbox ready, connect to /api/connect/{{userId}}/1");

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn next_json(ws: &mut Ws) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_seed_creates_users_session_and_map() {
        let (store, maps) = seed().await;

        assert!(store.find_user(UserId(3)).await.unwrap().is_some());
        let session = store.find_session(SessionId(1)).await.unwrap().unwrap();
        assert_eq!(session.map_id, MapId(1));
        let map = maps.load_map(MapId(1)).await.unwrap().unwrap();
        assert!(map.is_obstacle_tile(1, 2));
        assert!(!map.is_obstacle_tile(0, 0));
    }

    #[tokio::test]
    async fn test_sandbox_accepts_seeded_user() {
        let (store, maps) = seed().await;
        let server = RollplayServerBuilder::new()
            .bind("127.0.0.1:0")
            .build(store, maps)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let (mut ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/api/connect/2/1"))
                .await
                .unwrap();

        let info = next_json(&mut ws).await;
        assert_eq!(info["type"], "session:info");

        ws.send(Message::Text(r#"{"type":"character:new","row":4,"col":4}"#.into()))
            .await
            .unwrap();
        let created = next_json(&mut ws).await;
        assert_eq!(created["name"], "Dovakin");
        assert_eq!(created["own"], true);
    }
}
