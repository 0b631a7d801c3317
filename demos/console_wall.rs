//! Console wall example
//!
//! Run with: cargo run --example console_wall [EVENT]
//!
//! Wires an in-memory store, a loopback stream source, the stream controller
//! and the broadcast gateway together, then replays a few captured payloads
//! and prints what a viewer would see.
//!
//! Set `RUST_LOG=tweetwall=debug` for the controller's lifecycle logs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tweetwall::store::spawn_retention_task;
use tweetwall::{
    BroadcastGateway, ControllerConfig, GatewayConfig, LoopbackSource, MemoryStore, PostStore,
    RetentionConfig, StreamController, ViewerCommand, WallEvent,
};

fn sample_payloads() -> Vec<serde_json::Value> {
    vec![
        json!({
            "id_str": "850006245121695744",
            "full_text": "Slides for the async Rust talk are up #rustlang",
            "created_at": "Thu Apr 06 15:24:15 +0000 2017",
            "user": {
                "screen_name": "ferris",
                "name": "Ferris",
                "profile_image_url_https": "https://example.org/ferris.png"
            }
        }),
        json!({
            "id": 850006245121695745u64,
            "text": "Queue for coffee is longer than the compile #rustlang",
            "timestamp_ms": "1491492300000",
            "user": { "screen_name": "crabby" },
            "entities": {
                "media": [{ "media_url_https": "https://example.org/queue.jpg" }]
            }
        }),
        // Replays of an already stored post are ignored
        json!({
            "id_str": "850006245121695744",
            "full_text": "Slides for the async Rust talk are up #rustlang",
            "created_at": "Thu Apr 06 15:24:15 +0000 2017",
            "user": { "screen_name": "ferris" }
        }),
        json!({ "delete": { "status": { "id_str": "1" } } }),
    ]
}

fn print_event(event: &WallEvent) {
    match event {
        WallEvent::NewPost { post } => {
            println!("  [new] @{}: {}", post.author_handle, post.body);
        }
        WallEvent::Tracks { tracks } => {
            let keywords: Vec<&str> = tracks.iter().map(|t| t.value.as_str()).collect();
            println!("  [tracks] {}", keywords.join(", "));
        }
        WallEvent::StickyChanged { post_id, sticky } => {
            println!("  [sticky] post {} -> {}", post_id, sticky);
        }
        WallEvent::StreamStatus { state } => println!("  [status] {}", state),
        WallEvent::Feed { event, posts } => {
            println!("  [feed] {} ({} posts)", event, posts.len());
            for post in posts {
                let pin = if post.sticky { "*" } else { " " };
                println!("   {} {} @{}: {}", pin, post.date, post.author_handle, post.body);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let event_name = std::env::args().nth(1).unwrap_or_else(|| "devconf".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tweetwall=info".parse()?)
                .add_directive("console_wall=debug".parse()?),
        )
        .init();

    let store = Arc::new(MemoryStore::with_events(&[event_name.as_str()]).await);
    let source = LoopbackSource::new();

    let controller = Arc::new(StreamController::new(
        ControllerConfig::for_event(event_name.clone()),
        Arc::new(source.clone()),
        store.clone(),
        store.clone(),
    ));
    let gateway = Arc::new(BroadcastGateway::new(
        GatewayConfig::default().default_feed_limit(10),
        Arc::clone(&controller),
        store.clone(),
    ));
    let relay = gateway.spawn_relay();
    let retention = spawn_retention_task(
        store.clone(),
        RetentionConfig::default().sweep_interval(Duration::from_secs(60)),
    );

    let mut viewer = gateway
        .join()
        .await
        .ok_or("gateway refused the viewer")?;

    gateway
        .handle_command(
            viewer.id,
            ViewerCommand::AddTrack {
                keyword: "rustlang".into(),
            },
        )
        .await?;
    println!("Stream {} with filter {:?}", controller.status(), source.active_filter());

    for payload in sample_payloads() {
        source.push_json(&payload).await;
    }
    // Let the ingest task catch up
    tokio::time::sleep(Duration::from_millis(200)).await;

    if let Some(post) = store.last_post().await? {
        gateway
            .handle_command(viewer.id, ViewerCommand::ToggleSticky { id: post.id })
            .await?;
    }
    gateway
        .handle_command(
            viewer.id,
            ViewerCommand::RequestFeed {
                event: event_name.clone(),
                limit: None,
            },
        )
        .await?;

    println!("Viewer {} received:", viewer.id);
    for event in viewer.drain() {
        print_event(&event);
    }

    let ingest = controller.stats().snapshot();
    let fanout = gateway.stats().snapshot();
    println!(
        "Stats: received={} stored={} duplicates={} malformed={} broadcasts={} delivered={}",
        ingest.received,
        ingest.stored,
        ingest.duplicates,
        ingest.malformed,
        fanout.broadcasts,
        fanout.delivered,
    );

    controller.stop().await?;
    relay.abort();
    retention.abort();
    Ok(())
}
