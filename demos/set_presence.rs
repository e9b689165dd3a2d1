//! Set Presence - publish a status and answer join requests.
//!
//! This example demonstrates:
//! - Starting a client with closure handlers
//! - Publishing a presence with timestamps, assets, party and secrets
//! - Pumping callbacks from the application loop
//! - Accepting join requests with `respond`
//!
//! # Running
//!
//! Start the chat client, then:
//!
//! ```text
//! RUST_LOG=presence_ipc=debug cargo run --example set_presence -- <app id>
//! ```

use std::sync::mpsc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use presence_ipc::handler::Handlers;
use presence_ipc::{ActivityType, Client, PartyPrivacy, Reply, RichPresence};
use tracing_subscriber::EnvFilter;

fn main() -> presence_ipc::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "345229890980937739".to_string());

    let (requests_tx, requests_rx) = mpsc::channel::<String>();
    let handlers = Handlers::new()
        .on_ready(|user| println!("connected as {} ({})", user.username, user.user_id))
        .on_disconnected(|code, message| println!("disconnected ({code}): {message}"))
        .on_errored(|code, message| println!("error ({code}): {message}"))
        .on_join_game(|secret| println!("join game with secret {secret}"))
        .on_spectate_game(|secret| println!("spectate game with secret {secret}"))
        .on_join_request(move |user| {
            println!("{} asked to join", user.username);
            let _ = requests_tx.send(user.user_id.clone());
        });

    let mut client = Client::initialize(&app_id, handlers, false, None)?;

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default();

    client.update_presence(&RichPresence {
        activity_type: ActivityType::Playing,
        state: "In a group".into(),
        details: "Ranked match".into(),
        start_timestamp: started,
        large_image_key: "canary-large".into(),
        large_image_text: "Numbani".into(),
        small_image_key: "ptb-small".into(),
        party_id: "party1234".into(),
        party_size: 1,
        party_max: 6,
        party_privacy: PartyPrivacy::Public,
        join_secret: "MTI4NzM0OjFpMmhuZToxMjMxMjM=".into(),
        ..Default::default()
    })?;

    for _ in 0..600 {
        client.run_callbacks();
        while let Ok(user_id) = requests_rx.try_recv() {
            if let Err(e) = client.respond(&user_id, Reply::Yes) {
                println!("could not answer {user_id}: {e}");
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    client.clear_presence()?;
    std::thread::sleep(Duration::from_millis(200));
    client.shutdown();
    Ok(())
}
