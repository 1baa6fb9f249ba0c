use pairplay_p2p::{ConnectionStatus, EngineConfig, WebRtcConnector, WebRtcSync};
use std::io::{self, BufRead, Write};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    print!("📋 Paste the host's room code: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin().lock().read_line(&mut code)?;

    let sync = WebRtcSync::new(WebRtcConnector::new(), EngineConfig::default());
    sync.on_game_state(|state| println!("📥 Host state: {state}"));
    sync.on_reset(|| println!("🔄 Host reset the game"));

    sync.join_room(&code).await;
    if sync.status() != ConnectionStatus::Waiting {
        return Err(sync.error_message().unwrap_or_default().into());
    }

    println!("✅ Send this answer code back to the host:\n");
    println!("{}\n", sync.local_code());

    let state = sync
        .engine()
        .wait_for(|s| s.status != ConnectionStatus::Waiting)
        .await;
    if !state.is_connected() {
        return Err(state.error_message().unwrap_or_else(|| "disconnected".into()).into());
    }
    println!("🔗 Connected");

    let mut interval = tokio::time::interval(Duration::from_secs(3));
    let mut col = 0u8;
    while sync.status() == ConnectionStatus::Connected {
        interval.tick().await;
        sync.send_action(&serde_json::json!({ "col": col }));
        col = (col + 1) % 7;
    }

    println!("🔴 Session ended");
    Ok(())
}
