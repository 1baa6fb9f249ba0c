use pairplay_p2p::{ConnectionStatus, EngineConfig, WebRtcConnector, WebRtcSync};
use std::io::{self, BufRead, Write};
use std::time::Duration;

fn read_code(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let sync = WebRtcSync::new(WebRtcConnector::new(), EngineConfig::default());
    sync.on_action(|action| println!("📥 Guest action: {action}"));

    sync.create_room().await;
    if sync.status() != ConnectionStatus::Waiting {
        return Err(sync.error_message().unwrap_or_default().into());
    }

    println!("✅ Room created. Send this code to the guest:\n");
    println!("{}\n", sync.local_code());

    let answer = read_code("📋 Paste the guest's answer code: ")?;
    sync.complete_connection(&answer).await;

    let state = tokio::time::timeout(
        Duration::from_secs(30),
        sync.engine().wait_for(|s| {
            matches!(s.status, ConnectionStatus::Connected | ConnectionStatus::Failed)
        }),
    )
    .await?;
    if !state.is_connected() {
        return Err(state.error_message().unwrap_or_default().into());
    }
    println!("🔗 Connected as {}", state.role.map(|r| r.to_string()).unwrap_or_default());

    // Host owns even turns
    let mut interval = tokio::time::interval(Duration::from_secs(2));
    for turn in 0u32..10 {
        interval.tick().await;
        if sync.status() != ConnectionStatus::Connected {
            println!("🔴 Guest left");
            break;
        }
        if sync.is_my_turn(&(turn % 2), &0, &1) {
            sync.send_game_state(&serde_json::json!({ "turn": turn }));
            println!("📤 Sent state for turn {turn}");
        }
        sync.send_ping();
        if let Some(rtt) = sync.last_round_trip() {
            println!("⏱️  Round trip {rtt:?}");
        }
    }

    sync.disconnect();
    Ok(())
}
