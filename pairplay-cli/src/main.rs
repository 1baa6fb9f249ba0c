use clap::{Args, Parser, Subcommand};
use pairplay_cli::application::HELP;
use pairplay_cli::infrastructure::clipboard::{present_code, unframe, PasteBuffer};
use pairplay_cli::{
    CliError, CommandError, ConsoleCommand, Inbound, LogConfig, Result, SessionRuntime,
    SessionSnapshot,
};
use pairplay_p2p::{
    ConnectionStatus, EngineConfig, IceServer, LocalCode, WebRtcConnector, WebRtcSync,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "pairplay")]
#[command(
    version,
    about = "Two-player rooms over WebRTC, connected by exchanging two codes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging for pairplay crates
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room and wait for a guest
    Host {
        #[command(flatten)]
        network: NetworkArgs,
    },

    /// Join a room from the host's code
    Join {
        /// Room code (prompted for when omitted)
        #[arg(short, long)]
        code: Option<String>,

        #[command(flatten)]
        network: NetworkArgs,
    },

    /// Decode a room or answer code and print the session description
    Inspect {
        /// Code to decode
        code: String,
    },
}

#[derive(Args, Debug, Default)]
struct NetworkArgs {
    /// STUN server URL (repeatable, replaces the default public server)
    #[arg(long = "stun", value_name = "URL")]
    stun: Vec<String>,

    /// TURN server URL (optional, format: turn:host:port)
    #[arg(long)]
    turn_server: Option<String>,

    /// TURN username (required if turn-server is set)
    #[arg(long)]
    turn_username: Option<String>,

    /// TURN credential (required if turn-server is set)
    #[arg(long)]
    turn_credential: Option<String>,

    /// How long to wait for ICE candidates before emitting a code
    #[arg(long, default_value_t = 5000)]
    ice_timeout_ms: u64,

    /// Never touch the clipboard, only print codes
    #[arg(long)]
    no_clipboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::for_verbosity(cli.verbose);
    #[cfg(feature = "console")]
    let log_config = log_config.with_console();
    log_config.init()?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Commands::Host { network } => {
            let config = build_config(&network)?;
            host(config, !network.no_clipboard, &mut input).await
        }
        Commands::Join { code, network } => {
            let config = build_config(&network)?;
            join(config, code, !network.no_clipboard, &mut input).await
        }
        Commands::Inspect { code } => inspect(&code),
    }
}

fn build_config(network: &NetworkArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::new();

    if !network.stun.is_empty() {
        config = config.with_ice_servers(network.stun.iter().map(IceServer::stun).collect());
    }

    match (
        &network.turn_server,
        &network.turn_username,
        &network.turn_credential,
    ) {
        (None, None, None) => {}
        (Some(url), Some(username), Some(credential)) => {
            info!("Using TURN server: {}", url);
            config = config.with_turn_server(url, username, credential);
        }
        (None, _, _) => {
            return Err(CliError::InvalidConfig(
                "TURN username and credential require --turn-server".to_string(),
            ));
        }
        _ => {
            return Err(CliError::InvalidConfig(
                "TURN server requires both username and credential".to_string(),
            ));
        }
    }

    if network.ice_timeout_ms == 0 {
        return Err(CliError::InvalidConfig(
            "ICE timeout must be greater than zero".to_string(),
        ));
    }
    config = config.with_ice_gathering_timeout(Duration::from_millis(network.ice_timeout_ms));

    Ok(config)
}

async fn host(config: EngineConfig, clipboard: bool, input: &mut Input) -> Result<()> {
    let sync = WebRtcSync::new(WebRtcConnector::new(), config);

    info!("Creating room");
    sync.create_room().await;
    expect_status(&sync, ConnectionStatus::Waiting)?;

    println!();
    present_code(
        "✅ Room created. Send this code to your guest:",
        sync.local_code().as_str(),
        clipboard,
    );
    println!();

    let answer = read_code(input, "📋 Paste the guest's answer code, then press Enter:").await?;
    sync.complete_connection(&answer).await;

    await_connected(&sync).await?;
    run_console(sync, input).await
}

async fn join(
    config: EngineConfig,
    code: Option<String>,
    clipboard: bool,
    input: &mut Input,
) -> Result<()> {
    let code = match code {
        Some(code) => unframe(&code),
        None => read_code(input, "📋 Paste the host's room code, then press Enter:").await?,
    };

    let sync = WebRtcSync::new(WebRtcConnector::new(), config);

    info!("Joining room");
    sync.join_room(&code).await;
    expect_status(&sync, ConnectionStatus::Waiting)?;

    println!();
    present_code(
        "✅ Send this answer code back to the host:",
        sync.local_code().as_str(),
        clipboard,
    );
    println!();
    println!("Waiting for the host to connect...");

    await_connected(&sync).await?;
    run_console(sync, input).await
}

fn inspect(code: &str) -> Result<()> {
    let description = LocalCode::decode(&unframe(code))?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}

fn expect_status(sync: &WebRtcSync, expected: ConnectionStatus) -> Result<()> {
    if sync.status() == expected {
        Ok(())
    } else {
        Err(CliError::handshake(sync.error_message()))
    }
}

async fn read_code(input: &mut Input, prompt: &str) -> Result<String> {
    println!("{prompt}");

    let mut buffer = PasteBuffer::new();
    while let Some(line) = input.next_line().await? {
        if buffer.push_line(&line) {
            return Ok(buffer.into_code());
        }
    }

    Err(CliError::Interrupted)
}

async fn await_connected(sync: &WebRtcSync) -> Result<()> {
    let settled = sync.engine().wait_for(|state| {
        matches!(
            state.status,
            ConnectionStatus::Connected | ConnectionStatus::Failed | ConnectionStatus::Idle
        )
    });

    let state = tokio::select! {
        state = settled => state,
        _ = tokio::signal::ctrl_c() => {
            sync.disconnect();
            return Err(CliError::Interrupted);
        }
    };

    if !state.is_connected() {
        let reason = state
            .error_message()
            .unwrap_or_else(|| format!("connection ended while {}", state.status));
        return Err(CliError::Handshake(reason));
    }

    if let Some(role) = state.role {
        println!("🔗 Connected as {role}");
    }
    Ok(())
}

async fn run_console(sync: WebRtcSync, input: &mut Input) -> Result<()> {
    let (runtime, mut inbound) = SessionRuntime::spawn(sync);
    let mut snapshots = runtime.subscribe();
    let mut last_round_trip = runtime.snapshot().round_trip;

    println!("{HELP}");
    println!();

    let outcome = loop {
        tokio::select! {
            line = input.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    // stdin closed
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e.into()),
                };
                match line.parse::<ConsoleCommand>() {
                    Ok(cmd) if cmd.is_outbound() => {
                        if let Err(e) = runtime.submit_command(cmd).await {
                            break Err(e);
                        }
                    }
                    Ok(ConsoleCommand::Quit) => break Ok(()),
                    Ok(ConsoleCommand::Status) => print_status(&runtime.snapshot()),
                    Ok(_) => println!("{HELP}"),
                    Err(CommandError::Empty) => {}
                    Err(e) => println!("⚠️  {e}"),
                }
            }
            Some(message) = inbound.recv() => print_inbound(&message),
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Err(CliError::RuntimeStopped);
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.is_connected() {
                    match snapshot.error {
                        Some(error) => println!("🔴 Connection closed: {error}"),
                        None => println!("🔴 Peer left"),
                    }
                    break Ok(());
                }
                if snapshot.round_trip != last_round_trip {
                    last_round_trip = snapshot.round_trip;
                    if let Some(rtt) = last_round_trip {
                        println!("⏱️  Round trip {rtt:?}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Shutting down...");
                break Ok(());
            }
        }
    };

    runtime.shutdown().await;
    outcome
}

fn print_inbound(message: &Inbound) {
    match message {
        Inbound::State(state) => println!("📥 state  {state}"),
        Inbound::Action(action) => println!("📥 action {action}"),
        Inbound::Reset => println!("📥 reset"),
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    let role = snapshot
        .role
        .map(|role| role.to_string())
        .unwrap_or_else(|| "-".to_string());
    let rtt = snapshot
        .round_trip
        .map(|rtt| format!("{rtt:?}"))
        .unwrap_or_else(|| "not measured (try /ping)".to_string());

    println!("status: {}", snapshot.status);
    println!("role:   {role}");
    println!("rtt:    {rtt}");
    if let Some(error) = &snapshot.error {
        println!("error:  {error}");
    }
}
