//! Lobby Simulator CLI Tool
//!
//! Drives the lobby service in-process with simulated players to exercise
//! the lifecycle end to end: filling a lobby, readying up or letting the
//! ready-up expire, and chatting with logs written to disk.
//!
//! Usage:
//!   cargo run --bin lobby-sim -- --help
//!   cargo run --bin lobby-sim start --lobby 6s
//!   cargo run --bin lobby-sim timeout --lobby ultiduo --timeout 2
//!   cargo run --bin lobby-sim chat --messages 30 --logs-dir /tmp/chatlogs
//!   cargo run --bin lobby-sim run-all

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use ready_room::broadcast::{ChannelConnection, OutboundEvent};
use ready_room::config::AppConfig;
use ready_room::lobby::{InMemoryLobbyStore, LobbyState};
use ready_room::player::InMemoryPlayerDirectory;
use ready_room::service::AppState;
use ready_room::types::{LobbyType, Player, PlayerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "lobby-sim")]
#[command(about = "Simulate players moving through lobbies against an in-process lobby service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory for chat logs; chat logging is off when omitted
    #[arg(long, global = true)]
    logs_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a lobby and ready every player until the game starts
    Start {
        /// Lobby type (debug, 6s, highlander, 4v4, ultiduo, bball)
        #[arg(short, long, default_value = "6s")]
        lobby: String,
    },
    /// Fill a lobby and let the ready-up expire
    Timeout {
        /// Lobby type (debug, 6s, highlander, 4v4, ultiduo, bball)
        #[arg(short, long, default_value = "ultiduo")]
        lobby: String,
        /// Ready-up window in seconds
        #[arg(short, long, default_value = "2")]
        timeout: u64,
    },
    /// Send chat messages into a lobby and replay its scrollback
    Chat {
        /// Number of messages to send
        #[arg(short, long, default_value = "30")]
        messages: usize,
    },
    /// Run every scenario
    RunAll,
}

struct Simulation {
    app: AppState,
    directory: Arc<InMemoryPlayerDirectory>,
    inboxes: Vec<(PlayerId, UnboundedReceiver<OutboundEvent>)>,
}

impl Simulation {
    async fn new(logs_dir: Option<&str>, ready_up_seconds: u64) -> Result<Self> {
        let mut config = AppConfig::default();
        config.metrics.enabled = false;
        config.lobby.ready_up_timeout_seconds = ready_up_seconds;
        match logs_dir {
            Some(dir) => {
                config.chat.logs_dir = dir.to_string();
                config.chat.global_log_dir = dir.to_string();
            }
            None => config.chat.logs_enabled = false,
        }

        let directory = Arc::new(InMemoryPlayerDirectory::new());
        let mut app = AppState::with_collaborators(
            config,
            Arc::new(InMemoryLobbyStore::new()),
            directory.clone(),
        )
        .await?;
        app.start().await?;

        Ok(Self {
            app,
            directory,
            inboxes: Vec::new(),
        })
    }

    async fn connect_player(&mut self, index: usize) -> Result<PlayerId> {
        let steam_id = format!("7656119800000{:04}", index);
        self.directory
            .insert(Player::new(steam_id.clone(), format!("player{}", index)));
        let (conn, rx) = ChannelConnection::new();
        self.app
            .lobby_manager()
            .connect(Some(&steam_id), Arc::new(conn))
            .await?;
        self.inboxes.push((steam_id.clone(), rx));
        Ok(steam_id)
    }

    /// Create a lobby and put one simulated player in every slot
    async fn fill(&mut self, lobby_type: LobbyType) -> Result<(u64, Vec<PlayerId>)> {
        let creator = self.connect_player(0).await?;
        let manager = self.app.lobby_manager().clone();
        let lobby = manager
            .create_lobby(&creator, lobby_type, "cp_process_final", "etf2l")
            .await?;
        println!("Created {} lobby #{}", lobby_type, lobby.id);

        let mut players = Vec::new();
        for (i, slot) in lobby.slots.iter().enumerate() {
            let steam_id = if i == 0 {
                creator.clone()
            } else {
                self.connect_player(i).await?
            };
            manager
                .join(&steam_id, lobby.id, &slot.team.to_string(), &slot.class)
                .await?;
            players.push(steam_id);
        }

        let state = manager.get_lobby(lobby.id).await?.state();
        println!("Filled {} slots, lobby is {:?}", players.len(), state);
        Ok((lobby.id, players))
    }

    fn count_events(&mut self, event: &str) -> usize {
        let mut count = 0;
        for (_, rx) in self.inboxes.iter_mut() {
            while let Ok(received) = rx.try_recv() {
                if received.event == event {
                    count += 1;
                }
            }
        }
        count
    }

    async fn finish(mut self) -> Result<()> {
        self.app.shutdown().await?;
        Ok(())
    }
}

async fn run_start(logs_dir: Option<&str>, lobby_type: LobbyType) -> Result<bool> {
    let mut sim = Simulation::new(logs_dir, 30).await?;
    let (lobby_id, players) = sim.fill(lobby_type).await?;

    let manager = sim.app.lobby_manager().clone();
    let mut started = false;
    for steam_id in &players {
        started = manager.ready(steam_id, lobby_id).await?;
    }

    let starts = sim.count_events("lobbyStart");
    println!(
        "Lobby #{} started: {}, lobbyStart delivered to {} players",
        lobby_id, started, starts
    );
    let state = manager.get_lobby(lobby_id).await?.state();
    sim.finish().await?;
    Ok(started && state == LobbyState::InProgress && starts == players.len())
}

async fn run_timeout(logs_dir: Option<&str>, lobby_type: LobbyType, timeout: u64) -> Result<bool> {
    let mut sim = Simulation::new(logs_dir, timeout).await?;
    let (lobby_id, players) = sim.fill(lobby_type).await?;

    let manager = sim.app.lobby_manager().clone();
    if let Some(first) = players.first() {
        manager.ready(first, lobby_id).await?;
        println!("One player readied, waiting {}s for the ready-up to expire...", timeout);
    }
    tokio::time::sleep(Duration::from_secs(timeout) + Duration::from_millis(500)).await;

    let lobby = manager.get_lobby(lobby_id).await?;
    println!(
        "Lobby #{} is {:?} with {} players seated",
        lobby_id,
        lobby.state(),
        lobby.players().len()
    );
    let expired = lobby.state() == LobbyState::Waiting && lobby.players().is_empty();
    sim.finish().await?;
    Ok(expired)
}

async fn run_chat(logs_dir: Option<&str>, messages: usize) -> Result<bool> {
    let mut sim = Simulation::new(logs_dir, 30).await?;
    let (lobby_id, players) = sim.fill(LobbyType::Debug).await?;
    let chat = sim.app.chat_service();

    for i in 0..messages {
        let sender = &players[i % players.len()];
        chat.send(sender, lobby_id, &format!("message {}", i)).await?;
    }

    let (viewer, mut rx) = ChannelConnection::new();
    chat.replay(lobby_id, &viewer);
    let mut replayed = 0;
    while let Ok(event) = rx.try_recv() {
        if event.event == "chatReceive" {
            replayed += 1;
        }
    }
    println!("Sent {} messages, scrollback replayed {}", messages, replayed);

    if logs_dir.is_some() {
        let path = sim.app.chat_logger().room_log_path(lobby_id);
        sim.app.chat_logger().stop_logger(lobby_id).await;
        let lines = std::fs::read_to_string(&path)?.lines().count();
        println!("{} holds {} lines", path.display(), lines);
    }

    sim.finish().await?;
    Ok(replayed == messages.min(20))
}

fn report(name: &str, result: Result<bool>) -> bool {
    match result {
        Ok(true) => {
            println!("'{}' PASSED\n", name);
            true
        }
        Ok(false) => {
            println!("'{}' FAILED\n", name);
            false
        }
        Err(e) => {
            println!("'{}' FAILED ({})\n", name, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let logs_dir = cli.logs_dir.as_deref();

    let passed = match cli.command {
        Commands::Start { lobby } => {
            let lobby_type: LobbyType = lobby.parse().map_err(|e| anyhow!("{}", e))?;
            report("start", run_start(logs_dir, lobby_type).await)
        }
        Commands::Timeout { lobby, timeout } => {
            let lobby_type: LobbyType = lobby.parse().map_err(|e| anyhow!("{}", e))?;
            report("timeout", run_timeout(logs_dir, lobby_type, timeout).await)
        }
        Commands::Chat { messages } => report("chat", run_chat(logs_dir, messages).await),
        Commands::RunAll => {
            let results = [
                report("start", run_start(logs_dir, LobbyType::Sixes).await),
                report("timeout", run_timeout(logs_dir, LobbyType::Ultiduo, 1).await),
                report("chat", run_chat(logs_dir, 30).await),
            ];
            let passed = results.iter().filter(|r| **r).count();
            println!("Results: {} passed, {} failed", passed, results.len() - passed);
            passed == results.len()
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
