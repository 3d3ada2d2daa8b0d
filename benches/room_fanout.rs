//! Performance benchmarks for chat scrollback and room fan-out

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ready_room::broadcast::{ChannelConnection, Connection, RoomBroadcaster};
use ready_room::chat::{ChatLogConfig, ChatLogger, ChatScrollback};
use ready_room::lobby::{InMemoryLobbyStore, LobbyManager, LobbyRegistry};
use ready_room::metrics::MetricsCollector;
use ready_room::player::InMemoryPlayerDirectory;
use ready_room::types::{LobbyType, Player, RoomName};
use ready_room::utils::SystemClock;
use std::sync::Arc;

const PAYLOAD: &str = r#"{"timestamp":1457179200,"message":"gl hf","room":1,"player":{"steamid":"76561198000000001","name":"sol"}}"#;

fn bench_scrollback(c: &mut Criterion) {
    let scrollback = ChatScrollback::new(20);

    c.bench_function("scrollback_append", |b| {
        b.iter(|| scrollback.append(black_box(1), PAYLOAD))
    });

    let (conn, mut rx) = ChannelConnection::new();
    c.bench_function("scrollback_replay_20", |b| {
        b.iter(|| {
            scrollback.replay(black_box(1), &conn);
            while rx.try_recv().is_ok() {}
        })
    });
}

fn bench_room_fanout(c: &mut Criterion) {
    let broadcaster = RoomBroadcaster::new(Arc::new(MetricsCollector::default()));
    let room = RoomName::public(1);

    // A full highlander lobby plus spectators
    let mut receivers = Vec::new();
    for _ in 0..30 {
        let (conn, rx) = ChannelConnection::new();
        let conn = Arc::new(conn);
        broadcaster.connect(None, conn.clone());
        broadcaster.subscribe(&room, conn.id());
        receivers.push(rx);
    }

    c.bench_function("send_to_room_30_members", |b| {
        b.iter(|| {
            black_box(broadcaster.send_to_room(&room, "chatReceive", PAYLOAD));
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

fn create_bench_manager(directory: Arc<InMemoryPlayerDirectory>) -> LobbyManager {
    let metrics = Arc::new(MetricsCollector::default());
    let logger = ChatLogger::new(
        ChatLogConfig {
            enabled: false,
            ..ChatLogConfig::default()
        },
        Arc::new(SystemClock),
        metrics.clone(),
    );
    LobbyManager::new(
        Arc::new(LobbyRegistry::new(Arc::new(InMemoryLobbyStore::new()))),
        Arc::new(RoomBroadcaster::new(metrics.clone())),
        Arc::new(ChatScrollback::new(20)),
        Arc::new(logger),
        directory,
        metrics,
    )
}

fn bench_fill_and_start(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let directory = Arc::new(InMemoryPlayerDirectory::new());
    let players: Vec<String> = (0..12)
        .map(|i| format!("7656119800000{:04}", i))
        .collect();
    for (i, steam_id) in players.iter().enumerate() {
        directory.insert(Player::new(steam_id.clone(), format!("player{}", i)));
    }

    c.bench_function("sixes_fill_and_start", |b| {
        b.iter(|| {
            rt.block_on(async {
                let manager = create_bench_manager(directory.clone());
                let lobby = manager
                    .create_lobby(&players[0], LobbyType::Sixes, "cp_process_final", "etf2l")
                    .await
                    .unwrap();
                for (slot, steam_id) in lobby.slots.iter().zip(&players) {
                    manager
                        .join(steam_id, lobby.id, &slot.team.to_string(), &slot.class)
                        .await
                        .unwrap();
                }
                for steam_id in &players {
                    black_box(manager.ready(steam_id, lobby.id).await.unwrap());
                }
            })
        })
    });
}

criterion_group!(
    benches,
    bench_scrollback,
    bench_room_fanout,
    bench_fill_and_start
);
criterion_main!(benches);
