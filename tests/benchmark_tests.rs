//! Performance benchmarks for the hot paths of the real-time layer

use server::connection::Connection;
use server::hub::Hub;
use server::map_groups::MapGroups;
use shared::{ClientCommand, GameClock, MapId, PlayerId, ServerEvent};
use std::time::Instant;

/// Benchmarks clock arithmetic over a long run of ticks
#[test]
fn benchmark_clock_advance() {
    let mut clock = GameClock::default();
    let start_minutes = clock.total_minutes();

    let iterations: u64 = 1_000_000;
    let start = Instant::now();

    for _ in 0..iterations {
        clock.advance(10);
    }

    let duration = start.elapsed();
    println!(
        "Clock advance: {} ticks in {:?} ({:.2} ns/tick)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(clock.total_minutes() - start_minutes, iterations * 10);
    assert!(clock.is_valid());
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding of inbound envelopes
#[test]
fn benchmark_command_decode() {
    let frames = [
        r#"{"type":"ping","data":{}}"#,
        r#"{"type":"player_move","data":{"pos_x":12,"pos_y":7,"direction":"left"}}"#,
        r#"{"type":"player_interact","data":{"target_x":3,"target_y":4}}"#,
        r#"{"type":"chat","data":{"text":"hello"},"target":"all"}"#,
    ];

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let command = ClientCommand::decode(frames[i % frames.len()]).unwrap();
        assert!(!matches!(command, ClientCommand::Unknown(_)));
    }

    let duration = start.elapsed();
    println!(
        "Command decode: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding of the most frequent outbound event
#[test]
fn benchmark_event_encode() {
    let event = ServerEvent::PlayerPositionUpdate {
        user_id: PlayerId::new_v4(),
        map_id: MapId::new_v4(),
        pos_x: 20,
        pos_y: 15,
        direction: shared::Direction::Up,
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let text = event.encode().unwrap();
        assert!(text.len() < shared::MAX_MESSAGE_SIZE);
    }

    let duration = start.elapsed();
    println!("Event encode: {} events in {:?}", iterations, duration);

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks map membership churn as players move between maps
#[test]
fn benchmark_map_group_churn() {
    let maps: Vec<MapId> = (0..10).map(|_| MapId::new_v4()).collect();
    let connections: Vec<Connection> = (0..1000)
        .map(|id| Connection::new(id, PlayerId::new_v4(), 1).0)
        .collect();
    let mut groups = MapGroups::new();

    let rounds = 10;
    let start = Instant::now();

    for round in 0..rounds {
        for (i, connection) in connections.iter().enumerate() {
            groups.join(connection, maps[(i + round) % maps.len()]);
        }
    }

    let duration = start.elapsed();
    println!(
        "Map group churn: {} joins in {:?}",
        rounds * connections.len(),
        duration
    );

    let total: usize = maps.iter().map(|map| groups.member_count(*map)).sum();
    assert_eq!(total, connections.len());

    for connection in &connections {
        groups.leave_current(connection.id());
    }
    assert_eq!(groups.group_count(), 0);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks hub fan-out of map broadcasts to many recipients
#[tokio::test]
async fn benchmark_hub_map_broadcast() {
    let (hub, handle, _queues) = Hub::new(64);
    hub.spawn();
    let map = MapId::new_v4();

    let recipients = 200;
    let broadcasts = 100;

    let mut receivers = Vec::new();
    for id in 0..recipients {
        let (connection, rx) = Connection::new(id, PlayerId::new_v4(), broadcasts + recipients as usize);
        handle.register(connection.clone());
        handle.join_map(connection.player_id(), map);
        receivers.push(rx);
    }
    handle.online_players().await;

    let event = ServerEvent::Pong { timestamp: 1 };
    let start = Instant::now();

    for _ in 0..broadcasts {
        handle.broadcast_to_map(map, &event);
    }
    handle.online_players().await;

    let duration = start.elapsed();
    println!(
        "Hub broadcast: {} x {} deliveries in {:?}",
        broadcasts, recipients, duration
    );

    for rx in &mut receivers {
        let mut pongs = 0;
        while let Ok(frame) = rx.try_recv() {
            if frame.contains("pong") {
                pongs += 1;
            }
        }
        assert_eq!(pongs, broadcasts);
    }
    assert_eq!(handle.online_players().await.len(), recipients as usize);
    assert!(duration.as_millis() < 5000);
}
