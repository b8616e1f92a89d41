//! Performance benchmarks for the hot paths of a match

use host::game::Simulation;
use host::physics;
use remote::game::Mirror;
use shared::{
    decode_frame, encode_frame, ControlEdges, ControlState, InputKind, Message, RemoteInput,
    REMOTE_PLAYER_ID,
};
use std::sync::Arc;
use std::time::Instant;

/// Benchmarks framing of full state snapshots
#[test]
fn benchmark_snapshot_framing() {
    let mut sim = Simulation::new(5);
    sim.participant_joined().unwrap();
    let message = Message::State(sim.snapshot());

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = encode_frame(&message).unwrap();
        let (decoded, used) = decode_frame(&frame).unwrap();
        assert_eq!(used, frame.len());
        assert!(matches!(decoded, Message::State(_)));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot framing: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding a long stream of back-to-back input frames
#[test]
fn benchmark_input_stream_decoding() {
    let kinds = [
        InputKind::MoveUp,
        InputKind::Stop,
        InputKind::MoveDown,
        InputKind::ForcePush,
    ];
    let mut stream = Vec::new();
    for i in 0..5_000 {
        let input = RemoteInput::new(kinds[i % kinds.len()]);
        stream.extend(encode_frame(&Message::Input(input)).unwrap());
    }

    let start = Instant::now();
    let mut offset = 0;
    let mut count = 0;
    while offset < stream.len() {
        let (message, used) = decode_frame(&stream[offset..]).unwrap();
        match message {
            Message::Input(input) => assert_eq!(input.player_id, REMOTE_PLAYER_ID),
            other => panic!("unexpected {}", other.kind()),
        }
        offset += used;
        count += 1;
    }

    let duration = start.elapsed();
    println!("Input decoding: {} frames in {:?}", count, duration);

    assert_eq!(count, 5_000);
    // Should complete in under 500ms
    assert!(duration.as_millis() < 500);
}

/// Benchmarks the authoritative tick with both players moving
#[test]
fn benchmark_simulation_ticks() {
    let mut sim = Simulation::new(u32::MAX);
    sim.participant_joined().unwrap();

    let ticks = 60 * 60 * 5;
    let dt = 1.0 / 60.0;
    let start = Instant::now();

    for i in 0..ticks {
        if i % 30 == 0 {
            let (host, remote) = if (i / 30) % 2 == 0 {
                (InputKind::MoveUp, InputKind::MoveDown)
            } else {
                (InputKind::MoveDown, InputKind::MoveUp)
            };
            sim.queue_local_input(host);
            sim.queue_remote_input(RemoteInput::new(remote)).unwrap();
        }
        sim.tick(dt).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Simulation: {} ticks in {:?} ({:.2} μs/tick)",
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert_eq!(sim.tick_count(), ticks as u64);
    // Five minutes of play should simulate in well under a second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks raw ball stepping against both paddles
#[test]
fn benchmark_ball_physics() {
    let paddles = physics::initial_paddles();
    let mut ball = physics::serve_toward(REMOTE_PLAYER_ID);
    let mut points = 0;

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        if physics::step_ball(&mut ball, &paddles, 1.0 / 120.0).is_some() {
            points += 1;
            ball = physics::serve_toward(REMOTE_PLAYER_ID);
        }
    }

    let duration = start.elapsed();
    println!(
        "Ball physics: {} steps in {:?}, {} points",
        iterations, duration, points
    );

    // Should complete in under 200ms
    assert!(duration.as_millis() < 200);
}

/// Benchmarks the mirror under a flood of interleaved old and new snapshots
#[test]
fn benchmark_mirror_apply() {
    let mut sim = Simulation::new(u32::MAX);
    sim.participant_joined().unwrap();
    let snapshots: Vec<_> = (0..1_000).filter_map(|_| sim.tick(1.0 / 60.0)).collect();

    let mut mirror = Mirror::new();
    let start = Instant::now();
    let mut applied = 0;

    for round in 0..10 {
        for (i, snapshot) in snapshots.iter().enumerate() {
            // Every other delivery is a stale duplicate.
            let stale = &snapshots[i.saturating_sub(1)];
            if mirror.apply(Arc::clone(stale)) {
                applied += 1;
            }
            if mirror.apply(Arc::clone(snapshot)) {
                applied += 1;
            }
        }
        assert_eq!(mirror.last_tick(), Some(1_000), "round {}", round);
    }

    let duration = start.elapsed();
    println!("Mirror: {} applied in {:?}", applied, duration);

    assert_eq!(applied, 1_000);
    // Should complete in under 100ms
    assert!(duration.as_millis() < 100);
}

/// Stress tests edge detection with rapidly changing controls
#[test]
fn stress_test_control_edges() {
    let mut edges = ControlEdges::new();
    let mut events = 0;

    let start = Instant::now();
    for i in 0..100_000u32 {
        let state = ControlState {
            up: i % 4 == 0,
            down: i % 4 == 2,
            force: i % 10 == 0,
            pause: false,
            restart: false,
        };
        events += edges.update(state).len();
    }

    let duration = start.elapsed();
    println!("Control edges: {} events in {:?}", events, duration);

    assert!(events > 0);
    // Should complete in under 100ms
    assert!(duration.as_millis() < 100);
}
