//! Performance benchmarks for the movement validators

use server::collision::BoxWorld;
use server::config::ServerConfig;
use server::entity::Player;
use server::movement::{handle_move, MoveOutcome};
use server::physics::{move_entity, no_blocks_around};
use server::session::Session;
use server::teleport::{AckOutcome, TeleportReconciler};
use shared::{BlockPos, MoveIntent, Packet, RelativeFlags, Vec3, STEP_HEIGHT};
use std::time::Instant;

/// Floor plus a field of single-block pillars, so sweeps have work to do.
fn cluttered_world() -> BoxWorld {
    let mut world = BoxWorld::flat(64.0, 200.0);
    for x in (-40..40).step_by(4) {
        for z in (-40..40).step_by(4) {
            world.add_block(BlockPos::new(x, 64, z));
        }
    }
    world
}

/// Benchmarks swept collision against a cluttered world
#[test]
fn benchmark_move_entity() {
    let world = cluttered_world();
    let player = Player::new(1, Vec3::new(0.5, 64.0, 2.5));

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let delta = Vec3::new(0.3 * ((i % 7) as f64 - 3.0), -0.08, 0.25);
        let result = move_entity(&world, player.bounding_box(), delta, STEP_HEIGHT);
        assert!(result.applied.is_finite());
    }

    let duration = start.elapsed();
    println!(
        "Swept collision: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the surroundings query used by the floating check
#[test]
fn benchmark_no_blocks_around() {
    let world = cluttered_world();
    let hovering = Player::new(1, Vec3::new(1.5, 66.0, 1.5));

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(no_blocks_around(&world, &hovering.bounding_box()));
    }

    let duration = start.elapsed();
    println!(
        "Surroundings query: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks full move validation for a walking player
#[test]
fn benchmark_handle_move() {
    let world = cluttered_world();
    let config = ServerConfig::default();
    let mut player = Player::new(1, Vec3::new(2.0, 64.0, 2.0));
    let addr = "127.0.0.1:40000".parse().unwrap();
    let mut session = Session::new(1, addr, player.id, false, &config, 0);

    let iterations = 5_000;
    let start = Instant::now();

    for tick in 0..iterations {
        session.begin_tick(tick, tick * 50, &player, None);
        // Walk back and forth between two pillars.
        let x = if (tick / 5) % 2 == 0 {
            player.pos.x + 0.2
        } else {
            player.pos.x - 0.2
        };
        let intent = MoveIntent::position(x, 64.0, 2.0, true);
        let outcome = handle_move(&mut session, &mut player, &world, &config, intent).unwrap();
        assert!(matches!(outcome, MoveOutcome::Accepted));
    }

    let duration = start.elapsed();
    println!(
        "Move validation: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks correction issue and acknowledgment
#[test]
fn benchmark_teleport_round_trip() {
    let mut reconciler = TeleportReconciler::new();
    let mut player = Player::new(1, Vec3::new(0.0, 64.0, 0.0));

    let iterations = 100_000;
    let start = Instant::now();

    for tick in 0..iterations {
        let packet = reconciler.issue(
            &mut player,
            Vec3::new(1.0, 64.0, 1.0),
            0.0,
            0.0,
            RelativeFlags::NONE,
            tick,
        );
        let Packet::PlayerPosition { teleport_id, .. } = packet else {
            panic!("Expected a position packet");
        };
        assert!(matches!(
            reconciler.accept(teleport_id),
            AckOutcome::Accepted { .. }
        ));
    }

    let duration = start.elapsed();
    println!(
        "Teleport round trip: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks packet encoding used on every datagram
#[test]
fn benchmark_packet_serialization() {
    let packet = Packet::Move(MoveIntent::position(12.5, 64.0, -3.25, true));

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let data = bincode::serialize(&packet).unwrap();
        let decoded: Packet = bincode::deserialize(&data).unwrap();
        assert!(matches!(decoded, Packet::Move(_)));
    }

    let duration = start.elapsed();
    println!(
        "Packet encode/decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}
