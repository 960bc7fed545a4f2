use clap::Parser;
use log::info;
use server::collision::{BoxWorld, Portal};
use server::config::ServerConfig;
use server::entity::VehicleKind;
use server::game::GameState;
use server::network::Server;
use shared::{Aabb, BlockPos, Vec3};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds between keep-alive challenges
    #[arg(long, default_value = "15")]
    keep_alive_secs: u64,

    /// Do not kick players for hovering
    #[arg(long)]
    allow_flight: bool,

    /// Skip speed checks and keep-alive timeouts for loopback clients
    #[arg(long)]
    trust_local: bool,

    /// Kick players idle for this many minutes (0 disables)
    #[arg(long, default_value = "0")]
    idle_minutes: u64,

    /// Block radius around spawn protected from edits (0 disables)
    #[arg(long, default_value = "16")]
    spawn_protection: i32,

    /// Players spawn within this many blocks of the spawn point
    #[arg(long, default_value = "0")]
    spawn_radius: f64,
}

/// Flat floor at y=64 with a few pillars, a pond, a step to climb and a pair
/// of portals between dimensions 0 and 1.
fn demo_world() -> BoxWorld {
    let mut world = BoxWorld::flat(64.0, 128.0);

    for (x, z) in [(8, 8), (-8, 8), (8, -8), (-8, -8)] {
        for y in 64..68 {
            world.add_block(BlockPos::new(x, y, z));
        }
    }
    for x in 4..8 {
        world.add_block(BlockPos::new(x, 64, 0));
    }
    world.add_fluid(Aabb::new(
        Vec3::new(-20.0, 64.0, -4.0),
        Vec3::new(-12.0, 65.0, 4.0),
    ));
    world.add_portal(Portal {
        region: BlockPos::new(20, 64, 20).bounds(),
        dimension: 1,
        exit: Vec3::new(60.5, 64.0, 60.5),
    });
    world.add_portal(Portal {
        region: BlockPos::new(60, 64, 64).bounds(),
        dimension: 0,
        exit: Vec3::new(20.5, 64.0, 17.5),
    });

    world
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        keep_alive_interval: Duration::from_secs(args.keep_alive_secs),
        allow_flight: args.allow_flight,
        trust_local_sessions: args.trust_local,
        idle_timeout: (args.idle_minutes > 0).then(|| Duration::from_secs(args.idle_minutes * 60)),
        spawn_protection_radius: args.spawn_protection,
        spawn_radius: args.spawn_radius,
        ..Default::default()
    };
    config.validate()?;

    let spawn = Vec3::new(0.0, 64.0, 0.0);
    let mut game = GameState::new(demo_world(), spawn, config.spawn_radius);
    game.spawn_vehicle(VehicleKind::Boat, Vec3::new(-16.0, 64.0, 0.0));
    game.spawn_vehicle(VehicleKind::Horse, Vec3::new(0.0, 64.0, 12.0));
    game.spawn_vehicle(VehicleKind::Minecart, Vec3::new(0.0, 64.0, -12.0));

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting server on {} at {} Hz", address, config.tick_rate);
    if config.allow_flight {
        info!("Flight is allowed; hovering players are not kicked");
    }

    let mut server = Server::new(&address, config, game).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
