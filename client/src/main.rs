use clap::Parser;
use client::game::Misbehaviour;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Radius of the circle the bot walks
    #[arg(short = 'r', long, default_value = "4.0")]
    radius: f64,

    /// Multiply every step by this factor
    #[arg(long, default_value = "1.0")]
    speed_multiplier: f64,

    /// Climb into the air and hover
    #[arg(long)]
    hover: bool,

    /// Moves sent per second
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Stop after this many seconds
    #[arg(short = 'd', long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let behaviour = Misbehaviour {
        speed_multiplier: args.speed_multiplier,
        hover: args.hover,
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    if behaviour != Misbehaviour::default() {
        info!("Misbehaving: {:?}", behaviour);
    }

    let mut client = Client::new(
        &args.server,
        args.fake_ping,
        args.radius,
        behaviour,
        args.tick_rate,
    )
    .await?;

    client.run(args.duration_secs.map(Duration::from_secs)).await?;

    Ok(())
}
