//! # Headless Test Client
//!
//! A bot that connects to the movement authority server and walks in a circle.
//! It is used to exercise the server's validators by hand and from the
//! integration tests.
//!
//! ## Behaviour
//!
//! The bot waits for the server to place it with the initial position
//! correction, acknowledges it, and then sends one move intent per tick. Every
//! later correction is adopted and acknowledged immediately. Keep-alive
//! challenges are echoed back and opened screens are closed.
//!
//! Two switches make the bot misbehave on purpose: a speed multiplier that
//! makes each step longer than walking allows, and hovering, which climbs off
//! the ground and stays there until the server kicks it.
//!
//! ## Module Organization
//!
//! - `game`: the bot's local position and the move intents it produces
//! - `network`: UDP socket handling and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::Misbehaviour;
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut client =
//!         Client::new("127.0.0.1:8080", 0, 4.0, Misbehaviour::default(), 20).await?;
//!     client.run(Some(Duration::from_secs(10))).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
