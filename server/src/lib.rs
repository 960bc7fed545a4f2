//! # Movement Authority Server
//!
//! This library provides an authoritative server that validates what clients
//! claim about their own movement. Clients send where they think they are;
//! the server simulates the same move against its world, and either accepts
//! the claim or sends a position correction the client must acknowledge.
//!
//! ## Core Responsibilities
//!
//! ### Movement Validation
//! Every move intent passes a fixed pipeline: value sanity, pending
//! correction, speed budget, collision simulation and divergence check. A
//! rejected move is answered with a correction, never silently dropped.
//!
//! ### Correction Handshake
//! Corrections carry a wrapping id. Until the client acknowledges the newest
//! id every move intent is ignored, and the correction is resent on a fixed
//! tick schedule.
//!
//! ### Session Health
//! Sessions are challenged with keep-alives, watched for hovering and drop
//! spam, and closed with a categorised reason when they misbehave.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Tick Loop
//! Network tasks only decode datagrams and queue them. All intents are applied
//! inside the tick, one session at a time in id order, so no validation ever
//! races with the simulation.
//!
//! ### UDP-Based Communication
//! Packets are bincode-encoded [`shared::Packet`] values, one per datagram.
//!
//! ## Module Organization
//!
//! - `session` / `session_manager`: per-connection state and its registry
//! - `dispatcher`: the tick driver routing intents to handlers
//! - `movement` / `vehicle`: player and vehicle move validation
//! - `teleport`: correction issue, acknowledgment and resend
//! - `liveness`: keep-alive challenges and ping estimation
//! - `physics` / `collision`: swept AABB movement against a box world
//! - `game` / `entity`: the authoritative world and its entities
//! - `network`: UDP tasks and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::collision::BoxWorld;
//! use server::config::ServerConfig;
//! use server::game::GameState;
//! use server::network::Server;
//! use shared::Vec3;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let world = BoxWorld::flat(64.0, 256.0);
//!     let game = GameState::new(world, Vec3::new(0.0, 64.0, 0.0), 0.0);
//!
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default(), game).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod collision;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod game;
pub mod liveness;
pub mod movement;
pub mod network;
pub mod physics;
pub mod session;
pub mod session_manager;
pub mod teleport;
pub mod utils;
pub mod vehicle;
