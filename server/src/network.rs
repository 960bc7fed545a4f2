//! Server network layer handling UDP communications and game loop coordination

use crate::config::ServerConfig;
use crate::dispatcher;
use crate::error::DisconnectReason;
use crate::game::GameState;
use crate::session::{Intent, Session, SessionEvent};
use crate::session_manager::SessionManager;
use crate::utils::get_timestamp;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
        received_ms: u64,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: SessionManager,
    game: GameState,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig, game: GameState) -> ServerResult<Self> {
        config.validate()?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions: SessionManager::new(config.max_clients),
            game,
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping the main loop with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            let message = ServerMessage::PacketReceived {
                                packet,
                                addr,
                                received_ms: get_timestamp(),
                            };
                            if let Err(e) = server_tx.send(message) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { packet, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> ServerResult<()> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Handles a datagram. Connection management happens here; everything
    /// else is queued on the owning session for the next tick.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, received_ms: u64) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let reason = DisconnectReason::OutdatedClient(PROTOCOL_VERSION);
                    self.send_packet(reason.to_packet(), addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.sessions.find_session_by_addr(addr) {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.finish_session(existing_id);
                }

                if self.sessions.is_full() {
                    self.send_packet(DisconnectReason::ServerFull.to_packet(), addr);
                    return;
                }

                let entity_id = self.game.add_player();
                let trusted = self.config.trust_local_sessions && addr.ip().is_loopback();
                let Some(client_id) =
                    self.sessions
                        .add_session(addr, entity_id, trusted, &self.config, received_ms)
                else {
                    self.game.remove_player(&entity_id);
                    return;
                };

                self.send_packet(Packet::Connected { client_id, entity_id }, addr);
                if let (Some(session), Some(player)) = (
                    self.sessions.get_mut(client_id),
                    self.game.players.get_mut(&entity_id),
                ) {
                    session.current_tick = self.game.tick;
                    session.enter_world(player);
                }
                self.flush_outgoing();
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.sessions.find_session_by_addr(addr) {
                    self.finish_session(client_id);
                }
            }

            packet => {
                let Some(client_id) = self.sessions.find_session_by_addr(addr) else {
                    debug!("Dropping packet from unknown address {}", addr);
                    return;
                };
                match Intent::from_packet(packet, received_ms) {
                    Some(intent) => {
                        self.sessions
                            .enqueue(client_id, intent, self.config.max_queued_intents);
                    }
                    None => warn!("Unexpected packet type from client at {}", addr),
                }
            }
        }
    }

    /// Sends everything sessions queued and reports their events.
    fn flush_outgoing(&mut self) {
        let mut outgoing = Vec::new();
        for session in self.sessions.iter_mut() {
            for packet in session.take_outgoing() {
                outgoing.push((packet, session.addr));
            }
            for event in session.take_events() {
                match event {
                    SessionEvent::EntryComplete { dimension } => {
                        info!("Client {} finished entering dimension {}", session.id, dimension)
                    }
                    SessionEvent::Landed { distance } => {
                        debug!("Client {} landed from {:.1} blocks", session.id, distance)
                    }
                }
            }
        }
        for (packet, addr) in outgoing {
            self.send_packet(packet, addr);
        }
    }

    /// Removes a session together with its player.
    fn finish_session(&mut self, client_id: u32) {
        let Some(session) = self.sessions.remove_session(&client_id) else {
            return;
        };
        self.game.remove_player(&session.entity_id);
        log_session_summary(&session);
    }

    /// Runs one simulation tick and sends its results.
    fn tick(&mut self, now_ms: u64) {
        dispatcher::run_tick(&mut self.sessions, &mut self.game, &self.config, now_ms);
        self.flush_outgoing();

        for client_id in self.sessions.closed_sessions() {
            self.finish_session(client_id);
        }

        // Periodic performance monitoring
        let summary_interval = self.config.tick_rate as u64 * 3;
        if self.game.tick % summary_interval == 0 && !self.sessions.is_empty() {
            debug!(
                "Tick {}: {} sessions, {} vehicles",
                self.game.tick,
                self.sessions.len(),
                self.game.vehicles.len()
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.config.tick_duration());

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr, received_ms }) => {
                            self.handle_packet(packet, addr, received_ms).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.tick(get_timestamp());
                },
            }
        }

        Ok(())
    }
}

fn log_session_summary(session: &Session) {
    let stats = &session.stats;
    let reason = session
        .disconnect_reason()
        .map(|reason| reason.to_string())
        .unwrap_or_else(|| "left".to_string());
    info!(
        "Client {} closed ({}): walked {}cm, sprinted {}cm, flew {}cm, rode {}cm, {} jumps, ping {}ms",
        session.id,
        reason,
        stats.walk_cm,
        stats.sprint_cm,
        stats.fly_cm + stats.glide_cm,
        stats.ride_cm,
        stats.jumps,
        session.liveness.ping_ms()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::BoxWorld;
    use shared::{DisconnectCategory, MoveIntent, Vec3};
    use std::net::{IpAddr, Ipv4Addr};

    async fn test_server(config: ServerConfig) -> Server {
        let game = GameState::new(BoxWorld::flat(64.0, 100.0), Vec3::new(0.0, 64.0, 0.0), 0.0);
        Server::new("127.0.0.1:0", config, game).await.unwrap()
    }

    fn client_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn drain(server: &mut Server) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(GameMessage::SendPacket { packet, .. }) = server.game_rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = client_addr(8080);

        let msg = ServerMessage::PacketReceived {
            packet,
            addr,
            received_ms: 5,
        };

        match msg {
            ServerMessage::PacketReceived {
                packet: p,
                addr: a,
                received_ms,
            } => {
                assert_eq!(a, addr);
                assert_eq!(received_ms, 5);
                assert!(matches!(p, Packet::Connect { client_version: 1 }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ServerConfig {
            tick_rate: 0,
            ..Default::default()
        };
        let game = GameState::new(BoxWorld::new(), Vec3::ZERO, 0.0);
        let result = tokio_test::block_on(Server::new("127.0.0.1:0", config, game));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_creates_session_and_issues_spawn_correction() {
        let mut server = test_server(ServerConfig::default()).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                client_addr(50000),
                0,
            )
            .await;

        assert_eq!(server.sessions.len(), 1);
        assert_eq!(server.game.players.len(), 1);

        let sent = drain(&mut server);
        assert!(matches!(sent[0], Packet::Connected { client_id: 1, .. }));
        assert!(matches!(sent[1], Packet::PlayerPosition { teleport_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_outdated_client_is_refused() {
        let mut server = test_server(ServerConfig::default()).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION + 1,
                },
                client_addr(50000),
                0,
            )
            .await;

        assert!(server.sessions.is_empty());
        let sent = drain(&mut server);
        assert!(matches!(
            sent.as_slice(),
            [Packet::Disconnected {
                category: DisconnectCategory::OutdatedClient,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut server = test_server(ServerConfig {
            max_clients: 1,
            ..Default::default()
        })
        .await;
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        server.handle_packet(connect.clone(), client_addr(50000), 0).await;
        drain(&mut server);

        server.handle_packet(connect, client_addr(50001), 0).await;
        assert_eq!(server.sessions.len(), 1);
        assert_eq!(server.game.players.len(), 1);
        let sent = drain(&mut server);
        assert!(matches!(
            sent.as_slice(),
            [Packet::Disconnected {
                category: DisconnectCategory::ServerFull,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let mut server = test_server(ServerConfig::default()).await;
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        server.handle_packet(connect.clone(), client_addr(50000), 0).await;
        server.handle_packet(connect, client_addr(50000), 0).await;

        assert_eq!(server.sessions.len(), 1);
        assert_eq!(server.game.players.len(), 1);
        assert_eq!(server.sessions.find_session_by_addr(client_addr(50000)), Some(2));
    }

    #[tokio::test]
    async fn test_intents_are_queued_not_applied() {
        let mut server = test_server(ServerConfig::default()).await;
        let addr = client_addr(50000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr, 0)
            .await;

        server
            .handle_packet(
                Packet::Move(MoveIntent::position(0.1, 64.0, 0.0, true)),
                addr,
                10,
            )
            .await;
        assert_eq!(server.sessions.get(1).map(|s| s.queued_intents()), Some(1));
        assert_eq!(server.game.players[&1].pos, Vec3::new(0.0, 64.0, 0.0));

        // Unknown peers are ignored.
        server
            .handle_packet(Packet::AcceptTeleport { teleport_id: 1 }, client_addr(50001), 10)
            .await;
        assert_eq!(server.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_packet_removes_session_and_player() {
        let mut server = test_server(ServerConfig::default()).await;
        let addr = client_addr(50000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr, 0)
            .await;
        server.handle_packet(Packet::Disconnect, addr, 0).await;

        assert!(server.sessions.is_empty());
        assert!(server.game.players.is_empty());
    }

    #[tokio::test]
    async fn test_tick_tears_down_violating_session() {
        let mut server = test_server(ServerConfig::default()).await;
        let addr = client_addr(50000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr, 0)
            .await;
        drain(&mut server);

        server
            .handle_packet(
                Packet::Move(MoveIntent::position(f64::INFINITY, 64.0, 0.0, true)),
                addr,
                10,
            )
            .await;
        server.tick(50);

        assert!(server.sessions.is_empty());
        assert!(server.game.players.is_empty());
        let sent = drain(&mut server);
        assert!(sent.iter().any(|p| matches!(
            p,
            Packet::Disconnected {
                category: DisconnectCategory::InvalidMovement,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_trusted_only_for_loopback_when_enabled() {
        let mut server = test_server(ServerConfig {
            trust_local_sessions: true,
            ..Default::default()
        })
        .await;
        server
            .handle_packet(
                Packet::Connect { client_version: PROTOCOL_VERSION },
                client_addr(50000),
                0,
            )
            .await;
        assert!(server.sessions.get(1).map_or(false, |s| s.trusted));

        let mut server = test_server(ServerConfig::default()).await;
        server
            .handle_packet(
                Packet::Connect { client_version: PROTOCOL_VERSION },
                client_addr(50000),
                0,
            )
            .await;
        assert!(!server.sessions.get(1).map_or(true, |s| s.trusted));
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        tx.send(ServerMessage::Shutdown).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Shutdown)));
    }
}
