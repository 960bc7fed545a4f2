use crate::game::{BotState, Misbehaviour};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A headless client that walks in circles and answers everything the
/// server asks of it.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    entity_id: Option<u32>,
    connected: bool,

    bot: BotState,
    tick_duration: Duration,

    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        radius: f64,
        behaviour: Misbehaviour,
        tick_rate: u32,
    ) -> ClientResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            entity_id: None,
            connected: false,
            bot: BotState::new(radius, behaviour),
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            fake_ping_ms,
        })
    }

    pub fn bot(&self) -> &BotState {
        &self.bot
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    async fn connect(&mut self) -> ClientResult<()> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> ClientResult<()> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Returns false once the server has closed the session.
    async fn handle_packet(&mut self, packet: Packet) -> ClientResult<bool> {
        match packet {
            Packet::Connected {
                client_id,
                entity_id,
            } => {
                info!("Connected! Client ID: {}, entity {}", client_id, entity_id);
                self.client_id = Some(client_id);
                self.entity_id = Some(entity_id);
                self.connected = true;
            }

            Packet::PlayerPosition {
                x,
                y,
                z,
                yaw,
                pitch,
                relative,
                teleport_id,
            } => {
                let teleport_id = self
                    .bot
                    .apply_correction(x, y, z, yaw, pitch, relative, teleport_id);
                self.send_packet(&Packet::AcceptTeleport { teleport_id })
                    .await?;
            }

            Packet::KeepAlive { challenge } => {
                self.send_packet(&Packet::KeepAliveResponse { challenge })
                    .await?;
            }

            Packet::VehiclePosition { x, y, z, .. } => {
                debug!("Vehicle corrected to ({:.2}, {:.2}, {:.2})", x, y, z);
            }

            Packet::ActionAck { sequence } => {
                debug!("Action {} acknowledged", sequence);
            }

            Packet::SetPassengers {
                vehicle_id,
                passengers,
            } => {
                debug!("Vehicle {} carries {:?}", vehicle_id, passengers);
            }

            Packet::OpenScreen { screen_id, .. } => {
                self.send_packet(&Packet::CloseScreen { screen_id }).await?;
            }

            Packet::Disconnected { category, reason } => {
                warn!("Disconnected ({:?}): {}", category, reason);
                self.connected = false;
                self.client_id = None;
                return Ok(false);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }

        Ok(true)
    }

    async fn send_move(&mut self) -> ClientResult<()> {
        if !self.connected {
            return Ok(());
        }

        if let Some(intent) = self.bot.next_move() {
            self.send_packet(&Packet::Move(intent)).await?;
        }

        Ok(())
    }

    /// Runs until the server disconnects us or `duration` elapses.
    pub async fn run(&mut self, duration: Option<Duration>) -> ClientResult<()> {
        self.connect().await?;

        let mut move_interval = interval(self.tick_duration);
        let deadline = sleep(duration.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => {
                                    if !self.handle_packet(packet).await? {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = move_interval.tick() => {
                    if let Err(e) = self.send_move().await {
                        error!("Error sending move: {}", e);
                    }
                },

                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        info!(
            "Entity {:?}: sent {} moves, received {} corrections",
            self.entity_id, self.bot.moves_sent, self.bot.corrections
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_server_address_is_rejected() {
        let result = tokio_test::block_on(Client::new(
            "not an address",
            0,
            4.0,
            Misbehaviour::default(),
            20,
        ));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_keep_alive_is_echoed() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let mut client = Client::new(&addr, 0, 4.0, Misbehaviour::default(), 20)
            .await
            .unwrap();

        let keep_going = client
            .handle_packet(Packet::KeepAlive { challenge: 1234 })
            .await
            .unwrap();
        assert!(keep_going);

        let mut buf = [0u8; 2048];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let reply: Packet = deserialize(&buf[..len]).unwrap();
        assert!(matches!(reply, Packet::KeepAliveResponse { challenge: 1234 }));
    }

    #[tokio::test]
    async fn test_correction_is_adopted_and_acknowledged() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let mut client = Client::new(&addr, 0, 4.0, Misbehaviour::default(), 20)
            .await
            .unwrap();

        client
            .handle_packet(Packet::PlayerPosition {
                x: 1.0,
                y: 64.0,
                z: 2.0,
                yaw: 0.0,
                pitch: 0.0,
                relative: shared::RelativeFlags::NONE,
                teleport_id: 9,
            })
            .await
            .unwrap();
        assert!(client.bot().is_placed());

        let mut buf = [0u8; 2048];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let reply: Packet = deserialize(&buf[..len]).unwrap();
        assert!(matches!(reply, Packet::AcceptTeleport { teleport_id: 9 }));
    }

    #[tokio::test]
    async fn test_disconnect_stops_the_loop() {
        let mut client = Client::new("127.0.0.1:9", 0, 4.0, Misbehaviour::default(), 20)
            .await
            .unwrap();
        let keep_going = client
            .handle_packet(Packet::Disconnected {
                category: shared::DisconnectCategory::Timeout,
                reason: "Timed out".to_string(),
            })
            .await
            .unwrap();
        assert!(!keep_going);
        assert!(client.client_id().is_none());
    }
}
