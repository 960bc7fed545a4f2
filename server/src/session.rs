//! Per-connection state.
//!
//! A [`Session`] is created when a client connects and dropped when it
//! disconnects. The network task only ever queues [`Intent`]s on it; every
//! other field is touched exclusively from the simulation tick.

use crate::config::ServerConfig;
use crate::entity::{EntityId, Player, Vehicle};
use crate::error::DisconnectReason;
use crate::liveness::LivenessMonitor;
use crate::movement::{MovementStats, MovementTracker};
use crate::teleport::{AckOutcome, TeleportReconciler};
use crate::vehicle::VehicleTracker;
use log::{debug, info, warn};
use shared::{
    BlockPos, ClientCommand, Face, GameMode, MoveIntent, Packet, PlayerAction, RelativeFlags,
    Vec3, VehicleMoveIntent,
};
use std::collections::VecDeque;
use std::net::SocketAddr;

/// Highest screen id before wrapping back to 1.
const MAX_SCREEN_ID: u8 = 100;

/// A decoded client request waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Move(MoveIntent),
    MoveVehicle(VehicleMoveIntent),
    AcceptTeleport(i32),
    KeepAliveResponse {
        challenge: u64,
        /// Arrival time, so ping is not quantised to the tick.
        received_ms: u64,
    },
    Action {
        sequence: u32,
        action: PlayerAction,
        pos: BlockPos,
        face: Face,
    },
    Command {
        entity_id: u32,
        command: ClientCommand,
        data: i32,
    },
    ChangeGameMode(GameMode),
    CloseScreen(u8),
    Interact(EntityId),
}

impl Intent {
    /// Returns `None` for packets that are not intents (handshake, teardown and
    /// anything only the server sends).
    pub fn from_packet(packet: Packet, received_ms: u64) -> Option<Intent> {
        let intent = match packet {
            Packet::Move(intent) => Intent::Move(intent),
            Packet::MoveVehicle(intent) => Intent::MoveVehicle(intent),
            Packet::AcceptTeleport { teleport_id } => Intent::AcceptTeleport(teleport_id),
            Packet::KeepAliveResponse { challenge } => Intent::KeepAliveResponse {
                challenge,
                received_ms,
            },
            Packet::Action {
                sequence,
                action,
                pos,
                face,
            } => Intent::Action {
                sequence,
                action,
                pos,
                face,
            },
            Packet::Command {
                entity_id,
                command,
                data,
            } => Intent::Command {
                entity_id,
                command,
                data,
            },
            Packet::ChangeGameMode { mode } => Intent::ChangeGameMode(mode),
            Packet::CloseScreen { screen_id } => Intent::CloseScreen(screen_id),
            Packet::Interact { entity_id } => Intent::Interact(entity_id),
            _ => return None,
        };
        Some(intent)
    }
}

/// Things that happened to a session during a tick that other systems may
/// want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The first correction after a world or dimension change was acknowledged.
    EntryComplete { dimension: u32 },
    /// Landed after a fall long enough to hurt.
    Landed { distance: f64 },
}

#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub addr: SocketAddr,
    pub entity_id: EntityId,
    /// Exempt from speed checks and liveness timeouts.
    pub trusted: bool,
    intents: VecDeque<Intent>,

    pub teleport: TeleportReconciler,
    pub liveness: LivenessMonitor,
    pub movement: MovementTracker,
    pub vehicle: VehicleTracker,
    pub stats: MovementStats,

    pub open_screen: Option<u8>,
    next_screen_id: u8,
    /// Block currently being broken.
    pub destroying: Option<BlockPos>,
    pub drop_spam: u32,

    pub connected_ms: u64,
    pub last_action_ms: u64,
    pub current_tick: u64,
    pub now_ms: u64,

    outgoing: Vec<Packet>,
    events: Vec<SessionEvent>,
    disconnect: Option<DisconnectReason>,
}

impl Session {
    pub fn new(
        id: u32,
        addr: SocketAddr,
        entity_id: EntityId,
        trusted: bool,
        config: &ServerConfig,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            addr,
            entity_id,
            trusted,
            intents: VecDeque::new(),
            teleport: TeleportReconciler::new(),
            liveness: LivenessMonitor::new(config.keep_alive_interval, trusted),
            movement: MovementTracker::default(),
            vehicle: VehicleTracker::default(),
            stats: MovementStats::default(),
            open_screen: None,
            next_screen_id: 0,
            destroying: None,
            drop_spam: 0,
            connected_ms: now_ms,
            last_action_ms: now_ms,
            current_tick: 0,
            now_ms,
            outgoing: Vec::new(),
            events: Vec::new(),
            disconnect: None,
        }
    }

    /// Queues an intent for the next tick. Returns false if it was dropped.
    pub fn enqueue(&mut self, intent: Intent, limit: usize) -> bool {
        if self.is_closing() {
            return false;
        }
        if self.intents.len() >= limit {
            warn!(
                "Client {} intent queue full ({}), dropping {:?}",
                self.id, limit, intent
            );
            return false;
        }
        self.intents.push_back(intent);
        true
    }

    /// Next queued intent, or `None` once the session is closing.
    pub fn next_intent(&mut self) -> Option<Intent> {
        if self.is_closing() {
            return None;
        }
        self.intents.pop_front()
    }

    pub fn queued_intents(&self) -> usize {
        self.intents.len()
    }

    pub fn send(&mut self, packet: Packet) {
        self.outgoing.push(packet);
    }

    pub fn take_outgoing(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn push_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Marks the session for teardown. The first reason wins.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        if self.disconnect.is_some() {
            return;
        }
        info!("Disconnecting client {}: {}", self.id, reason);
        self.outgoing.push(reason.to_packet());
        self.disconnect = Some(reason);
    }

    pub fn is_closing(&self) -> bool {
        self.disconnect.is_some()
    }

    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.disconnect.as_ref()
    }

    pub fn mark_active(&mut self) {
        self.last_action_ms = self.now_ms;
    }

    /// Resets the per-tick shadows. `controlled` is the vehicle the player is
    /// steering, if any.
    pub fn begin_tick(
        &mut self,
        tick: u64,
        now_ms: u64,
        player: &Player,
        controlled: Option<&Vehicle>,
    ) {
        self.current_tick = tick;
        self.now_ms = now_ms;
        self.movement.begin_tick(player.pos);
        self.vehicle.begin_tick(controlled);
    }

    /// Repositions the player and tells the client.
    pub fn teleport_to(
        &mut self,
        player: &mut Player,
        target: Vec3,
        yaw: f32,
        pitch: f32,
        relative: RelativeFlags,
    ) {
        let packet = self
            .teleport
            .issue(player, target, yaw, pitch, relative, self.current_tick);
        self.movement.updated_pos = player.pos;
        self.send(packet);
    }

    /// Absolute correction to `target`.
    pub fn correct(&mut self, player: &mut Player, target: Vec3, yaw: f32, pitch: f32) {
        self.teleport_to(player, target, yaw, pitch, RelativeFlags::NONE);
    }

    pub fn accept_teleport(&mut self, player: &mut Player, teleport_id: i32) -> bool {
        match self.teleport.accept(teleport_id) {
            AckOutcome::Accepted {
                position,
                entered_world,
            } => {
                player.pos = position;
                self.movement.resync(position);
                if entered_world {
                    info!(
                        "Player {} entered dimension {}",
                        player.id, player.dimension
                    );
                    self.push_event(SessionEvent::EntryComplete {
                        dimension: player.dimension,
                    });
                }
                true
            }
            AckOutcome::Ignored => {
                debug!(
                    "Client {} acknowledged stale teleport {}",
                    self.id, teleport_id
                );
                false
            }
        }
    }

    /// Places a freshly joined player at its spawn position.
    pub fn enter_world(&mut self, player: &mut Player) {
        self.teleport.begin_world_entry();
        let (pos, yaw, pitch) = (player.pos, player.yaw, player.pitch);
        self.correct(player, pos, yaw, pitch);
    }

    /// Moves the player into another dimension at `target`.
    pub fn change_dimension(&mut self, player: &mut Player, dimension: u32, target: Vec3) {
        info!(
            "Player {} changing dimension {} -> {}",
            player.id, player.dimension, dimension
        );
        player.dimension = dimension;
        player.velocity = Vec3::ZERO;
        player.fall_distance = 0.0;
        self.movement.client_is_floating = false;
        self.movement.floating.reset();
        self.teleport.begin_world_entry();
        let (yaw, pitch) = (player.yaw, player.pitch);
        self.correct(player, target, yaw, pitch);
    }

    /// Starts tracking `vehicle` after the player boarded it mid-tick.
    pub fn start_riding(&mut self, vehicle: &Vehicle) {
        self.vehicle.begin_tick(Some(vehicle));
        self.send(Packet::SetPassengers {
            vehicle_id: vehicle.id,
            passengers: vehicle.passengers.clone(),
        });
    }

    /// Stops tracking `vehicle` and corrects the player to where it was set
    /// down.
    pub fn stop_riding(&mut self, player: &mut Player, vehicle: &Vehicle) {
        self.vehicle.begin_tick(None);
        self.send(Packet::SetPassengers {
            vehicle_id: vehicle.id,
            passengers: vehicle.passengers.clone(),
        });
        let (pos, yaw, pitch) = (player.pos, player.yaw, player.pitch);
        self.correct(player, pos, yaw, pitch);
    }

    /// Opens a screen bound to `vehicle_id` and returns its id.
    pub fn open_vehicle_screen(&mut self, vehicle_id: EntityId) -> u8 {
        self.next_screen_id = self.next_screen_id % MAX_SCREEN_ID + 1;
        self.open_screen = Some(self.next_screen_id);
        self.send(Packet::OpenScreen {
            screen_id: self.next_screen_id,
            vehicle_id,
        });
        self.next_screen_id
    }

    /// Closes the open screen if `screen_id` names it.
    pub fn close_screen(&mut self, screen_id: u8) -> bool {
        if self.open_screen == Some(screen_id) {
            self.open_screen = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) fn test_session() -> Session {
    let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    Session::new(1, addr, 1, false, &ServerConfig::default(), 0)
}
