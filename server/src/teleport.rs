//! Server-initiated repositioning and its acknowledgment handshake.
//!
//! A correction is dictated, not negotiated: issuing one moves the
//! authoritative entity immediately, then waits for the client to echo the
//! correction id. Until it does, movement intents from the client describe a
//! world the server has already left behind and are ignored.

use crate::entity::Player;
use shared::{wrap_degrees, Packet, RelativeFlags, Vec3};

/// The correction as it was put on the wire, kept so a resend is identical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub relative: RelativeFlags,
    pub id: i32,
}

impl Correction {
    pub fn to_packet(&self) -> Packet {
        Packet::PlayerPosition {
            x: self.x,
            y: self.y,
            z: self.z,
            yaw: self.yaw,
            pitch: self.pitch,
            relative: self.relative,
            teleport_id: self.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TeleportState {
    Idle,
    AwaitingAck {
        id: i32,
        target: Vec3,
        sent: Correction,
        issued_tick: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AckOutcome {
    /// The outstanding correction was confirmed at `position`.
    Accepted { position: Vec3, entered_world: bool },
    /// Stale, duplicate or unknown id.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct TeleportReconciler {
    state: TeleportState,
    last_id: i32,
    /// Set by a world or dimension change until its first correction is acknowledged.
    entering_world: bool,
}

impl Default for TeleportReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl TeleportReconciler {
    pub fn new() -> Self {
        Self {
            state: TeleportState::Idle,
            last_id: 0,
            entering_world: false,
        }
    }

    pub fn state(&self) -> &TeleportState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TeleportState::AwaitingAck { .. })
    }

    pub fn pending_id(&self) -> Option<i32> {
        match self.state {
            TeleportState::AwaitingAck { id, .. } => Some(id),
            TeleportState::Idle => None,
        }
    }

    pub fn is_entering_world(&self) -> bool {
        self.entering_world
    }

    /// The next correction's acknowledgment completes a world entry.
    pub fn begin_world_entry(&mut self) {
        self.entering_world = true;
    }

    fn next_id(&mut self) -> i32 {
        self.last_id = if self.last_id == i32::MAX {
            0
        } else {
            self.last_id + 1
        };
        self.last_id
    }

    /// Moves `player` to `target` and returns the correction to send.
    ///
    /// Axes named in `relative` go out as offsets from the player's position
    /// before the move. Any unacknowledged correction is superseded.
    pub fn issue(
        &mut self,
        player: &mut Player,
        target: Vec3,
        yaw: f32,
        pitch: f32,
        relative: RelativeFlags,
        tick: u64,
    ) -> Packet {
        let yaw = wrap_degrees(yaw);
        let pitch = pitch.clamp(-90.0, 90.0);
        let offset = |flag: RelativeFlags, current: f64| {
            if relative.contains(flag) {
                current
            } else {
                0.0
            }
        };
        let offset_angle = |flag: RelativeFlags, current: f32| {
            if relative.contains(flag) {
                current
            } else {
                0.0
            }
        };

        let id = self.next_id();
        let sent = Correction {
            x: target.x - offset(RelativeFlags::X, player.pos.x),
            y: target.y - offset(RelativeFlags::Y, player.pos.y),
            z: target.z - offset(RelativeFlags::Z, player.pos.z),
            yaw: yaw - offset_angle(RelativeFlags::YAW, player.yaw),
            pitch: pitch - offset_angle(RelativeFlags::PITCH, player.pitch),
            relative,
            id,
        };

        player.pos = target;
        player.yaw = yaw;
        player.pitch = pitch;

        self.state = TeleportState::AwaitingAck {
            id,
            target,
            sent,
            issued_tick: tick,
        };
        sent.to_packet()
    }

    /// Handles the client's echo of a correction id.
    pub fn accept(&mut self, id: i32) -> AckOutcome {
        match self.state {
            TeleportState::AwaitingAck {
                id: pending, target, ..
            } if pending == id => {
                self.state = TeleportState::Idle;
                let entered_world = std::mem::replace(&mut self.entering_world, false);
                AckOutcome::Accepted {
                    position: target,
                    entered_world,
                }
            }
            _ => AckOutcome::Ignored,
        }
    }

    /// Returns the outstanding correction again, same id, once it has gone
    /// `resend_ticks` without acknowledgment.
    pub fn poll_resend(&mut self, tick: u64, resend_ticks: u64) -> Option<Packet> {
        match &mut self.state {
            TeleportState::AwaitingAck {
                sent, issued_tick, ..
            } if tick.saturating_sub(*issued_tick) >= resend_ticks => {
                *issued_tick = tick;
                Some(sent.to_packet())
            }
            _ => None,
        }
    }
}
