//! Validation of player movement intents.
//!
//! The client simulates its own movement and reports where it ended up. The
//! server replays that displacement through the same collision routine it
//! uses for every other entity, and only commits the result when the two
//! agree closely enough. Disagreement is answered with a correction; values no
//! honest client can produce end the session.

use crate::collision::CollisionOracle;
use crate::config::ServerConfig;
use crate::entity::{Player, SAFE_FALL_DISTANCE};
use crate::error::DisconnectReason;
use crate::physics::{self, no_blocks_around};
use crate::session::{Session, SessionEvent};
use crate::utils::within_world_bounds;
use log::{debug, info, warn};
use shared::{wrap_degrees, MoveIntent, Vec3, STEP_HEIGHT};

/// Vertical displacement at or above this is "not falling" for the
/// floating check.
pub const FLOATING_DY_THRESHOLD: f64 = -0.03125;
/// Vertical divergence below this is ignored; landing only ever snaps up.
const VERTICAL_ERROR_TOLERANCE: f64 = 0.5;
/// Squared distance a sleeping player may drift from the bed.
const SLEEPING_DRIFT_SQR: f64 = 1.0;

/// Consecutive ticks a violation condition has held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloatingCounter {
    ticks: u32,
}

impl FloatingCounter {
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Records one tick. Returns true once `limit` consecutive floating ticks
    /// have been seen.
    pub fn observe(&mut self, floating: bool, limit: u32) -> bool {
        if floating {
            self.ticks = self.ticks.saturating_add(1);
            self.ticks >= limit
        } else {
            self.ticks = 0;
            false
        }
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Per-session shadow of the controlled entity's position.
#[derive(Debug, Clone, Default)]
pub struct MovementTracker {
    /// Position at the start of the current tick.
    pub last_tick_pos: Vec3,
    /// Position after the last accepted intent.
    pub updated_pos: Vec3,
    pub received_moves: u32,
    pub known_moves: u32,
    /// The last accepted move left the player unsupported and not falling.
    pub client_is_floating: bool,
    pub floating: FloatingCounter,
}

impl MovementTracker {
    pub fn new(pos: Vec3) -> Self {
        Self {
            last_tick_pos: pos,
            updated_pos: pos,
            ..Default::default()
        }
    }

    pub fn begin_tick(&mut self, pos: Vec3) {
        self.last_tick_pos = pos;
        self.updated_pos = pos;
        self.known_moves = self.received_moves;
    }

    /// Re-anchors both shadows after an acknowledged correction.
    pub fn resync(&mut self, pos: Vec3) {
        self.last_tick_pos = pos;
        self.updated_pos = pos;
    }

    /// Move intents received since the tick began, collapsed to 1 when the
    /// client is flooding.
    fn burst_multiplier(&mut self, limit: u32) -> u32 {
        self.received_moves = self.received_moves.wrapping_add(1);
        let burst = self.received_moves.wrapping_sub(self.known_moves);
        if burst > limit {
            debug!("Move burst of {} exceeds {}, clamping to 1", burst, limit);
            1
        } else {
            burst
        }
    }

    /// End-of-tick floating check. Sleeping, riding and dead players are not
    /// counted.
    pub fn check_floating(
        &mut self,
        player: &Player,
        config: &ServerConfig,
    ) -> Result<(), DisconnectReason> {
        let counted =
            self.client_is_floating && !player.sleeping && !player.is_passenger() && !player.dead;
        if self.floating.observe(counted, config.max_floating_ticks) {
            warn!(
                "Player {} floated for {} ticks",
                player.id,
                self.floating.ticks()
            );
            return Err(DisconnectReason::Flying);
        }
        Ok(())
    }
}

/// Distance travelled per movement kind, in centimetres.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementStats {
    pub walk_cm: u64,
    pub sprint_cm: u64,
    pub crouch_cm: u64,
    pub swim_cm: u64,
    pub fly_cm: u64,
    pub glide_cm: u64,
    pub fall_cm: u64,
    pub climb_cm: u64,
    pub ride_cm: u64,
    pub jumps: u32,
}

impl MovementStats {
    pub fn record(&mut self, player: &Player, delta: Vec3, in_fluid: bool) {
        let to_cm = |d: f64| (d * 100.0).round() as u64;
        let horizontal = to_cm(delta.horizontal_length_sqr().sqrt());
        let full = to_cm(delta.length());

        if in_fluid {
            self.swim_cm += full;
        } else if player.on_ground {
            if player.sprinting {
                self.sprint_cm += horizontal;
            } else if player.sneaking {
                self.crouch_cm += horizontal;
            } else {
                self.walk_cm += horizontal;
            }
        } else if player.gliding {
            self.glide_cm += full;
        } else if player.abilities.flying {
            self.fly_cm += horizontal;
        } else if delta.y < 0.0 {
            self.fall_cm += to_cm(-delta.y);
        } else if delta.y > 0.0 && horizontal == 0 {
            self.climb_cm += to_cm(delta.y);
        }
    }

    pub fn record_ride(&mut self, delta: Vec3) {
        self.ride_cm += (delta.length() * 100.0).round() as u64;
    }

    pub fn total_cm(&self) -> u64 {
        self.walk_cm
            + self.sprint_cm
            + self.crouch_cm
            + self.swim_cm
            + self.fly_cm
            + self.glide_cm
            + self.fall_cm
            + self.climb_cm
            + self.ride_cm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// A correction is outstanding; the intent describes a stale position.
    Ignored,
    /// Only the rotation was taken (riding or sleeping).
    RotationOnly,
    Accepted,
    /// The position was refused and a correction issued.
    Corrected,
}

/// Rejects intents carrying values no honest client can produce.
pub fn check_move_values(intent: &MoveIntent) -> Result<(), DisconnectReason> {
    let coords = [intent.x, intent.y, intent.z];
    if coords.iter().flatten().any(|c| !c.is_finite()) {
        return Err(DisconnectReason::InvalidMovement);
    }
    if [intent.yaw, intent.pitch]
        .iter()
        .flatten()
        .any(|a| !a.is_finite())
    {
        return Err(DisconnectReason::InvalidMovement);
    }
    let x = intent.x.unwrap_or(0.0);
    let y = intent.y.unwrap_or(0.0);
    let z = intent.z.unwrap_or(0.0);
    if !within_world_bounds(x, y, z) {
        return Err(DisconnectReason::InvalidMovement);
    }
    Ok(())
}

/// Validates one movement intent and commits it to `player` if acceptable.
pub fn handle_move<W: CollisionOracle + ?Sized>(
    session: &mut Session,
    player: &mut Player,
    world: &W,
    config: &ServerConfig,
    intent: MoveIntent,
) -> Result<MoveOutcome, DisconnectReason> {
    check_move_values(&intent)?;

    if session.teleport.is_pending() {
        return Ok(MoveOutcome::Ignored);
    }

    let target = Vec3::new(
        intent.x.unwrap_or(player.pos.x),
        intent.y.unwrap_or(player.pos.y),
        intent.z.unwrap_or(player.pos.z),
    );
    let yaw = wrap_degrees(intent.yaw.unwrap_or(player.yaw));
    let pitch = wrap_degrees(intent.pitch.unwrap_or(player.pitch)).clamp(-90.0, 90.0);

    if target != player.pos || yaw != player.yaw || pitch != player.pitch {
        session.mark_active();
    }

    // The vehicle carries the passenger; only where it looks matters here.
    if player.is_passenger() {
        player.yaw = yaw;
        player.pitch = pitch;
        return Ok(MoveOutcome::RotationOnly);
    }

    let since_tick_start = target - session.movement.last_tick_pos;
    let distance_sqr = since_tick_start.length_sqr();

    if player.sleeping {
        if distance_sqr > SLEEPING_DRIFT_SQR {
            let bed = player.pos;
            session.correct(player, bed, yaw, pitch);
            return Ok(MoveOutcome::Corrected);
        }
        player.yaw = yaw;
        player.pitch = pitch;
        return Ok(MoveOutcome::RotationOnly);
    }

    let burst = session.movement.burst_multiplier(config.move_burst_limit);

    if !session.trusted {
        let budget = if player.gliding {
            config.glide_speed_budget
        } else {
            config.speed_budget
        };
        if distance_sqr - player.velocity.length_sqr() > budget * burst as f64 {
            warn!(
                "Player {} moved too quickly! {:.3},{:.3},{:.3}",
                player.id, since_tick_start.x, since_tick_start.y, since_tick_start.z
            );
            let current = player.pos;
            session.correct(player, current, yaw, pitch);
            return Ok(MoveOutcome::Corrected);
        }
    }

    let start = player.pos;
    let old_box = player.bounding_box();
    let step = target - session.movement.updated_pos;

    if player.on_ground && !intent.on_ground && step.y > 0.0 {
        player.jump_from_ground();
        session.stats.jumps += 1;
    }

    let applied = if player.no_physics() {
        step
    } else {
        let step_height = if player.on_ground || step.y < 0.0 {
            STEP_HEIGHT
        } else {
            0.0
        };
        physics::move_entity(world, old_box, step, step_height).applied
    };

    let mut error = target - (start + applied);
    if error.y.abs() < VERTICAL_ERROR_TOLERANCE {
        error.y = 0.0;
    }
    let moved_wrongly = error.length_sqr() > config.moved_wrongly_threshold
        && !player.sleeping
        && !player.is_movement_exempt();
    if moved_wrongly {
        warn!(
            "Player {} moved wrongly! {:.3},{:.3},{:.3}",
            player.id, error.x, error.y, error.z
        );
    }

    if !player.no_physics() {
        let old_obstructed = world.is_obstructed(&old_box);
        let newly_obstructed =
            !old_obstructed && world.is_obstructed(&player.bounding_box_at(target));
        if (moved_wrongly && !old_obstructed) || newly_obstructed {
            session.correct(player, start, yaw, pitch);
            return Ok(MoveOutcome::Corrected);
        }
        if moved_wrongly {
            debug!(
                "Player {} is already inside a solid, tolerating divergence",
                player.id
            );
        }
    }

    player.pos = target;
    player.yaw = yaw;
    player.pitch = pitch;

    session.movement.client_is_floating = step.y >= FLOATING_DY_THRESHOLD
        && !config.allow_flight
        && !player.can_stay_aloft()
        && no_blocks_around(world, &player.bounding_box());

    if intent.on_ground {
        player.gliding = false;
    }
    player.on_ground = intent.on_ground;
    if let Some(fallen) = player.check_fall(step.y, intent.on_ground) {
        if fallen > SAFE_FALL_DISTANCE {
            info!("Player {} landed after falling {:.1} blocks", player.id, fallen);
            session.push_event(SessionEvent::Landed { distance: fallen });
        }
    }

    let in_fluid = world.contains_fluid(&player.bounding_box());
    session.stats.record(player, target - start, in_fluid);
    session.movement.updated_pos = target;

    Ok(MoveOutcome::Accepted)
}
