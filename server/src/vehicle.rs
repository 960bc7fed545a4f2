//! Validation of movement reported for a vehicle the player is steering.
//!
//! Same shape as player movement, but the vehicle is what moves and what gets
//! corrected. Vehicles are allowed more client-side slack: a divergent move
//! is only reverted if it would leave the vehicle inside a solid.

use crate::collision::CollisionOracle;
use crate::config::ServerConfig;
use crate::entity::{EntityId, Player, Vehicle};
use crate::error::DisconnectReason;
use crate::movement::{FloatingCounter, FLOATING_DY_THRESHOLD};
use crate::physics::{self, no_blocks_around};
use crate::session::Session;
use crate::utils::within_world_bounds;
use log::{debug, warn};
use shared::{wrap_degrees, Packet, Vec3, VehicleMoveIntent};

/// Bobbing allowance subtracted from every vertical step.
const VERTICAL_SLACK: f64 = 1.0e-6;
/// Boxes are shrunk by this before obstruction tests.
const DEFLATE_EPSILON: f64 = 0.0625;
const VERTICAL_ERROR_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct VehicleTracker {
    /// Vehicle the player was steering when the tick began.
    pub last_vehicle: Option<EntityId>,
    pub last_tick_pos: Vec3,
    pub updated_pos: Vec3,
    pub client_is_floating: bool,
    pub floating: FloatingCounter,
}

impl VehicleTracker {
    /// `controlled` is the root vehicle if the player is its controlling
    /// passenger.
    pub fn begin_tick(&mut self, controlled: Option<&Vehicle>) {
        match controlled {
            Some(vehicle) => {
                if self.last_vehicle != Some(vehicle.id) {
                    self.client_is_floating = false;
                    self.floating.reset();
                }
                self.last_vehicle = Some(vehicle.id);
                self.last_tick_pos = vehicle.pos;
                self.updated_pos = vehicle.pos;
            }
            None => {
                self.last_vehicle = None;
                self.client_is_floating = false;
                self.floating.reset();
            }
        }
    }

    pub fn check_floating(&mut self, config: &ServerConfig) -> Result<(), DisconnectReason> {
        if self.last_vehicle.is_none() {
            return Ok(());
        }
        if self
            .floating
            .observe(self.client_is_floating, config.max_floating_ticks)
        {
            warn!(
                "Vehicle {:?} floated for {} ticks",
                self.last_vehicle,
                self.floating.ticks()
            );
            return Err(DisconnectReason::Flying);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleMoveOutcome {
    /// Not steering this vehicle, or a correction is outstanding.
    Ignored,
    Accepted,
    /// The vehicle was put back and its position sent to the client.
    Corrected,
}

pub fn check_vehicle_values(intent: &VehicleMoveIntent) -> Result<(), DisconnectReason> {
    let finite = [intent.x, intent.y, intent.z].iter().all(|c| c.is_finite())
        && intent.yaw.is_finite()
        && intent.pitch.is_finite();
    if !finite || !within_world_bounds(intent.x, intent.y, intent.z) {
        return Err(DisconnectReason::InvalidVehicleMovement);
    }
    Ok(())
}

pub fn vehicle_position_packet(vehicle: &Vehicle) -> Packet {
    Packet::VehiclePosition {
        x: vehicle.pos.x,
        y: vehicle.pos.y,
        z: vehicle.pos.z,
        yaw: vehicle.yaw,
        pitch: vehicle.pitch,
    }
}

/// Validates a vehicle movement intent from the vehicle's controlling
/// passenger and commits it if acceptable.
pub fn handle_vehicle_move<W: CollisionOracle + ?Sized>(
    session: &mut Session,
    player: &mut Player,
    vehicle: &mut Vehicle,
    world: &W,
    config: &ServerConfig,
    intent: VehicleMoveIntent,
) -> Result<VehicleMoveOutcome, DisconnectReason> {
    check_vehicle_values(&intent)?;

    if session.teleport.is_pending()
        || vehicle.controlling_passenger() != Some(player.id)
        || session.vehicle.last_vehicle != Some(vehicle.id)
    {
        return Ok(VehicleMoveOutcome::Ignored);
    }

    let target = Vec3::new(intent.x, intent.y, intent.z);
    let yaw = wrap_degrees(intent.yaw);
    let pitch = wrap_degrees(intent.pitch);
    let start = vehicle.pos;
    session.mark_active();

    let since_tick_start = target - session.vehicle.last_tick_pos;
    if !session.trusted
        && since_tick_start.length_sqr() - vehicle.velocity.length_sqr()
            > config.vehicle_speed_budget
    {
        warn!(
            "Vehicle {} (ridden by {}) moved too quickly! {:.3},{:.3},{:.3}",
            vehicle.id, player.id, since_tick_start.x, since_tick_start.y, since_tick_start.z
        );
        session.send(vehicle_position_packet(vehicle));
        return Ok(VehicleMoveOutcome::Corrected);
    }

    let old_free = !world.is_obstructed(&vehicle.bounding_box().deflate(DEFLATE_EPSILON));
    let was_supported = vehicle.on_ground;

    let mut step = target - session.vehicle.updated_pos;
    step.y -= VERTICAL_SLACK;
    let result = physics::move_entity(
        world,
        vehicle.bounding_box(),
        step,
        vehicle.kind.step_height(),
    );

    let mut error = target - (start + result.applied);
    if error.y.abs() < VERTICAL_ERROR_TOLERANCE {
        error.y = 0.0;
    }
    let moved_wrongly = error.length_sqr() > config.moved_wrongly_threshold;

    let new_free = !world.is_obstructed(&vehicle.bounding_box_at(target).deflate(DEFLATE_EPSILON));
    if old_free && !new_free {
        warn!(
            "Vehicle {} (ridden by {}) moved into a solid",
            vehicle.id, player.id
        );
        vehicle.yaw = yaw;
        vehicle.pitch = pitch;
        session.send(vehicle_position_packet(vehicle));
        return Ok(VehicleMoveOutcome::Corrected);
    }
    if moved_wrongly {
        debug!(
            "Vehicle {} (ridden by {}) moved wrongly by {:.3}, tolerated",
            vehicle.id,
            player.id,
            error.length()
        );
    }

    vehicle.pos = target;
    vehicle.yaw = yaw;
    vehicle.pitch = pitch;
    vehicle.on_ground = result.landed;
    player.pos = vehicle.passenger_position();
    session.stats.record_ride(target - start);

    session.vehicle.client_is_floating = step.y >= FLOATING_DY_THRESHOLD
        && !was_supported
        && !config.allow_flight
        && !vehicle.no_gravity
        && no_blocks_around(world, &vehicle.bounding_box());
    session.vehicle.updated_pos = target;

    Ok(VehicleMoveOutcome::Accepted)
}
