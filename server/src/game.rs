use crate::collision::BoxWorld;
use crate::entity::{EntityId, Player, Vehicle, VehicleKind};
use crate::physics;
use log::{debug, info};
use rand::Rng;
use shared::{Vec3, GRAVITY};
use std::collections::HashMap;

/// Authoritative world state owned by the simulation loop.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    pub players: HashMap<EntityId, Player>,
    pub vehicles: HashMap<EntityId, Vehicle>,
    pub world: BoxWorld,
    pub spawn: Vec3,
    spawn_radius: f64,
    next_entity_id: EntityId,
}

impl GameState {
    pub fn new(world: BoxWorld, spawn: Vec3, spawn_radius: f64) -> Self {
        Self {
            tick: 0,
            players: HashMap::new(),
            vehicles: HashMap::new(),
            world,
            spawn,
            spawn_radius,
            next_entity_id: 1,
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Adds a player near the spawn point and returns its entity id.
    pub fn add_player(&mut self) -> EntityId {
        let id = self.allocate_id();
        let mut pos = self.spawn;
        if self.spawn_radius > 0.0 {
            let mut rng = rand::thread_rng();
            pos.x += rng.gen_range(-self.spawn_radius..=self.spawn_radius);
            pos.z += rng.gen_range(-self.spawn_radius..=self.spawn_radius);
        }

        let player = Player::new(id, pos);
        info!(
            "Added player {} at ({:.2}, {:.2}, {:.2})",
            id, pos.x, pos.y, pos.z
        );
        self.players.insert(id, player);
        id
    }

    pub fn remove_player(&mut self, id: &EntityId) {
        self.dismount(*id);
        if self.players.remove(id).is_some() {
            info!("Removed player {}", id);
        }
    }

    pub fn spawn_vehicle(&mut self, kind: VehicleKind, pos: Vec3) -> EntityId {
        let id = self.allocate_id();
        self.vehicles.insert(id, Vehicle::new(id, kind, pos));
        info!("Spawned {:?} {} at ({:.2}, {:.2}, {:.2})", kind, id, pos.x, pos.y, pos.z);
        id
    }

    /// Seats a player on a vehicle. The first passenger steers.
    pub fn mount(&mut self, player_id: EntityId, vehicle_id: EntityId) -> bool {
        let (Some(player), Some(vehicle)) = (
            self.players.get_mut(&player_id),
            self.vehicles.get_mut(&vehicle_id),
        ) else {
            return false;
        };
        board(player, vehicle)
    }

    /// Takes a player off its vehicle, leaving it standing on top.
    pub fn dismount(&mut self, player_id: EntityId) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        leave(player, &mut self.vehicles).is_some()
    }

    /// The vehicle the player sits on. Vehicles only carry players, so this is
    /// the whole riding stack.
    pub fn root_vehicle(&self, player_id: EntityId) -> Option<EntityId> {
        self.players.get(&player_id)?.vehicle
    }

    /// The vehicle this player is steering, if any.
    pub fn controlled_vehicle(&self, player_id: EntityId) -> Option<&Vehicle> {
        let vehicle = self.vehicles.get(&self.root_vehicle(player_id)?)?;
        (vehicle.controlling_passenger() == Some(player_id)).then_some(vehicle)
    }

    pub fn set_permission_level(&mut self, player_id: EntityId, level: u8) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.permission_level = level;
                true
            }
            None => false,
        }
    }

    /// Advances everything the server simulates itself: unridden vehicles
    /// fall and collide, velocities decay, passengers follow their vehicle.
    pub fn step(&mut self) {
        self.tick += 1;

        for vehicle in self.vehicles.values_mut() {
            if vehicle.passengers.is_empty() && !vehicle.no_gravity {
                vehicle.velocity.y -= GRAVITY;
                let result = physics::move_entity(
                    &self.world,
                    vehicle.bounding_box(),
                    vehicle.velocity,
                    0.0,
                );
                vehicle.pos = vehicle.pos + result.applied;
                if result.collided_vertically {
                    vehicle.on_ground = result.landed;
                    vehicle.velocity.y = 0.0;
                } else {
                    vehicle.on_ground = false;
                }
                if result.collided_horizontally {
                    vehicle.velocity.x = 0.0;
                    vehicle.velocity.z = 0.0;
                }
            }
            vehicle.decay_velocity();
        }

        for player in self.players.values_mut() {
            player.decay_velocity();
            if let Some(vehicle) = player.vehicle.and_then(|id| self.vehicles.get(&id)) {
                player.pos = vehicle.passenger_position();
            }
        }
    }
}

/// Seats `player` on `vehicle`. Fails if the player is already riding.
pub fn board(player: &mut Player, vehicle: &mut Vehicle) -> bool {
    if player.vehicle.is_some() {
        return false;
    }

    vehicle.passengers.push(player.id);
    player.vehicle = Some(vehicle.id);
    player.gliding = false;
    player.fall_distance = 0.0;
    player.pos = vehicle.passenger_position();
    debug!("Player {} mounted vehicle {}", player.id, vehicle.id);
    true
}

/// Takes `player` off whatever it is riding and sets it down on top of the
/// vehicle. Returns the vehicle it left.
pub fn leave(player: &mut Player, vehicles: &mut HashMap<EntityId, Vehicle>) -> Option<EntityId> {
    let vehicle_id = player.vehicle.take()?;
    if let Some(vehicle) = vehicles.get_mut(&vehicle_id) {
        vehicle.passengers.retain(|id| *id != player.id);
        let (_, height) = vehicle.kind.dimensions();
        player.pos = vehicle.pos + Vec3::new(0.0, height, 0.0);
    }
    debug!("Player {} dismounted vehicle {}", player.id, vehicle_id);
    Some(vehicle_id)
}
