use log::debug;
use shared::{Aabb, GameMode, Vec3, JUMP_POWER, PLAYER_EYE_HEIGHT, PLAYER_HEIGHT, PLAYER_WIDTH};

pub type EntityId = u32;

/// Fall distance a player survives without damage.
pub const SAFE_FALL_DISTANCE: f64 = 3.0;
/// Horizontal boost added to a sprinting jump.
const SPRINT_JUMP_BOOST: f64 = 0.2;
/// Vertical velocity of a fully charged riding jump.
const VEHICLE_JUMP_STRENGTH: f64 = 1.0;

/// Horizontal velocity damping applied every tick.
const HORIZONTAL_DRAG: f64 = 0.91;
/// Vertical velocity damping applied every tick.
const VERTICAL_DRAG: f64 = 0.98;
/// Velocity components smaller than this snap to zero.
const VELOCITY_EPSILON: f64 = 0.003;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Abilities {
    pub may_fly: bool,
    pub flying: bool,
    pub instabuild: bool,
}

/// Server-side state of a player-controlled entity.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: EntityId,
    pub pos: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    pub game_mode: GameMode,
    pub abilities: Abilities,
    pub levitating: bool,
    pub sleeping: bool,
    pub gliding: bool,
    /// Has a glider equipped; required to start gliding.
    pub can_glide: bool,
    pub sneaking: bool,
    pub sprinting: bool,
    pub permission_level: u8,
    pub fall_distance: f64,
    pub dimension: u32,
    pub vehicle: Option<EntityId>,
    pub dead: bool,
}

impl Player {
    pub fn new(id: EntityId, pos: Vec3) -> Self {
        Self {
            id,
            pos,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            game_mode: GameMode::Survival,
            abilities: Abilities::default(),
            levitating: false,
            sleeping: false,
            gliding: false,
            can_glide: false,
            sneaking: false,
            sprinting: false,
            permission_level: 0,
            fall_distance: 0.0,
            dimension: 0,
            vehicle: None,
            dead: false,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box_at(self.pos)
    }

    pub fn bounding_box_at(&self, pos: Vec3) -> Aabb {
        Aabb::from_feet(pos, PLAYER_WIDTH, PLAYER_HEIGHT)
    }

    pub fn eye_position(&self) -> Vec3 {
        self.pos + Vec3::new(0.0, PLAYER_EYE_HEIGHT, 0.0)
    }

    pub fn is_passenger(&self) -> bool {
        self.vehicle.is_some()
    }

    pub fn is_spectator(&self) -> bool {
        self.game_mode == GameMode::Spectator
    }

    pub fn is_operator(&self) -> bool {
        self.permission_level > 0
    }

    /// Creative and spectator players are not held to the moved-wrongly check.
    pub fn is_movement_exempt(&self) -> bool {
        matches!(self.game_mode, GameMode::Creative | GameMode::Spectator)
    }

    /// Spectators pass through solids.
    pub fn no_physics(&self) -> bool {
        self.is_spectator()
    }

    /// Any ability, effect or state that legitimately keeps the player aloft.
    pub fn can_stay_aloft(&self) -> bool {
        self.abilities.may_fly || self.levitating || self.gliding || self.is_spectator()
    }

    pub fn set_game_mode(&mut self, mode: GameMode) {
        self.game_mode = mode;
        match mode {
            GameMode::Creative => {
                self.abilities.may_fly = true;
                self.abilities.instabuild = true;
            }
            GameMode::Spectator => {
                self.abilities.may_fly = true;
                self.abilities.flying = true;
                self.abilities.instabuild = false;
            }
            GameMode::Survival | GameMode::Adventure => {
                self.abilities = Abilities::default();
            }
        }
    }

    pub fn jump_from_ground(&mut self) {
        self.velocity.y = JUMP_POWER;
        if self.sprinting {
            let yaw = (self.yaw as f64).to_radians();
            self.velocity.x -= yaw.sin() * SPRINT_JUMP_BOOST;
            self.velocity.z += yaw.cos() * SPRINT_JUMP_BOOST;
        }
    }

    /// Tracks fall distance for a vertical displacement. Returns the distance
    /// fallen when the player lands.
    pub fn check_fall(&mut self, dy: f64, on_ground: bool) -> Option<f64> {
        if self.can_stay_aloft() || dy > 0.0 {
            self.fall_distance = 0.0;
            return None;
        }
        if on_ground {
            if self.fall_distance > 0.0 {
                let fallen = self.fall_distance;
                self.fall_distance = 0.0;
                return Some(fallen);
            }
            return None;
        }
        self.fall_distance -= dy;
        None
    }

    /// Starts gliding if the player is airborne, equipped and unhindered.
    /// Otherwise any glide in progress stops. Returns whether gliding.
    pub fn try_start_gliding(&mut self, in_fluid: bool) -> bool {
        let allowed = !self.on_ground
            && !self.gliding
            && !in_fluid
            && !self.levitating
            && self.can_glide
            && !self.is_passenger();
        self.gliding = allowed;
        allowed
    }

    pub fn stop_sleeping(&mut self) -> bool {
        std::mem::replace(&mut self.sleeping, false)
    }

    pub fn decay_velocity(&mut self) {
        self.velocity = decay(self.velocity, self.on_ground);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Boat,
    Minecart,
    Horse,
}

impl VehicleKind {
    /// Footprint width and height.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            VehicleKind::Boat => (1.375, 0.5625),
            VehicleKind::Minecart => (0.98, 0.7),
            VehicleKind::Horse => (1.3965, 1.6),
        }
    }

    pub fn step_height(&self) -> f64 {
        match self {
            VehicleKind::Horse => 1.0,
            VehicleKind::Boat | VehicleKind::Minecart => 0.0,
        }
    }
}

/// A rideable entity. The first passenger steers it.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: EntityId,
    pub kind: VehicleKind,
    pub pos: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    pub no_gravity: bool,
    pub passengers: Vec<EntityId>,
    /// Riding-jump charge in percent, 0 when not charging.
    pub jump_charge: u8,
    pub has_inventory: bool,
}

impl Vehicle {
    pub fn new(id: EntityId, kind: VehicleKind, pos: Vec3) -> Self {
        Self {
            id,
            kind,
            pos,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
            no_gravity: false,
            passengers: Vec::new(),
            jump_charge: 0,
            has_inventory: kind == VehicleKind::Horse,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box_at(self.pos)
    }

    pub fn bounding_box_at(&self, pos: Vec3) -> Aabb {
        let (width, height) = self.kind.dimensions();
        Aabb::from_feet(pos, width, height)
    }

    pub fn controlling_passenger(&self) -> Option<EntityId> {
        self.passengers.first().copied()
    }

    pub fn can_jump(&self) -> bool {
        self.kind == VehicleKind::Horse
    }

    /// Where a seated passenger's feet are.
    pub fn passenger_position(&self) -> Vec3 {
        let (_, height) = self.kind.dimensions();
        self.pos + Vec3::new(0.0, height * 0.75, 0.0)
    }

    pub fn start_jump(&mut self, charge: u8) {
        if charge == 0 || !self.can_jump() {
            return;
        }
        self.jump_charge = charge.min(100);
        self.velocity.y = self.velocity.y.max(VEHICLE_JUMP_STRENGTH * self.jump_charge as f64 / 100.0);
        debug!("Vehicle {} jump charged to {}%", self.id, self.jump_charge);
    }

    pub fn stop_jump(&mut self) {
        self.jump_charge = 0;
    }

    pub fn decay_velocity(&mut self) {
        self.velocity = decay(self.velocity, self.on_ground);
    }
}

fn decay(velocity: Vec3, on_ground: bool) -> Vec3 {
    let snap = |v: f64| if v.abs() < VELOCITY_EPSILON { 0.0 } else { v };
    let y = if on_ground && velocity.y < 0.0 {
        0.0
    } else {
        velocity.y * VERTICAL_DRAG
    };
    Vec3::new(
        snap(velocity.x * HORIZONTAL_DRAG),
        snap(y),
        snap(velocity.z * HORIZONTAL_DRAG),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_creation() {
        let player = Player::new(1, Vec3::new(0.0, 64.0, 0.0));
        assert_eq!(player.id, 1);
        assert!(player.on_ground);
        assert_eq!(player.game_mode, GameMode::Survival);
        assert!(!player.is_passenger());
        assert!(!player.can_stay_aloft());
    }

    #[test]
    fn test_game_mode_sets_abilities() {
        let mut player = Player::new(1, Vec3::ZERO);

        player.set_game_mode(GameMode::Creative);
        assert!(player.abilities.may_fly);
        assert!(player.is_movement_exempt());
        assert!(!player.no_physics());

        player.set_game_mode(GameMode::Spectator);
        assert!(player.abilities.flying);
        assert!(player.no_physics());

        player.set_game_mode(GameMode::Survival);
        assert_eq!(player.abilities, Abilities::default());
        assert!(!player.is_movement_exempt());
    }

    #[test]
    fn test_jump_sets_vertical_velocity() {
        let mut player = Player::new(1, Vec3::ZERO);
        player.jump_from_ground();
        assert_approx_eq!(player.velocity.y, JUMP_POWER);
        assert_eq!(player.velocity.x, 0.0);

        let mut sprinter = Player::new(2, Vec3::ZERO);
        sprinter.sprinting = true;
        sprinter.jump_from_ground();
        assert_approx_eq!(sprinter.velocity.z, SPRINT_JUMP_BOOST);
    }

    #[test]
    fn test_fall_distance_accumulates_and_resets_on_landing() {
        let mut player = Player::new(1, Vec3::ZERO);
        assert_eq!(player.check_fall(-1.5, false), None);
        assert_eq!(player.check_fall(-2.5, false), None);
        assert_approx_eq!(player.fall_distance, 4.0);

        let landed = player.check_fall(0.0, true);
        assert_approx_eq!(landed.unwrap(), 4.0);
        assert_eq!(player.fall_distance, 0.0);
        assert_eq!(player.check_fall(0.0, true), None);
    }

    #[test]
    fn test_upward_movement_resets_fall_distance() {
        let mut player = Player::new(1, Vec3::ZERO);
        player.check_fall(-2.0, false);
        player.check_fall(0.5, false);
        assert_eq!(player.fall_distance, 0.0);
    }

    #[test]
    fn test_gliding_requirements() {
        let mut player = Player::new(1, Vec3::ZERO);
        player.on_ground = false;
        assert!(!player.try_start_gliding(false));

        player.can_glide = true;
        assert!(!player.try_start_gliding(true));
        assert!(player.try_start_gliding(false));
        assert!(player.gliding);

        // Already gliding: the request stops the glide.
        assert!(!player.try_start_gliding(false));
        assert!(!player.gliding);
    }

    #[test]
    fn test_velocity_decays_to_zero() {
        let mut player = Player::new(1, Vec3::ZERO);
        player.on_ground = false;
        player.velocity = Vec3::new(1.0, 0.42, 0.0);
        for _ in 0..400 {
            player.decay_velocity();
        }
        assert_eq!(player.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_vehicle_jump_only_for_jumpable() {
        let mut boat = Vehicle::new(10, VehicleKind::Boat, Vec3::ZERO);
        boat.start_jump(80);
        assert_eq!(boat.jump_charge, 0);

        let mut horse = Vehicle::new(11, VehicleKind::Horse, Vec3::ZERO);
        horse.start_jump(80);
        assert_eq!(horse.jump_charge, 80);
        assert_approx_eq!(horse.velocity.y, 0.8);
        horse.stop_jump();
        assert_eq!(horse.jump_charge, 0);
    }

    #[test]
    fn test_vehicle_controlling_passenger_is_first() {
        let mut boat = Vehicle::new(10, VehicleKind::Boat, Vec3::ZERO);
        assert_eq!(boat.controlling_passenger(), None);
        boat.passengers.push(3);
        boat.passengers.push(4);
        assert_eq!(boat.controlling_passenger(), Some(3));
    }
}
