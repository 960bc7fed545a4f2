use log::debug;
use shared::{wrap_degrees, MoveIntent, RelativeFlags, Vec3, WALK_SPEED};

/// Height a hovering bot climbs to before it holds still in the air.
const HOVER_HEIGHT: f64 = 2.0;
const HOVER_CLIMB_PER_TICK: f64 = 0.1;

/// Ways the bot can deliberately break the movement rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Misbehaviour {
    /// Scales every walking step. Values far above 1 trip the speed check.
    pub speed_multiplier: f64,
    /// Climb off the ground and stay there.
    pub hover: bool,
}

impl Default for Misbehaviour {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            hover: false,
        }
    }
}

/// The bot's own view of where it is.
///
/// Nothing is sent until the server has placed the bot with its first
/// correction. Every later correction replaces the local position outright;
/// the bot never tries to walk back to where it thought it was.
#[derive(Debug, Clone)]
pub struct BotState {
    pub pos: Option<Vec3>,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,

    /// Radius of the circle the bot walks around its starting point.
    radius: f64,
    center: Vec3,
    angle: f64,
    ground_y: f64,
    behaviour: Misbehaviour,

    pub moves_sent: u64,
    pub corrections: u64,
}

impl BotState {
    pub fn new(radius: f64, behaviour: Misbehaviour) -> Self {
        Self {
            pos: None,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            radius: radius.max(0.5),
            center: Vec3::ZERO,
            angle: 0.0,
            ground_y: 0.0,
            behaviour,
            moves_sent: 0,
            corrections: 0,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.pos.is_some()
    }

    /// Applies a server correction and returns the id to acknowledge.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_correction(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        relative: RelativeFlags,
        teleport_id: i32,
    ) -> i32 {
        let current = self.pos.unwrap_or(Vec3::ZERO);
        let axis = |flag: RelativeFlags, base: f64, value: f64| {
            if relative.contains(flag) {
                base + value
            } else {
                value
            }
        };
        let pos = Vec3::new(
            axis(RelativeFlags::X, current.x, x),
            axis(RelativeFlags::Y, current.y, y),
            axis(RelativeFlags::Z, current.z, z),
        );
        self.yaw = if relative.contains(RelativeFlags::YAW) {
            self.yaw + yaw
        } else {
            yaw
        };
        self.pitch = if relative.contains(RelativeFlags::PITCH) {
            self.pitch + pitch
        } else {
            pitch
        };

        if self.pos.is_none() {
            // Walk around the point we were first placed at.
            self.center = pos - Vec3::new(self.radius, 0.0, 0.0);
            self.angle = 0.0;
            self.ground_y = pos.y;
        } else {
            let offset = pos - self.center;
            self.angle = offset.z.atan2(offset.x);
        }

        debug!(
            "Correction {} to ({:.2}, {:.2}, {:.2})",
            teleport_id, pos.x, pos.y, pos.z
        );
        self.pos = Some(pos);
        self.corrections += 1;
        teleport_id
    }

    /// Produces the next move intent, or `None` until the bot is placed.
    pub fn next_move(&mut self) -> Option<MoveIntent> {
        let pos = self.pos?;

        let step = WALK_SPEED * self.behaviour.speed_multiplier;
        self.angle += step / self.radius;
        let mut target = Vec3::new(
            self.center.x + self.radius * self.angle.cos(),
            pos.y,
            self.center.z + self.radius * self.angle.sin(),
        );

        if self.behaviour.hover {
            target.y = (pos.y + HOVER_CLIMB_PER_TICK).min(self.ground_y + HOVER_HEIGHT);
            self.on_ground = false;
        } else {
            self.on_ground = true;
        }

        let heading = target - pos;
        self.yaw = wrap_degrees((heading.z.atan2(heading.x).to_degrees() - 90.0) as f32);
        self.pos = Some(target);
        self.moves_sent += 1;

        Some(MoveIntent {
            x: Some(target.x),
            y: Some(target.y),
            z: Some(target.z),
            yaw: Some(self.yaw),
            pitch: Some(self.pitch),
            on_ground: self.on_ground,
        })
    }
}
