pub mod math;

use serde::{Deserialize, Serialize};

pub use math::{wrap_degrees, Aabb, BlockPos, Vec3};

pub const PROTOCOL_VERSION: u32 = 1;
pub const TICKS_PER_SECOND: u32 = 20;

/// Largest accepted absolute coordinate on the X and Z axes.
pub const MAX_HORIZONTAL_COORD: f64 = 3.0e7;
/// Largest accepted absolute coordinate on the Y axis.
pub const MAX_VERTICAL_COORD: f64 = 2.0e7;

pub const PLAYER_WIDTH: f64 = 0.6;
pub const PLAYER_HEIGHT: f64 = 1.8;
pub const PLAYER_EYE_HEIGHT: f64 = 1.62;
pub const STEP_HEIGHT: f64 = 0.6;
pub const JUMP_POWER: f64 = 0.42;
pub const GRAVITY: f64 = 0.08;
pub const WALK_SPEED: f64 = 0.2;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> server
    Connect {
        client_version: u32,
    },
    Move(MoveIntent),
    MoveVehicle(VehicleMoveIntent),
    AcceptTeleport {
        teleport_id: i32,
    },
    KeepAliveResponse {
        challenge: u64,
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
    ChangeGameMode {
        mode: GameMode,
    },
    CloseScreen {
        screen_id: u8,
    },
    /// Use or board another entity.
    Interact {
        entity_id: u32,
    },
    Disconnect,

    // server -> client
    Connected {
        client_id: u32,
        entity_id: u32,
    },
    PlayerPosition {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        relative: RelativeFlags,
        teleport_id: i32,
    },
    VehiclePosition {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    KeepAlive {
        challenge: u64,
    },
    ActionAck {
        sequence: u32,
    },
    OpenScreen {
        screen_id: u8,
        vehicle_id: u32,
    },
    SetPassengers {
        vehicle_id: u32,
        passengers: Vec<u32>,
    },
    Disconnected {
        category: DisconnectCategory,
        reason: String,
    },
}

/// A player movement request. Absent fields keep the server's current value.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct MoveIntent {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub on_ground: bool,
}

impl MoveIntent {
    pub fn position(x: f64, y: f64, z: f64, on_ground: bool) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            yaw: None,
            pitch: None,
            on_ground,
        }
    }

    pub fn rotation(yaw: f32, pitch: f32, on_ground: bool) -> Self {
        Self {
            yaw: Some(yaw),
            pitch: Some(pitch),
            on_ground,
            ..Default::default()
        }
    }

    pub fn has_position(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some()
    }

    pub fn has_rotation(&self) -> bool {
        self.yaw.is_some() || self.pitch.is_some()
    }
}

/// Absolute position and rotation of the vehicle the client is steering.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct VehicleMoveIntent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

/// Fields of a position correction that are offsets rather than absolute values.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelativeFlags(pub u8);

impl RelativeFlags {
    pub const NONE: RelativeFlags = RelativeFlags(0);
    pub const X: RelativeFlags = RelativeFlags(1);
    pub const Y: RelativeFlags = RelativeFlags(1 << 1);
    pub const Z: RelativeFlags = RelativeFlags(1 << 2);
    pub const YAW: RelativeFlags = RelativeFlags(1 << 3);
    pub const PITCH: RelativeFlags = RelativeFlags(1 << 4);
    pub const ALL: RelativeFlags = RelativeFlags(0b1_1111);

    pub fn contains(&self, other: RelativeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: RelativeFlags) -> RelativeFlags {
        RelativeFlags(self.0 | other.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    StartDestroyBlock,
    AbortDestroyBlock,
    StopDestroyBlock,
    DropItem,
    DropAllItems,
    SwapItemWithOffhand,
    ReleaseUseItem,
}

impl PlayerAction {
    pub fn is_world_edit(&self) -> bool {
        matches!(
            self,
            PlayerAction::StartDestroyBlock
                | PlayerAction::AbortDestroyBlock
                | PlayerAction::StopDestroyBlock
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    PressShiftKey,
    ReleaseShiftKey,
    StopSleeping,
    StartSprinting,
    StopSprinting,
    StartRidingJump,
    StopRidingJump,
    OpenInventory,
    StartFallFlying,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCategory {
    Timeout,
    InvalidMovement,
    InvalidVehicleMovement,
    Flying,
    IllegalInput,
    Idling,
    Spam,
    ServerFull,
    OutdatedClient,
}
