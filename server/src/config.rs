//! Server tuning knobs. Every validator constant lives here so the binary can
//! override it from the command line and tests can tighten it.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation steps per second.
    pub tick_rate: u32,
    pub max_clients: usize,

    /// Wall-clock interval between liveness challenges. A challenge still
    /// unanswered when the next one is due ends the session.
    pub keep_alive_interval: Duration,
    /// Ticks without acknowledgment before a correction is sent again.
    pub teleport_resend_ticks: u64,

    /// Consecutive floating ticks that end the session.
    pub max_floating_ticks: u32,
    /// Move intents per tick above which the burst multiplier collapses to 1.
    pub move_burst_limit: u32,
    /// Squared distance allowed per move intent beyond current velocity.
    pub speed_budget: f64,
    /// Same as `speed_budget` while gliding.
    pub glide_speed_budget: f64,
    pub vehicle_speed_budget: f64,
    /// Squared divergence between requested and simulated position that counts
    /// as moving wrongly.
    pub moved_wrongly_threshold: f64,
    /// When set, nobody is kicked for floating.
    pub allow_flight: bool,
    /// Loopback sessions skip speed checks and never time out.
    pub trust_local_sessions: bool,
    /// Sessions with no activity for this long are closed. `None` disables it.
    pub idle_timeout: Option<Duration>,

    pub game_mode_permission_level: u8,
    /// Permission level that may edit blocks inside the spawn protection radius.
    pub spawn_protection_bypass_level: u8,
    /// Block radius around spawn protected from edits. 0 disables protection.
    pub spawn_protection_radius: i32,
    /// Players spawn at a random point within this many blocks of the spawn point.
    pub spawn_radius: f64,
    /// Maximum distance from the eyes to the centre of an edited block.
    pub max_interaction_distance: f64,
    /// Drop-spam score above which a non-operator is disconnected.
    pub drop_spam_limit: u32,
    /// Maximum queued intents per session before new ones are dropped.
    pub max_queued_intents: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: shared::TICKS_PER_SECOND,
            max_clients: 32,
            keep_alive_interval: Duration::from_secs(15),
            teleport_resend_ticks: 20,
            max_floating_ticks: 80,
            move_burst_limit: 5,
            speed_budget: 100.0,
            glide_speed_budget: 300.0,
            vehicle_speed_budget: 100.0,
            moved_wrongly_threshold: 0.0625,
            allow_flight: false,
            trust_local_sessions: false,
            idle_timeout: None,
            game_mode_permission_level: 2,
            spawn_protection_bypass_level: 2,
            spawn_protection_radius: 16,
            spawn_radius: 0.0,
            max_interaction_distance: 6.0,
            drop_spam_limit: 1480,
            max_queued_intents: 256,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::NoCapacity);
        }
        if self.keep_alive_interval.is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        if self.speed_budget <= 0.0
            || self.glide_speed_budget <= 0.0
            || self.vehicle_speed_budget <= 0.0
        {
            return Err(ConfigError::NonPositiveBudget);
        }
        if self.spawn_radius < 0.0 || !self.spawn_radius.is_finite() {
            return Err(ConfigError::InvalidSpawnRadius);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Tick rate must be between 1 and 1000, got {0}")]
    InvalidTickRate(u32),

    #[error("Server must accept at least one client")]
    NoCapacity,

    #[error("Keep-alive interval must be non-zero")]
    ZeroKeepAlive,

    #[error("Speed budgets must be positive")]
    NonPositiveBudget,

    #[error("Spawn radius must be a finite non-negative number")]
    InvalidSpawnRadius,
}
