//! Reasons a session is terminated, and their wire representation.

use shared::{DisconnectCategory, Packet};

/// Why the server is closing a session.
///
/// The `Display` text is what the client is shown; no internal detail is
/// included.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectReason {
    #[error("Timed out")]
    Timeout,

    #[error("Invalid move player packet received")]
    InvalidMovement,

    #[error("Invalid move vehicle packet received")]
    InvalidVehicleMovement,

    #[error("Flying is not enabled on this server")]
    Flying,

    #[error("Illegal input: {0}")]
    IllegalInput(String),

    #[error("You have been idle for too long!")]
    Idling,

    #[error("Disconnected for spamming")]
    Spam,

    #[error("Server full")]
    ServerFull,

    #[error("Outdated client! Server runs protocol {0}")]
    OutdatedClient(u32),
}

impl DisconnectReason {
    pub fn category(&self) -> DisconnectCategory {
        match self {
            DisconnectReason::Timeout => DisconnectCategory::Timeout,
            DisconnectReason::InvalidMovement => DisconnectCategory::InvalidMovement,
            DisconnectReason::InvalidVehicleMovement => DisconnectCategory::InvalidVehicleMovement,
            DisconnectReason::Flying => DisconnectCategory::Flying,
            DisconnectReason::IllegalInput(_) => DisconnectCategory::IllegalInput,
            DisconnectReason::Idling => DisconnectCategory::Idling,
            DisconnectReason::Spam => DisconnectCategory::Spam,
            DisconnectReason::ServerFull => DisconnectCategory::ServerFull,
            DisconnectReason::OutdatedClient(_) => DisconnectCategory::OutdatedClient,
        }
    }

    pub fn to_packet(&self) -> Packet {
        Packet::Disconnected {
            category: self.category(),
            reason: self.to_string(),
        }
    }
}
