//! # Admin Gate
//!
//! PIN challenge in front of the catalog editor on the back of the card.
//!
//! - `Locked`: tally side showing
//! - `AwaitingPin`: card flipped, PIN form showing, optionally with the last error
//! - `Unlocked`: card flipped, catalog editor showing
//!
//! The PIN is a static shared secret compared for exact equality. There is no lockout,
//! a wrong PIN just keeps the gate in `AwaitingPin` with an error attached.
use serde::{Deserialize, Serialize};
use tracing::info;

pub const WRONG_PIN: &str = "wrong PIN";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PinGate {
    #[default]
    Locked,
    AwaitingPin {
        error: Option<String>,
    },
    Unlocked,
}

impl PinGate {
    pub fn request_admin(self) -> Self {
        match self {
            PinGate::Locked => PinGate::AwaitingPin { error: None },
            other => other,
        }
    }

    pub fn submit_pin(self, pin: &str, admin_pin: &str) -> Self {
        match self {
            PinGate::AwaitingPin { .. } if pin == admin_pin => {
                info!("Admin unlocked");
                PinGate::Unlocked
            }
            PinGate::AwaitingPin { .. } => {
                info!("Admin PIN rejected");
                PinGate::AwaitingPin {
                    error: Some(WRONG_PIN.to_string()),
                }
            }
            other => other,
        }
    }

    pub fn close_admin(self) -> Self {
        match self {
            PinGate::Unlocked => PinGate::Locked,
            other => other,
        }
    }

    pub fn cancel(self) -> Self {
        match self {
            PinGate::AwaitingPin { .. } => PinGate::Locked,
            other => other,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, PinGate::Unlocked)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PinGate::AwaitingPin { error } => error.as_deref(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PinGate::Locked => "locked",
            PinGate::AwaitingPin { .. } => "awaiting_pin",
            PinGate::Unlocked => "unlocked",
        }
    }
}
