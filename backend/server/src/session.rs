//! # Device Sessions
//!
//! Every kiosk device keeps its own tally, keyed by the `kiosk_device` cookie.
//!
//!
//!
//! ## Stored Document
//!
//! ```json
//! {
//!   "version": 1,
//!   "counts": [2, 0, 1],
//!   "deposit_returns": { "0.25": 1, "0.08": 3 },
//!   "ui_flipped": false,
//!   "gate": { "state": "locked" }
//! }
//! ```
//!
//! - Reading is lenient, a broken document never reaches the user
//! - Wrong or missing version, or a non-object document, starts a fresh session
//! - Negative or non-numeric counts become 0, unparseable deposit keys are dropped
//! - Unreadable gate falls back to `Locked`
//!
//!
//!
//! ## Reconciliation
//!
//! Counts are aligned to the catalog by index. Every read resizes them to the current
//! catalog length, truncating or padding with zeros. If an upload reorders drinks, the
//! counts stay where they were and now belong to whatever drink holds that position.
use std::{collections::BTreeMap, str::FromStr};

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::{catalog::PriceCatalog, gate::PinGate, utils::apply_delta};

pub const SESSION_VERSION: u64 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Drink index {index} out of range for {len} drinks")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No drink with deposit {0}")]
    UnknownDeposit(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub counts: Vec<u32>,
    pub deposit_returns: BTreeMap<Decimal, u32>,
    pub ui_flipped: bool,
    pub gate: PinGate,
}

#[derive(Serialize)]
struct SessionDocument<'a> {
    version: u64,
    counts: &'a [u32],
    deposit_returns: BTreeMap<String, u32>,
    ui_flipped: bool,
    gate: &'a PinGate,
}

impl SessionState {
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn reconcile(mut self, catalog: &PriceCatalog) -> Self {
        self.counts.resize(catalog.len(), 0);
        self.deposit_returns.retain(|amount, _| *amount > Decimal::ZERO);

        self
    }

    pub fn adjust_count(&mut self, index: usize, delta: i64) -> Result<u32, SessionError> {
        let len = self.counts.len();
        let count = self
            .counts
            .get_mut(index)
            .ok_or(SessionError::IndexOutOfRange { index, len })?;

        *count = apply_delta(*count, delta);

        Ok(*count)
    }

    /// Amounts the catalog no longer lists can still be taken back down, never up.
    /// A stale amount that reaches zero is dropped.
    pub fn adjust_deposit_return(
        &mut self,
        amount: Decimal,
        delta: i64,
        catalog: &PriceCatalog,
    ) -> Result<u32, SessionError> {
        let amount = amount.normalize();

        if !catalog.has_deposit_tier(amount) {
            let Some(&returned) = self.deposit_returns.get(&amount).filter(|_| delta < 0) else {
                return Err(SessionError::UnknownDeposit(amount));
            };

            let returned = apply_delta(returned, delta);
            if returned == 0 {
                self.deposit_returns.remove(&amount);
            } else {
                self.deposit_returns.insert(amount, returned);
            }

            return Ok(returned);
        }

        let returned = self.deposit_returns.entry(amount).or_insert(0);
        *returned = apply_delta(*returned, delta);

        Ok(*returned)
    }

    pub fn returned(&self, amount: Decimal) -> u32 {
        self.deposit_returns.get(&amount).copied().unwrap_or(0)
    }

    /// Flip button: opens the PIN prompt, or closes whichever admin view is showing.
    pub fn flip(&mut self) {
        self.gate = match std::mem::take(&mut self.gate) {
            gate @ PinGate::Locked => gate.request_admin(),
            gate @ PinGate::AwaitingPin { .. } => gate.cancel(),
            gate @ PinGate::Unlocked => gate.close_admin(),
        };
        self.ui_flipped = self.gate != PinGate::Locked;
    }

    pub fn submit_pin(&mut self, pin: &str, admin_pin: &str) {
        self.gate = std::mem::take(&mut self.gate).submit_pin(pin, admin_pin);
    }

    pub fn to_document(&self) -> Value {
        let document = SessionDocument {
            version: SESSION_VERSION,
            counts: &self.counts,
            deposit_returns: self
                .deposit_returns
                .iter()
                .map(|(amount, count)| (amount.normalize().to_string(), *count))
                .collect(),
            ui_flipped: self.ui_flipped,
            gate: &self.gate,
        };

        serde_json::to_value(document).unwrap_or_else(|e| {
            warn!("Failed to encode session: {e}");
            Value::Null
        })
    }

    pub fn from_document(document: &Value) -> Self {
        let Some(object) = document.as_object() else {
            warn!("Session document is not an object, starting fresh");
            return Self::default();
        };

        let version = object.get("version").and_then(Value::as_u64);
        if version != Some(SESSION_VERSION) {
            warn!("Session document version {version:?} unsupported, starting fresh");
            return Self::default();
        }

        let counts = object
            .get("counts")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(coerce_count).collect())
            .unwrap_or_default();

        let deposit_returns = object
            .get("deposit_returns")
            .and_then(Value::as_object)
            .map(parse_returns)
            .unwrap_or_default();

        let ui_flipped = object
            .get("ui_flipped")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let gate = object
            .get("gate")
            .and_then(|gate| serde_json::from_value(gate.clone()).ok())
            .unwrap_or_default();

        Self {
            counts,
            deposit_returns,
            ui_flipped,
            gate,
        }
    }

    /// Stored document (if any) to a session aligned with `catalog`.
    pub fn load(document: Option<&Value>, catalog: &PriceCatalog) -> Self {
        document
            .map(Self::from_document)
            .unwrap_or_default()
            .reconcile(catalog)
    }
}

fn coerce_count(value: &Value) -> u32 {
    value
        .as_u64()
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn parse_returns(entries: &Map<String, Value>) -> BTreeMap<Decimal, u32> {
    entries
        .iter()
        .filter_map(|(amount, count)| {
            let amount = Decimal::from_str(amount.trim()).ok()?;

            Some((amount.normalize(), coerce_count(count)))
        })
        .collect()
}
