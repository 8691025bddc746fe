//! # Price Catalog
//!
//! Shared list of drinks every kiosk device tallies against.
//!
//!
//!
//! ## Format
//!
//! ```yaml
//! pfand_default: 0.25
//! drinks:
//!   - name: Cola
//!     price: 1.50
//!     pfand: true
//!   - name: Wasser
//!     price: 1.00
//!     pfand: 0.15
//!   - name: Kaffee
//!     price: 1.20
//! ```
//!
//! - `pfand_default` falls back to the legacy `pfand` key, then to zero
//! - Per drink `pfand` is either a boolean (`true` uses `pfand_default`) or an explicit amount
//! - Amounts can be YAML numbers or numeric strings, never negative, at most 100000
//! - Plain numbers go through `f64`, anything past 15 significant digits has to be quoted
//! - `serialize` writes every amount quoted, with its exact digits
//!
//!
//!
//! ## Snapshots
//!
//! The catalog is an immutable value. Uploads build a whole new catalog and swap the
//! `Arc` held by [`CatalogStore`], so a request that grabbed a snapshot keeps seeing
//! the same drinks list and default deposit until it is done.
//!
//! Drinks are matched to session counts by position. Reordering or removing drinks
//! remaps existing counts by index, see `SessionState::reconcile`.
use std::{fs::read_to_string, path::Path, str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Catalog has no drinks list")]
    MissingDrinks,

    #[error("Drink {index} is missing its {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount { field: String, value: String },

    #[error("Negative amount for {field}")]
    NegativeAmount { field: String },

    #[error("Amount for {field} exceeds 100000")]
    AmountTooLarge { field: String },
}

/// Largest price or deposit a catalog accepts.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// Any decimal with at most this many significant digits survives a trip through `f64`.
const F64_EXACT_DIGITS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drink {
    pub name: String,
    pub price: Decimal,
    pub deposit: Decimal,
}

impl Drink {
    /// Price charged per tally, deposit included. `None` on overflow.
    pub fn unit_price(&self) -> Option<Decimal> {
        self.price.checked_add(self.deposit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceCatalog {
    drinks: Vec<Drink>,
    default_deposit: Decimal,
}

#[derive(Deserialize)]
struct RawCatalog {
    pfand_default: Option<Value>,
    pfand: Option<Value>,
    drinks: Option<Vec<RawDrink>>,
}

#[derive(Deserialize)]
struct RawDrink {
    name: Option<String>,
    price: Option<Value>,
    pfand: Option<Value>,
}

// Amounts are written as quoted strings so the editor shows the exact decimal
#[derive(Serialize)]
struct CatalogDocument<'a> {
    #[serde(with = "rust_decimal::serde::str")]
    pfand_default: Decimal,
    drinks: Vec<DrinkDocument<'a>>,
}

#[derive(Serialize)]
struct DrinkDocument<'a> {
    name: &'a str,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pfand: Decimal,
}

impl PriceCatalog {
    pub fn new(drinks: Vec<Drink>, default_deposit: Decimal) -> Self {
        Self {
            drinks,
            default_deposit,
        }
    }

    pub fn load(source: &str) -> Result<Self, ConfigError> {
        let raw: RawCatalog = serde_yaml::from_str(source)?;

        let default_deposit = match raw.pfand_default.or(raw.pfand) {
            Some(value) => parse_amount("pfand_default", &value)?,
            None => Decimal::ZERO,
        };

        let drinks = raw
            .drinks
            .ok_or(ConfigError::MissingDrinks)?
            .into_iter()
            .enumerate()
            .map(|(index, drink)| parse_drink(index, drink, default_deposit))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(drinks, default_deposit))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = read_to_string(path)?;

        Self::load(&source)
    }

    pub fn serialize(&self) -> Result<String, ConfigError> {
        let document = CatalogDocument {
            pfand_default: self.default_deposit,
            drinks: self
                .drinks
                .iter()
                .map(|drink| DrinkDocument {
                    name: &drink.name,
                    price: drink.price,
                    pfand: drink.deposit,
                })
                .collect(),
        };

        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn drinks(&self) -> &[Drink] {
        &self.drinks
    }

    pub fn default_deposit(&self) -> Decimal {
        self.default_deposit
    }

    pub fn len(&self) -> usize {
        self.drinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drinks.is_empty()
    }

    /// Positive deposit amounts in use, ascending and without duplicates.
    pub fn deposit_tiers(&self) -> Vec<Decimal> {
        let mut tiers: Vec<Decimal> = self
            .drinks
            .iter()
            .map(|drink| drink.deposit.normalize())
            .filter(|deposit| *deposit > Decimal::ZERO)
            .collect();

        tiers.sort();
        tiers.dedup();
        tiers
    }

    pub fn has_deposit_tier(&self, amount: Decimal) -> bool {
        amount > Decimal::ZERO && self.drinks.iter().any(|drink| drink.deposit == amount)
    }
}

fn parse_drink(index: usize, raw: RawDrink, default_deposit: Decimal) -> Result<Drink, ConfigError> {
    let name = raw
        .name
        .ok_or(ConfigError::MissingField { index, field: "name" })?;

    let price = match raw.price {
        Some(value) if !value.is_null() => parse_amount(&format!("drinks[{index}].price"), &value)?,
        _ => return Err(ConfigError::MissingField { index, field: "price" }),
    };

    let deposit = match raw.pfand {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Decimal::ZERO,
        Some(Value::Bool(true)) => default_deposit,
        Some(value) => parse_amount(&format!("drinks[{index}].pfand"), &value)?,
    };

    Ok(Drink {
        name,
        price,
        deposit,
    })
}

/// Plain YAML numbers arrive as `f64`, so a float with more digits than `f64` keeps is
/// rejected rather than rounded. Such amounts have to be quoted.
fn parse_amount(field: &str, value: &Value) -> Result<Decimal, ConfigError> {
    let text = match value {
        Value::Number(number) if number.is_f64() => {
            let text = number.to_string();

            if significant_digits(&text) > F64_EXACT_DIGITS {
                return Err(ConfigError::InvalidAmount {
                    field: field.to_string(),
                    value: format!("{text} (quote amounts with more than {F64_EXACT_DIGITS} digits)"),
                });
            }

            text
        }
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        other => {
            return Err(ConfigError::InvalidAmount {
                field: field.to_string(),
                value: format!("{other:?}"),
            });
        }
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ConfigError::InvalidAmount {
            field: field.to_string(),
            value: text.clone(),
        })?;

    if amount < Decimal::ZERO {
        return Err(ConfigError::NegativeAmount {
            field: field.to_string(),
        });
    }

    if amount > MAX_AMOUNT {
        return Err(ConfigError::AmountTooLarge {
            field: field.to_string(),
        });
    }

    Ok(amount)
}

fn significant_digits(number: &str) -> usize {
    let mantissa = number.split(['e', 'E']).next().unwrap_or_default();
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    digits.trim_start_matches('0').trim_end_matches('0').len()
}

pub struct CatalogStore {
    current: RwLock<Arc<PriceCatalog>>,
}

impl CatalogStore {
    pub fn new(catalog: PriceCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub async fn snapshot(&self) -> Arc<PriceCatalog> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, catalog: PriceCatalog) -> Arc<PriceCatalog> {
        let catalog = Arc::new(catalog);
        *self.current.write().await = catalog.clone();

        catalog
    }

    /// Parses an admin upload and swaps it in. A failed parse leaves the current catalog active.
    pub async fn apply_upload(&self, raw: &str) -> Result<Arc<PriceCatalog>, ConfigError> {
        let catalog = PriceCatalog::load(raw)?;

        info!(
            "Catalog replaced: {} drinks, default deposit {}",
            catalog.len(),
            catalog.default_deposit()
        );

        Ok(self.replace(catalog).await)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CatalogStore, ConfigError, Drink, MAX_AMOUNT, PriceCatalog};

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    const SAMPLE: &str = r#"
pfand_default: 0.25
drinks:
  - name: Cola
    price: 1.50
    pfand: true
  - name: Wasser
    price: "1.00"
    pfand: 0.15
  - name: Kaffee
    price: 1.2
"#;

    #[test]
    fn test_load_sample() {
        let catalog = PriceCatalog::load(SAMPLE).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.default_deposit(), dec("0.25"));

        let drinks = catalog.drinks();
        assert_eq!(drinks[0].name, "Cola");
        assert_eq!(drinks[0].price, dec("1.50"));
        assert_eq!(drinks[0].deposit, dec("0.25"));
        assert_eq!(drinks[1].price, dec("1.00"));
        assert_eq!(drinks[1].deposit, dec("0.15"));
        assert_eq!(drinks[2].deposit, Decimal::ZERO);
    }

    #[test]
    fn test_legacy_default_key() {
        let catalog = PriceCatalog::load(
            "pfand: 0.08\ndrinks:\n  - name: Bier\n    price: 2\n    pfand: true\n  - name: Saft\n    price: 1\n    pfand: false\n",
        )
        .unwrap();

        assert_eq!(catalog.default_deposit(), dec("0.08"));
        assert_eq!(catalog.drinks()[0].deposit, dec("0.08"));
        assert_eq!(catalog.drinks()[1].deposit, Decimal::ZERO);
    }

    #[test]
    fn test_missing_default_is_zero() {
        let catalog = PriceCatalog::load("drinks:\n  - name: Mate\n    price: 2.5\n    pfand: true\n").unwrap();

        assert_eq!(catalog.default_deposit(), Decimal::ZERO);
        assert_eq!(catalog.drinks()[0].deposit, Decimal::ZERO);
    }

    #[test]
    fn test_missing_drinks() {
        let result = PriceCatalog::load("pfand_default: 0.25\n");

        assert!(matches!(result, Err(ConfigError::MissingDrinks)));
    }

    #[test]
    fn test_missing_fields() {
        let no_name = PriceCatalog::load("drinks:\n  - price: 1.0\n");
        assert!(matches!(
            no_name,
            Err(ConfigError::MissingField { index: 0, field: "name" })
        ));

        let no_price = PriceCatalog::load("drinks:\n  - name: Cola\n  - name: Mate\n    price: 2\n");
        assert!(matches!(
            no_price,
            Err(ConfigError::MissingField { index: 0, field: "price" })
        ));
    }

    #[test]
    fn test_invalid_amounts() {
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Cola\n    price: -1\n"),
            Err(ConfigError::NegativeAmount { .. })
        ));
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Cola\n    price: cheap\n"),
            Err(ConfigError::InvalidAmount { .. })
        ));
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Cola\n    price: 1\n    pfand: [1]\n"),
            Err(ConfigError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_amount_limit() {
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Gold\n    price: \"79228162514264337593543950335\"\n"),
            Err(ConfigError::AmountTooLarge { .. })
        ));
        assert!(matches!(
            PriceCatalog::load("pfand_default: 100000.01\ndrinks: []\n"),
            Err(ConfigError::AmountTooLarge { .. })
        ));

        let catalog = PriceCatalog::load("drinks:\n  - name: Fass\n    price: 100000\n").unwrap();
        assert_eq!(catalog.drinks()[0].price, MAX_AMOUNT);
    }

    #[test]
    fn test_imprecise_float_rejected() {
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Cola\n    price: 12345.678901234567891\n"),
            Err(ConfigError::InvalidAmount { .. })
        ));
        assert!(matches!(
            PriceCatalog::load("drinks:\n  - name: Cola\n    price: 12345678901234567.89\n"),
            Err(ConfigError::InvalidAmount { .. })
        ));

        // the same digits quoted are exact
        let catalog = PriceCatalog::load("drinks:\n  - name: Cola\n    price: \"12345.678901234567891\"\n").unwrap();
        assert_eq!(catalog.drinks()[0].price, dec("12345.678901234567891"));
    }

    #[test]
    fn test_not_yaml() {
        assert!(PriceCatalog::load("drinks: [unclosed").is_err());
        assert!(PriceCatalog::load("just a string").is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let catalog = PriceCatalog::load(SAMPLE).unwrap();
        let reloaded = PriceCatalog::load(&catalog.serialize().unwrap()).unwrap();

        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn test_serialize_round_trip_precise_amounts() {
        let catalog = PriceCatalog::load(
            "pfand_default: \"0.0800\"\ndrinks:\n  - name: Cola\n    price: \"0.1234567890123456789\"\n    pfand: true\n",
        )
        .unwrap();

        let yaml = catalog.serialize().unwrap();
        let reloaded = PriceCatalog::load(&yaml).unwrap();

        assert!(yaml.contains("0.1234567890123456789"));
        assert_eq!(reloaded, catalog);
        assert_eq!(reloaded.drinks()[0].price, dec("0.1234567890123456789"));
    }

    #[test]
    fn test_serialize_round_trip_unicode_names() {
        let catalog = PriceCatalog::new(
            vec![
                Drink {
                    name: "Spezi (0,5 l)".to_string(),
                    price: dec("2.05"),
                    deposit: dec("0.08"),
                },
                Drink {
                    name: "Kräutertee".to_string(),
                    price: dec("0.9"),
                    deposit: Decimal::ZERO,
                },
            ],
            dec("0.15"),
        );

        let reloaded = PriceCatalog::load(&catalog.serialize().unwrap()).unwrap();

        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn test_deposit_tiers() {
        let catalog = PriceCatalog::load(
            "pfand_default: 0.25\ndrinks:\n  - name: A\n    price: 1\n    pfand: true\n  - name: B\n    price: 1\n    pfand: 0.08\n  - name: C\n    price: 1\n    pfand: 0.250\n  - name: D\n    price: 1\n",
        )
        .unwrap();

        assert_eq!(catalog.deposit_tiers(), vec![dec("0.08"), dec("0.25")]);
        assert!(catalog.has_deposit_tier(dec("0.25")));
        assert!(!catalog.has_deposit_tier(dec("0.15")));
        assert!(!catalog.has_deposit_tier(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_catalog() {
        let store = CatalogStore::new(PriceCatalog::load(SAMPLE).unwrap());

        let result = store.apply_upload("drinks:\n  - name: Cola\n").await;

        assert!(result.is_err());
        assert_eq!(store.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn test_upload_swaps_snapshot() {
        let store = CatalogStore::new(PriceCatalog::load(SAMPLE).unwrap());
        let before = store.snapshot().await;

        let after = store
            .apply_upload("pfand_default: 0.5\ndrinks:\n  - name: Mate\n    price: 2\n    pfand: true\n")
            .await
            .unwrap();

        assert_eq!(before.len(), 3);
        assert_eq!(before.default_deposit(), dec("0.25"));
        assert_eq!(after.len(), 1);
        assert_eq!(after.drinks()[0].deposit, dec("0.5"));
        assert_eq!(store.snapshot().await.len(), 1);
    }
}
