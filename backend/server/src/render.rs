//! # Card Rendering
//!
//! The whole kiosk is one flip card, re-rendered after every action.
//!
//! - Front: total, one row per drink with -/+ buttons, one row per deposit tier for returns
//! - Back: PIN prompt while the gate is awaiting a PIN, catalog editor once unlocked
//!
//! Returns recorded for a deposit amount the catalog no longer has still count against
//! the total. They get a stale row that can only be decremented.
//!
//! Buttons are plain htmx (`hx-post`, `hx-target="body"`), no client side state.
use std::collections::BTreeSet;

use minijinja::Environment;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    catalog::{ConfigError, PriceCatalog},
    session::SessionState,
    total::{compute_total, deposit_return_total, line_total},
    utils::format_money,
};

pub const CARD_TEMPLATE: &str = "card.html";

/// Shown in place of an amount too large to compute.
pub const OVERFLOW: &str = "---";

pub fn templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(CARD_TEMPLATE, include_str!("../templates/card.html"))?;

    Ok(env)
}

#[derive(Serialize)]
pub struct CardView {
    pub total: String,
    pub negative: bool,
    pub overflow: bool,
    pub drinks: Vec<DrinkRow>,
    pub returns: Vec<ReturnRow>,
    pub flipped: bool,
    pub gate: &'static str,
    pub pin_error: Option<String>,
    pub catalog_yaml: Option<String>,
    pub notice: Option<String>,
}

#[derive(Serialize)]
pub struct DrinkRow {
    pub index: usize,
    pub name: String,
    pub price: String,
    pub deposit: Option<String>,
    pub count: u32,
    pub subtotal: String,
}

#[derive(Serialize)]
pub struct ReturnRow {
    pub amount: String,
    pub label: String,
    pub count: u32,
    pub subtotal: String,
    pub stale: bool,
}

fn money(amount: Option<Decimal>) -> String {
    amount.map_or_else(|| OVERFLOW.to_string(), format_money)
}

impl CardView {
    /// `notice` is shown on the admin side, used for rejected uploads.
    pub fn new(
        catalog: &PriceCatalog,
        session: &SessionState,
        notice: Option<String>,
    ) -> Result<Self, ConfigError> {
        let total = compute_total(catalog, session);

        let drinks = catalog
            .drinks()
            .iter()
            .zip(&session.counts)
            .enumerate()
            .map(|(index, (drink, &count))| DrinkRow {
                index,
                name: drink.name.clone(),
                price: format_money(drink.price),
                deposit: (!drink.deposit.is_zero()).then(|| format_money(drink.deposit)),
                count,
                subtotal: money(line_total(drink, count)),
            })
            .collect();

        let stored = session
            .deposit_returns
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(amount, _)| amount.normalize());
        let amounts: BTreeSet<Decimal> = catalog.deposit_tiers().into_iter().chain(stored).collect();

        let returns = amounts
            .into_iter()
            .map(|amount| {
                let count = session.returned(amount);

                ReturnRow {
                    amount: amount.to_string(),
                    label: format_money(amount),
                    count,
                    subtotal: money(deposit_return_total(amount, count)),
                    stale: !catalog.has_deposit_tier(amount),
                }
            })
            .collect();

        // The editor text is only needed once unlocked
        let catalog_yaml = if session.gate.is_unlocked() {
            Some(catalog.serialize()?)
        } else {
            None
        };

        Ok(Self {
            total: money(total),
            negative: total.is_some_and(|total| total.is_sign_negative() && !total.is_zero()),
            overflow: total.is_none(),
            drinks,
            returns,
            flipped: session.ui_flipped,
            gate: session.gate.name(),
            pin_error: session.gate.error().map(str::to_string),
            catalog_yaml,
            notice,
        })
    }
}

pub fn render_card(env: &Environment<'static>, view: &CardView) -> Result<String, minijinja::Error> {
    env.get_template(CARD_TEMPLATE)?.render(view)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CardView, OVERFLOW, render_card, templates};
    use crate::{
        catalog::{Drink, PriceCatalog},
        gate::PinGate,
        session::SessionState,
    };

    fn catalog() -> PriceCatalog {
        PriceCatalog::new(
            vec![
                Drink {
                    name: "Cola <Zero>".to_string(),
                    price: Decimal::new(150, 2),
                    deposit: Decimal::new(25, 2),
                },
                Drink {
                    name: "Kaffee".to_string(),
                    price: Decimal::new(120, 2),
                    deposit: Decimal::ZERO,
                },
            ],
            Decimal::new(25, 2),
        )
    }

    #[test]
    fn test_view_rows() {
        let catalog = catalog();
        let session = SessionState {
            counts: vec![2, 1],
            deposit_returns: [(Decimal::new(25, 2), 1)].into_iter().collect(),
            ..SessionState::default()
        };

        let view = CardView::new(&catalog, &session, None).unwrap();

        assert_eq!(view.total, "4.45");
        assert!(!view.negative);
        assert_eq!(view.drinks[0].subtotal, "3.50");
        assert_eq!(view.drinks[0].deposit.as_deref(), Some("0.25"));
        assert_eq!(view.drinks[1].deposit, None);
        assert_eq!(view.returns.len(), 1);
        assert_eq!(view.returns[0].amount, "0.25");
        assert_eq!(view.returns[0].count, 1);
        assert!(!view.returns[0].stale);
        assert_eq!(view.gate, "locked");
        assert!(view.catalog_yaml.is_none());
    }

    #[test]
    fn test_editor_only_when_unlocked() {
        let catalog = catalog();
        let session = SessionState {
            counts: vec![0, 0],
            ui_flipped: true,
            gate: PinGate::Unlocked,
            ..SessionState::default()
        };

        let view = CardView::new(&catalog, &session, Some("bad upload".to_string())).unwrap();

        assert!(view.catalog_yaml.unwrap().contains("Kaffee"));
        assert_eq!(view.notice.as_deref(), Some("bad upload"));
    }

    #[test]
    fn test_stale_deposit_row() {
        let catalog = catalog();
        let session = SessionState {
            counts: vec![0, 1],
            deposit_returns: [(Decimal::new(8, 2), 3), (Decimal::new(15, 2), 0)]
                .into_iter()
                .collect(),
            ..SessionState::default()
        };

        let view = CardView::new(&catalog, &session, None).unwrap();

        // 1.20 - 3 * 0.08
        assert_eq!(view.total, "0.96");
        assert_eq!(view.returns.len(), 2);
        assert_eq!(view.returns[0].amount, "0.08");
        assert_eq!(view.returns[0].subtotal, "0.24");
        assert!(view.returns[0].stale);
        assert!(!view.returns[1].stale);

        let html = render_card(&templates().unwrap(), &view).unwrap();
        assert!(html.contains("/return_pfand/0.08/-1"));
        assert!(!html.contains("/return_pfand/0.08/1\""));
    }

    #[test]
    fn test_overflow_renders() {
        let catalog = PriceCatalog::new(
            vec![Drink {
                name: "Gold".to_string(),
                price: Decimal::MAX,
                deposit: Decimal::ZERO,
            }],
            Decimal::ZERO,
        );
        let session = SessionState {
            counts: vec![2],
            ..SessionState::default()
        };

        let view = CardView::new(&catalog, &session, None).unwrap();

        assert!(view.overflow);
        assert!(!view.negative);
        assert_eq!(view.total, OVERFLOW);
        assert_eq!(view.drinks[0].subtotal, OVERFLOW);
        assert!(render_card(&templates().unwrap(), &view).is_ok());
    }

    #[test]
    fn test_render_escapes_names() {
        let env = templates().unwrap();
        let catalog = catalog();
        let session = SessionState::default().reconcile(&catalog);

        let html = render_card(&env, &CardView::new(&catalog, &session, None).unwrap()).unwrap();

        assert!(html.contains("Cola &lt;Zero&gt;"));
        assert!(html.contains("/change/1/1"));
        assert!(html.contains("/return_pfand/0.25/-1"));
    }
}
