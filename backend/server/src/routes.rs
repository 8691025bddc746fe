use std::{str::FromStr, sync::Arc};

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::PriceCatalog,
    error::AppError,
    render::{CardView, render_card},
    session::SessionState,
    state::AppState,
};

pub const DEVICE_COOKIE: &str = "kiosk_device";

#[derive(Deserialize)]
pub struct PinForm {
    pin: String,
}

#[derive(Deserialize)]
pub struct UploadForm {
    yaml_text: String,
}

fn device_id(jar: CookieJar) -> (CookieJar, String) {
    if let Some(device) = jar.get(DEVICE_COOKIE).map(|cookie| cookie.value().to_string()) {
        return (jar, device);
    }

    let device = Uuid::new_v4().to_string();
    debug!("New device {device}");

    let cookie = Cookie::build((DEVICE_COOKIE, device.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    (jar.add(cookie), device)
}

fn card(
    state: &AppState,
    catalog: &PriceCatalog,
    session: &SessionState,
    notice: Option<String>,
) -> Result<Html<String>, AppError> {
    let view = CardView::new(catalog, session, notice)?;

    Ok(Html(render_card(&state.templates, &view)?))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn card_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);
    let (catalog, session) = state.load_session(&device).await;

    // A fresh tally is not stored until it changes
    if session != SessionState::reset().reconcile(&catalog) {
        state.save_session(&device, &session).await;
    }

    Ok((jar, card(&state, &catalog, &session, None)?))
}

pub async fn flip_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);
    let (catalog, mut session) = state.load_session(&device).await;

    session.flip();
    debug!("Device {device} gate now {}", session.gate.name());

    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, None)?))
}

pub async fn pin_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<PinForm>,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);
    let (catalog, mut session) = state.load_session(&device).await;

    session.submit_pin(&form.pin, &state.config.admin_pin);
    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, None)?))
}

pub async fn change_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path((index, delta)): Path<(usize, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);
    let (catalog, mut session) = state.load_session(&device).await;

    if let Err(e) = session.adjust_count(index, delta) {
        debug!("Ignoring count change from {device}: {e}");
    }

    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, None)?))
}

pub async fn return_pfand_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path((amount, delta)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let amount = Decimal::from_str(&amount).map_err(|_| AppError::MalformedPayload)?;

    let (jar, device) = device_id(jar);
    let (catalog, mut session) = state.load_session(&device).await;

    if let Err(e) = session.adjust_deposit_return(amount, delta, &catalog) {
        debug!("Ignoring deposit return from {device}: {e}");
    }

    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, None)?))
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<UploadForm>,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);
    let (catalog, session) = state.load_session(&device).await;

    if !session.gate.is_unlocked() {
        warn!("Rejected catalog upload from locked device {device}");
        return Err(AppError::Forbidden);
    }

    let (catalog, session, notice) = match state.catalog.apply_upload(&form.yaml_text).await {
        Ok(updated) => {
            info!("Catalog uploaded by {device}");
            let session = session.reconcile(&updated);

            (updated, session, None)
        }
        Err(e) => {
            warn!("Catalog upload from {device} rejected: {e}");

            (catalog, session, Some(e.to_string()))
        }
    };

    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, notice)?))
}

pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, device) = device_id(jar);

    let catalog = state.catalog.snapshot().await;
    let session = SessionState::reset().reconcile(&catalog);

    info!("Device {device} reset");
    state.save_session(&device, &session).await;

    Ok((jar, card(&state, &catalog, &session, None)?))
}
