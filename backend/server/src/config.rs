use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

use crate::store::DEFAULT_SESSION_TTL;

const DEFAULT_ADMIN_PIN: &str = "0000";

pub struct Config {
    pub port: u16,
    pub drinks_path: String,
    pub static_dir: String,
    pub admin_pin: String,
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", 1111),
            drinks_path: try_load("DRINKS_PATH", "drinks.yml".to_string()),
            static_dir: try_load("STATIC_DIR", "static".to_string()),
            admin_pin: load_admin_pin(),
            session_ttl_secs: try_load("SESSION_TTL_SECS", DEFAULT_SESSION_TTL.as_secs()),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found");
    })
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default}");
        default
    })
}

fn read_secret(secret_name: &str) -> Result<String, ()> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("Failed to read {secret_name} from file: {e}");
        })
}

fn load_admin_pin() -> String {
    var("ADMIN_PIN")
        .or_else(|_| read_secret("ADMIN_PIN"))
        .map(|pin| pin.trim().to_string())
        .ok()
        .filter(|pin| !pin.is_empty())
        .unwrap_or_else(|| {
            warn!("No admin PIN configured, falling back to the default PIN");
            DEFAULT_ADMIN_PIN.to_string()
        })
}
