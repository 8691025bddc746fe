use std::{sync::Arc, time::Duration};

use minijinja::Environment;
use tracing::debug;

use super::{
    catalog::{CatalogStore, PriceCatalog},
    config::Config,
    error::AppError,
    render::templates,
    session::SessionState,
    store::{MemorySessionStore, SessionStore},
};

pub struct AppState {
    pub config: Config,
    pub catalog: CatalogStore,
    pub sessions: Box<dyn SessionStore>,
    pub templates: Environment<'static>,
}

impl AppState {
    pub fn new(config: Config, catalog: PriceCatalog) -> Result<Arc<Self>, AppError> {
        let ttl = Duration::from_secs(config.session_ttl_secs);

        Self::with_store(config, catalog, Box::new(MemorySessionStore::with_ttl(ttl)))
    }

    pub fn with_store(
        config: Config,
        catalog: PriceCatalog,
        sessions: Box<dyn SessionStore>,
    ) -> Result<Arc<Self>, AppError> {
        Ok(Arc::new(Self {
            config,
            catalog: CatalogStore::new(catalog),
            sessions,
            templates: templates()?,
        }))
    }

    /// Current catalog snapshot plus the device session reconciled against it.
    pub async fn load_session(&self, device: &str) -> (Arc<PriceCatalog>, SessionState) {
        let catalog = self.catalog.snapshot().await;
        let document = self.sessions.get(device).await;

        let session = SessionState::load(document.as_ref(), &catalog);

        (catalog, session)
    }

    pub async fn save_session(&self, device: &str, session: &SessionState) {
        debug!("Saving session for {device}");

        self.sessions.set(device, session.to_document()).await;
    }
}
