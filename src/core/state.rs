use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::sandbox::SandboxClient;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    sandbox: SandboxClient,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, sandbox: SandboxClient) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, sandbox }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn sandbox(&self) -> &SandboxClient {
        &self.inner.sandbox
    }
}
