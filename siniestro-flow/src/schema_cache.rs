//! Form schema cache: the claim type catalogue, loaded from the backend with
//! a local static copy as fallback.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    backend::{BackendResult, ClaimsBackend, with_timeout},
    error::{BackendError, FlowError, Result},
    schema::{MenuEntry, SchemaCatalogue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Primary,
    Fallback,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct SchemaLoad {
    pub catalogue: Arc<SchemaCatalogue>,
    pub source: SchemaSource,
}

/// The static `FORM_CONFIG.json` shipped next to the page.
#[derive(Debug, Clone)]
pub struct FallbackDocument {
    path: PathBuf,
    timeout: Duration,
}

impl FallbackDocument {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub async fn load(&self) -> BackendResult<SchemaCatalogue> {
        let bytes = with_timeout(self.timeout, async {
            Ok(tokio::fs::read(&self.path).await?)
        })
        .await?;
        SchemaCatalogue::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Single-writer cache of the catalogue. Readers get a cheap snapshot; loads
/// are serialized so a reload never starts while another is running.
pub struct SchemaCache {
    backend: Arc<dyn ClaimsBackend>,
    fallback: FallbackDocument,
    retry_delay: Duration,
    current: RwLock<SchemaLoad>,
    loading: Mutex<()>,
}

impl SchemaCache {
    pub fn new(
        backend: Arc<dyn ClaimsBackend>,
        fallback: FallbackDocument,
        retry_delay: Duration,
    ) -> Self {
        Self {
            backend,
            fallback,
            retry_delay,
            current: RwLock::new(SchemaLoad {
                catalogue: Arc::new(SchemaCatalogue::default()),
                source: SchemaSource::Unavailable,
            }),
            loading: Mutex::new(()),
        }
    }

    /// Fetches the catalogue, replacing whatever was cached before.
    pub async fn load(&self) -> SchemaLoad {
        let _guard = self.loading.lock().await;

        let load = match self.backend.form_config().await {
            Ok(catalogue) => {
                info!(claim_types = catalogue.len(), "Form configuration loaded from backend");
                SchemaLoad {
                    catalogue: Arc::new(catalogue),
                    source: SchemaSource::Primary,
                }
            }
            Err(primary) => {
                warn!(error = %primary, "Backend form configuration failed, trying local copy");
                match self.fallback.load().await {
                    Ok(catalogue) => {
                        info!(
                            claim_types = catalogue.len(),
                            "Form configuration loaded from local fallback"
                        );
                        SchemaLoad {
                            catalogue: Arc::new(catalogue),
                            source: SchemaSource::Fallback,
                        }
                    }
                    Err(local) => {
                        error!(error = %local, "Form configuration unavailable");
                        SchemaLoad {
                            catalogue: Arc::new(SchemaCatalogue::default()),
                            source: SchemaSource::Unavailable,
                        }
                    }
                }
            }
        };

        self.store(load.clone());
        load
    }

    pub fn snapshot(&self) -> SchemaLoad {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, load: SchemaLoad) {
        match self.current.write() {
            Ok(mut current) => *current = load,
            Err(poisoned) => *poisoned.into_inner() = load,
        }
    }

    /// Catalogue for the type-selection step. An empty cache gets exactly one
    /// reload after the retry delay; still empty after that is terminal.
    pub async fn ready(&self) -> Result<Arc<SchemaCatalogue>> {
        let current = self.snapshot();
        if !current.catalogue.is_empty() {
            return Ok(current.catalogue);
        }

        warn!(delay = ?self.retry_delay, "Form configuration empty, retrying once");
        tokio::time::sleep(self.retry_delay).await;

        let reloaded = self.load().await;
        if reloaded.catalogue.is_empty() {
            return Err(FlowError::ConfigurationUnavailable);
        }
        Ok(reloaded.catalogue)
    }

    pub async fn menu(&self) -> Result<Vec<MenuEntry>> {
        Ok(self.ready().await?.menu())
    }
}
