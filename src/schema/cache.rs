//! Schema cache
//!
//! Holds the introspected model for the life of the process. The first
//! caller introspects under a single-writer guard; everyone else reuses the
//! stored model. `refresh` rebuilds it wholesale.

use crate::error::Result;
use crate::schema::{SchemaIntrospector, SchemaModel};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct SchemaCache {
    introspector: SchemaIntrospector,
    model: RwLock<Option<Arc<SchemaModel>>>,
    writer: Mutex<()>,
}

impl SchemaCache {
    pub fn new(introspector: SchemaIntrospector) -> Self {
        Self {
            introspector,
            model: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Return the cached model, introspecting on first use.
    ///
    /// A failed introspection leaves the cache empty, so the next call
    /// tries again.
    pub async fn get(&self) -> Result<Arc<SchemaModel>> {
        if let Some(model) = self.cached().await {
            return Ok(model);
        }

        let _guard = self.writer.lock().await;
        // Another caller may have finished while we waited for the guard.
        if let Some(model) = self.cached().await {
            return Ok(model);
        }

        let model = Arc::new(self.introspector.introspect().await?);
        *self.model.write().await = Some(Arc::clone(&model));
        info!("Schema cached ({} tables)", model.len());
        Ok(model)
    }

    /// Rebuild the model from the catalog and swap it in. On failure the
    /// previously cached model (if any) stays in place.
    pub async fn refresh(&self) -> Result<Arc<SchemaModel>> {
        let _guard = self.writer.lock().await;
        match self.introspector.introspect().await {
            Ok(model) => {
                let model = Arc::new(model);
                *self.model.write().await = Some(Arc::clone(&model));
                info!("Schema refreshed ({} tables)", model.len());
                Ok(model)
            }
            Err(e) => {
                warn!("Schema refresh failed, keeping previous model: {}", e);
                Err(e)
            }
        }
    }

    pub async fn cached(&self) -> Option<Arc<SchemaModel>> {
        self.model.read().await.clone()
    }
}
