//! MongoDB backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{debug, info, warn};

use crate::composite::DocumentStoreConfig;
use crate::core::{StoreBackend, StoreKind};
use crate::error::{BackendError, BackendResult};

use super::MongoTransaction;

const BACKEND_NAME: &str = "mongodb";

/// Document store backed by a MongoDB deployment.
#[derive(Debug, Clone)]
pub struct MongoStore {
    config: DocumentStoreConfig,
    server_selection_timeout: Duration,
}

impl MongoStore {
    /// Creates a store for the given configuration. Nothing is opened yet.
    pub fn new(config: DocumentStoreConfig) -> Self {
        Self {
            config,
            server_selection_timeout: Duration::from_secs(5),
        }
    }

    /// Bounds how long the driver waits for a usable server.
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &DocumentStoreConfig {
        &self.config
    }

    async fn client_options(&self) -> BackendResult<ClientOptions> {
        // mongodb+srv URIs resolve DNS while parsing; a lookup failure is an outage.
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| {
                if matches!(*e.kind, ErrorKind::DnsResolve { .. }) {
                    BackendError::from(e)
                } else {
                    BackendError::InvalidConfiguration {
                        backend_name: BACKEND_NAME.to_string(),
                        message: format!("invalid connection URI: {}", e),
                    }
                }
            })?;

        options.app_name = Some(self.config.app_name.clone());
        options.max_pool_size = Some(self.config.max_pool_size);
        options.min_pool_size = Some(self.config.min_pool_size);
        options.server_selection_timeout = Some(self.server_selection_timeout);
        options.connect_timeout = Some(self.server_selection_timeout);

        Ok(options)
    }
}

async fn run_ping(database: &Database) -> BackendResult<()> {
    database.run_command(doc! { "ping": 1 }).await?;
    Ok(())
}

#[async_trait]
impl StoreBackend for MongoStore {
    type Handle = Database;
    type Transaction = MongoTransaction;

    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn connect(&self) -> BackendResult<Self::Handle> {
        let options = self.client_options().await?;
        let client = Client::with_options(options)?;
        let database = client.database(&self.config.database);

        // The driver connects lazily; ping so a bad server fails here.
        if let Err(e) = run_ping(&database).await {
            client.shutdown().immediate(true).await;
            return Err(e);
        }

        info!(database = %self.config.database, "Connected to MongoDB");
        Ok(database)
    }

    async fn ping(&self, handle: &Self::Handle) -> BackendResult<()> {
        run_ping(handle).await
    }

    async fn begin(&self, handle: &Self::Handle) -> BackendResult<Self::Transaction> {
        let mut session = handle.client().start_session().await?;
        session.start_transaction().await?;
        Ok(MongoTransaction::new(handle.clone(), session))
    }

    async fn commit(&self, mut tx: Self::Transaction) -> BackendResult<()> {
        tx.session_mut().commit_transaction().await?;
        Ok(())
    }

    async fn rollback(&self, mut tx: Self::Transaction) -> BackendResult<()> {
        if let Err(e) = tx.session_mut().abort_transaction().await {
            warn!(error = %e, "Abort of MongoDB transaction failed");
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self, handle: Self::Handle) {
        handle.client().clone().shutdown().immediate(true).await;
        debug!(database = %self.config.database, "Closed MongoDB client");
    }
}
