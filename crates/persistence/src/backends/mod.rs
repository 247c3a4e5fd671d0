//! Store backend implementations.
//!
//! Each backend is gated behind a feature flag.
//!
//! | Store | Backend | Feature |
//! |-------|---------|---------|
//! | Document | MongoDB | `mongodb` |
//! | Relational | SQLite | `sqlite` |
//!
//! With both features enabled, [`Coordinator`] is the concrete coordinator
//! type used by the server binary.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(all(feature = "sqlite", feature = "mongodb"))]
mod production {
    use crate::composite::{DualStoreCoordinator, PersistenceConfig};

    use super::mongodb::MongoStore;
    use super::sqlite::SqliteStore;

    /// Coordinator over a MongoDB document store and a SQLite relational store.
    pub type Coordinator = DualStoreCoordinator<MongoStore, SqliteStore>;

    /// Builds the coordinator from configuration.
    ///
    /// A store whose section is absent is left unconfigured and the
    /// coordinator runs without it.
    pub fn from_config(config: PersistenceConfig) -> Coordinator {
        let connect_timeout = config.coordinator.connect_timeout;
        let document = config.document.clone().map(|document| {
            MongoStore::new(document).with_server_selection_timeout(connect_timeout)
        });
        let relational = config.relational.clone().map(SqliteStore::new);

        DualStoreCoordinator::new(document, relational, config.coordinator)
    }
}

#[cfg(all(feature = "sqlite", feature = "mongodb"))]
pub use production::{Coordinator, from_config};
