//! MongoDB document store.
//!
//! Connecting parses the configured URI, applies the pool settings and pings
//! the server before the [`Database`](mongodb::Database) handle is handed out.
//! Transactions run inside a client session, which requires the server to be
//! a replica set or sharded cluster.

mod backend;
mod transaction;

pub use backend::MongoStore;
pub use transaction::MongoTransaction;
