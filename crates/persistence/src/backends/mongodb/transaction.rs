//! Transaction support for the MongoDB backend.

use mongodb::{ClientSession, Database};

/// A MongoDB multi-document transaction.
///
/// Operations must pass [`session_mut`](Self::session_mut) to every driver
/// call (`.session(...)`) for the write to take part in the transaction.
/// Dropping an uncommitted transaction lets the server abort it.
pub struct MongoTransaction {
    database: Database,
    session: ClientSession,
}

impl std::fmt::Debug for MongoTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoTransaction")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

impl MongoTransaction {
    pub(crate) fn new(database: Database, session: ClientSession) -> Self {
        Self { database, session }
    }

    /// The database the transaction writes to.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The session carrying the transaction.
    pub fn session_mut(&mut self) -> &mut ClientSession {
        &mut self.session
    }

    /// Splits the borrow so a collection and the session can be used together.
    pub fn parts(&mut self) -> (&Database, &mut ClientSession) {
        (&self.database, &mut self.session)
    }
}
