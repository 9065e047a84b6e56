//! Generation history persistence.

mod gateway;
mod sqlite;
mod store;

pub use gateway::PersistenceGateway;
pub use sqlite::SqliteRecordStore;
pub use store::{ImageRecord, NewImageRecord, RecordId, RecordStore};
