pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{BackupRecord, BackupStore, EntityRecord, EntityStore, ReferenceResolver};
