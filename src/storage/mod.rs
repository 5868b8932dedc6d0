pub mod database;
pub mod models;
pub mod sqlite_store;
pub mod traits;

pub use sqlite_store::SqliteStore;
pub use traits::{Backend, BlobStore, BlobStoreRef, ChangeStream, DocumentStore, DocumentStoreRef};
