//! SQLite-backed persistence for ingested course content, the concept
//! tree and chunk-to-concept assignments.

pub mod error;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::CourseStore;
