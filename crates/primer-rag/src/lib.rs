//! Course content pipeline: paragraph chunking, batched embedding,
//! concept tree extraction, chunk tagging and scoped similarity retrieval.

pub mod chunker;
pub mod embedder;
pub mod error;
pub mod ingest;
pub mod outline;
pub mod planner;
pub mod questions;
pub mod retriever;
pub mod source;
pub mod tagger;

pub use error::{RagError, Result};
