//! LLM provider abstraction and the Gemini backend.

pub mod error;
pub mod gemini;
#[cfg(feature = "mock")]
pub mod mock;
pub mod payload;
pub mod provider;

pub use error::LlmError;
pub use gemini::GeminiProvider;
pub use provider::{LlmProvider, Message, Role};
