//! ccgw Core Library
//!
//! Shared functionality for the ccgw gateway:
//! - NDJSON event records for Claude Code's stream-json output
//! - Path containment for project directories
//! - Configuration resolution and hierarchy
//! - OpenAI chat-completions wire types and model catalogue
//! - Common error types

pub mod config;
pub mod error;
pub mod models;
pub mod ndjson;
pub mod openai;
pub mod path_guard;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use ndjson::EventRecord;
