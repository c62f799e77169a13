//! ccgw Daemon Library
//!
//! Core functionality for the ccgw daemon:
//! - Claude Code subprocess sessions and their registry
//! - Translation of Claude stream-json output into OpenAI chat completions
//! - OpenAI-compatible HTTP server
//! - Per-project working directories

pub mod projects;
pub mod server;
pub mod session;
pub mod translate;
