//! Stevedore: auto-containerization for MCP servers
//!
//! Takes a target in any of four shapes (image reference, runnable command,
//! local project directory, git repository), figures out how to containerize
//! it, builds the image through a content-addressed cache, and runs it with
//! stdio attached so line-oriented protocol traffic flows straight through.

pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrate;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod profile;

pub use error::{StevedoreError, StevedoreResult};
