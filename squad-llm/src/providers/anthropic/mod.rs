//! Anthropic (Claude) provider implementation

pub mod client;
pub mod runner;
pub mod types;

pub use client::AnthropicClient;
pub use runner::AnthropicRunner;
