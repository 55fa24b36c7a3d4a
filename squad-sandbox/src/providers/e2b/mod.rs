//! Hosted sandbox service provider

mod client;
mod types;

pub use client::{E2bConfig, E2bProvider};
