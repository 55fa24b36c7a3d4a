//! Squad Core - Entity Types
//!
//! Pure data structures shared by every squad crate: identity aliases,
//! status enums, persisted records with edge validation, the error
//! taxonomy, and configuration. No I/O happens here.

mod config;
mod entities;
mod enums;
mod error;
mod identity;

pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
