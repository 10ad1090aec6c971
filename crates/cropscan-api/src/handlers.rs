//! Request handlers.

pub mod health;
pub mod models;
pub mod predict;

pub use health::*;
pub use models::*;
pub use predict::*;
