//! Common types and utilities shared across coinwatch components

pub mod config;
pub mod error;
pub mod fallback;
pub mod series;
pub mod types;

pub use error::*;
pub use types::*;
