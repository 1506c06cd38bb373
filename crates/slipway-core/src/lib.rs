//! Slipway Core
//!
//! Domain types, errors, and port traits for Slipway, the build/test/release
//! pipeline that ships the gprofiler dual-architecture artifact.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod artifact;
pub mod error;
pub mod ids;
pub mod job;
pub mod ports;
pub mod release;
pub mod trigger;

pub use error::{Error, Result};
pub use ids::*;
