//! Run-scoped artifact store for Slipway.
//!
//! Jobs publish named outputs; later jobs fetch them by name. Fetch blocks
//! until the name exists, the producing job is recorded as having terminated
//! without publishing, or the run is aborted.

pub mod store;

pub use store::{ArtifactStore, StoreConfig};
