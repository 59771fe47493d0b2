//! Infrastructure layer - Storage backends and runtime plumbing

pub mod logging;
pub mod user;
