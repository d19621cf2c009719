//! Shared helpers used across the build pipeline and dev server.

pub mod exec;
pub mod hash;
pub mod mime;
pub mod path;
