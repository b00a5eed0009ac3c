//! Developer tooling shared across modules.
pub mod devlog;
