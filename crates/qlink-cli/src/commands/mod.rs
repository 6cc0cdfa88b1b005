//! CLI command implementations.

pub mod cancel;
pub mod common;
pub mod list;
pub mod profile;
pub mod script;
pub mod status;
pub mod submit;
pub mod wait;
