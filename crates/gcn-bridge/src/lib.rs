//! Library half of the bridge binary.

pub mod config;
pub mod host;
pub mod input;
pub mod tokens;
