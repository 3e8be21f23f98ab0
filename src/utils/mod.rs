// src/utils/mod.rs
pub mod error;

pub use error::ProtocolError;
