//! Line-oriented TCP protocol: text commands and replies, plus
//! length-announced file payloads on the same stream.

pub mod client;
pub mod codec;
pub mod config;
pub mod server;
pub mod utils;
