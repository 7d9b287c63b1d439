//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write tagged `send`
//! and `recv` operations for a given transport layer. Three are included:
//! a trivial serial one, an in-process one connecting threads, and a
//! pure-Rust TCP one. The collective operations (broadcast, reduce,
//! reduce-all) are built on top of these, in `crate::context::Context`.
//!

mod backoff;
pub mod comm;
pub mod local;
pub mod tcp;
pub mod util;

use serde::{de::DeserializeOwned, Serialize};
use crate::error::Error;

/// Serialize a message body with the crate's wire codec (MessagePack).
///
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    rmp_serde::to_vec(value).unwrap_or_else(|e| panic!("failed to encode message: {}", e))
}

/// Deserialize a message body written by `encode`.
///
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}
