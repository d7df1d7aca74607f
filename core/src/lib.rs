//! MPTD Core Library
//!
//! Core types, traits, and the wire format shared by the MPTD server and client.
//! Every other MPTD crate builds on the definitions here.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;
pub mod wire;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
