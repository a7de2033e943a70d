//! # Contracts
//!
//! Frozen interface contracts, defining inter-crate data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Model
//! - Producers hand the writer plain byte slices
//! - Sinks receive every buffer they keep up with, in submission order

mod blueprint;
mod error;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use sink::*;
