//! Utilities shared by the runtime crates.
//!
//! Nothing in here knows about clients, endpoints, or segments.

#![warn(missing_docs)]

pub mod env;
pub mod hash;
