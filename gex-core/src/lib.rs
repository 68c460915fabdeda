//! Bootstrap and object model of the communication runtime.
//!
//! A process starts by calling [`Runtime::init`],
//! which picks a spawner, bootstraps the job,
//! and works out which processes share a host.
//! [`Runtime::client_init`] then creates the client
//! together with its primordial endpoint and the team of the job.
//! All objects are named by opaque [handles][`handle`].

#![warn(missing_docs)]

pub use self::{
    config::Config,
    error::{Error, ErrorClass, OrFatal, Result, fatal},
    runtime::{BoundsViolation, Runtime},
};

pub mod am;
pub mod conduit;
pub mod config;
pub mod handle;
pub mod malloc;
pub mod nodemap;
pub mod object;
pub mod segtbl;
pub mod spawner;

mod error;
mod runtime;
