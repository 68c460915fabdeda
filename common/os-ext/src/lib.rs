//! Host and process queries.
//!
//! Each function wraps the system call it is named after.
//! The differences from calling libc directly:
//!
//!  - Failures come back as [`io::Error`] instead of through `errno`.
//!  - [`gethostname`] sizes its own buffer.
//!  - [`nanosleep`] resumes after `EINTR` with the time that was left.

#![warn(missing_docs)]

pub use {
    self::{time::*, unistd::*},
    libc::pid_t,
};

use std::io;

mod time;
mod unistd;

/// Call `f` again for as long as it fails with `EINTR`.
fn retry_on_eintr<F, T>(mut f: F) -> io::Result<T>
    where F: FnMut() -> io::Result<T>
{
    loop {
        match f() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
            result => break result,
        }
    }
}
