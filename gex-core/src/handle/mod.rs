//! Opaque handles for runtime objects.
//!
//! Objects are never handed out directly.
//! Callers get a 64-bit handle that names a slot of a [`Registry`],
//! and every import checks that the slot still holds a live object
//! of the expected kind.
//!
//! Team handles may also carry a [`TmPair`],
//! a pair of endpoint indices that is not an object at all.
//! Pairs are told apart from real handles by their low bit.

pub use self::{pair::*, registry::*};

use {std::fmt, thiserror::Error};

mod pair;
mod registry;

/// Kind of object a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind
{
    /// See [`Client`][`crate::object::Client`].
    Client,

    /// See [`Segment`][`crate::object::Segment`].
    Segment,

    /// See [`Endpoint`][`crate::object::Endpoint`].
    Endpoint,

    /// See [`Team`][`crate::object::Team`].
    Team,
}

impl Kind
{
    /// Tag of a live object of this kind.
    pub fn magic(self) -> u64
    {
        u64::from_be_bytes(match self {
            Self::Client   => *b"GEX:CLI+",
            Self::Segment  => *b"GEX:SEG+",
            Self::Endpoint => *b"GEX:EP_+",
            Self::Team     => *b"GEX:TM_+",
        })
    }

    /// Tag of a destroyed object of this kind.
    pub fn freed_magic(self) -> u64
    {
        u64::from_be_bytes(match self {
            Self::Client   => *b"GEX:CLI-",
            Self::Segment  => *b"GEX:SEG-",
            Self::Endpoint => *b"GEX:EP_-",
            Self::Team     => *b"GEX:TM_-",
        })
    }
}

impl fmt::Display for Kind
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(match self {
            Self::Client   => "Client",
            Self::Segment  => "Segment",
            Self::Endpoint => "EP",
            Self::Team     => "TM",
        })
    }
}

/// Failure to import a handle.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandleError
{
    #[error("Invalid {kind} handle {raw:#x}")]
    Invalid{kind: Kind, raw: u64},

    #[error("{kind} handle {raw:#x} refers to a destroyed object (bad magic)")]
    Freed{kind: Kind, raw: u64},

    #[error("Handle {raw:#x} refers to a {found}, not a {expected} (bad magic)")]
    WrongKind{expected: Kind, found: Kind, raw: u64},

    #[error("Invalid use of a TM-Pair where such is prohibited")]
    TmPair,

    #[error("TM handle {raw:#x} is not a TM-Pair")]
    NotTmPair{raw: u64},
}

macro_rules! handle_type
{
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name
        {
            /// The handle that refers to nothing.
            pub const INVALID: Self = Self(0);

            /// Reinterpret an exported value.
            pub fn from_raw(raw: u64) -> Self
            {
                Self(raw)
            }

            /// The exported value.
            pub fn into_raw(self) -> u64
            {
                self.0
            }

            /// Whether this is [`INVALID`][`Self::INVALID`].
            pub fn is_invalid(self) -> bool
            {
                self.0 == 0
            }
        }
    };
}

handle_type!(
    /// Exported client.
    ClientHandle
);

handle_type!(
    /// Exported segment.
    SegmentHandle
);

handle_type!(
    /// Exported endpoint.
    EpHandle
);

handle_type!(
    /// Exported team, or a [`TmPair`].
    TmHandle
);
