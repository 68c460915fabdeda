//! Clients, segments, endpoints, and teams.
//!
//! Objects are created and destroyed by [`Runtime`][`crate::Runtime`],
//! which also registers them in its [`Registry`][`crate::handle::Registry`].
//! References between objects are by handle, never by pointer.

pub use self::{client::*, endpoint::*, segment::*, team::*};

use {
    crate::{Result, malloc::{DebugHeap, HeapBytes, Site}},
    bitflags::bitflags,
    std::sync::{Arc, atomic::{AtomicUsize, Ordering::{Acquire, Release}}},
};

mod client;
mod endpoint;
mod segment;
mod team;

bitflags!
{
    /// What an endpoint may be used for.
    pub struct Capabilities: u32
    {
        /// Remote memory access.
        const RMA  = 1 << 0;

        /// Active messages.
        const AM   = 1 << 1;

        /// Vector, indexed, and strided transfers.
        const VIS  = 1 << 2;

        /// Collectives.
        const COLL = 1 << 3;

        /// Remote atomics.
        const AD   = 1 << 4;

        /// Every capability. Required of the primordial endpoint.
        const ALL  = Self::RMA.bits | Self::AM.bits | Self::VIS.bits
                   | Self::COLL.bits | Self::AD.bits;
    }
}

bitflags!
{
    /// Creation flags of an object.
    #[derive(Default)]
    pub struct Flags: u32
    {
        #[allow(missing_docs)] const IMMEDIATE       = 1 << 0;
        #[allow(missing_docs)] const LEGACY          = 1 << 1;
        #[allow(missing_docs)] const RANK_IS_JOBRANK = 1 << 2;
    }
}

/// Word of user data attached to an object.
#[derive(Debug, Default)]
pub struct ClientData(AtomicUsize);

impl ClientData
{
    /// The stored word.
    pub fn get(&self) -> usize
    {
        self.0.load(Acquire)
    }

    /// Replace the stored word.
    pub fn set(&self, value: usize)
    {
        self.0.store(value, Release)
    }
}

/// Allocate the zeroed extension region of an object.
fn extension(heap: &Arc<DebugHeap>, len: usize, site: Site) -> Result<Option<HeapBytes>>
{
    HeapBytes::zeroed(heap, len, site)
}

/// View an optional extension region.
fn extension_bytes(ext: &Option<HeapBytes>) -> &[u8]
{
    ext.as_ref().map(HeapBytes::as_slice).unwrap_or(&[])
}
