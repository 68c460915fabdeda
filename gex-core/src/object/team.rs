use {
    super::{ClientData, Flags, extension, extension_bytes},
    crate::{
        Result,
        handle::{EpHandle, TmHandle},
        malloc::{DebugHeap, HeapBytes, Site},
    },
    std::sync::Arc,
};

/// Scope of collective operations over an endpoint.
pub struct Team
{
    pub (crate) handle: TmHandle,
    ep: EpHandle,
    rank: u32,
    size: u32,
    flags: Flags,

    /// User data.
    pub cdata: ClientData,

    ext: Option<HeapBytes>,
}

impl Team
{
    pub (crate) fn new(
        heap: &Arc<DebugHeap>,
        handle: TmHandle,
        ep: EpHandle,
        rank: u32,
        size: u32,
        flags: Flags,
        ext_len: usize,
    ) -> Result<Self>
    {
        let ext = extension(heap, ext_len, Site::Named("team extension"))?;
        Ok(Self{handle, ep, rank, size, flags, cdata: ClientData::default(), ext})
    }

    /// The handle of the team.
    pub fn handle(&self) -> TmHandle
    {
        self.handle
    }

    /// The endpoint of this process in the team.
    pub fn ep(&self) -> EpHandle
    {
        self.ep
    }

    /// Rank of this process in the team.
    pub fn rank(&self) -> u32
    {
        self.rank
    }

    /// Number of members.
    pub fn size(&self) -> u32
    {
        self.size
    }

    /// The flags the team was created with.
    pub fn flags(&self) -> Flags
    {
        self.flags
    }

    /// The zeroed extension region.
    pub fn ext(&self) -> &[u8]
    {
        extension_bytes(&self.ext)
    }
}
