use {
    super::{Capabilities, ClientData, Flags, extension, extension_bytes},
    crate::{
        Result,
        am::AmTable,
        handle::{ClientHandle, EpHandle, SegmentHandle},
        malloc::{DebugHeap, HeapBytes, Site},
    },
    std::sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering::{AcqRel, Acquire}},
    },
};

/// Communication target with a set of capabilities.
///
/// Endpoint 0 of a client is the primordial endpoint,
/// which always has every capability.
pub struct Endpoint
{
    pub (crate) handle: EpHandle,
    client: ClientHandle,
    index: u32,
    orig_caps: Capabilities,
    caps: AtomicU32,
    flags: Flags,
    segment: Mutex<Option<SegmentHandle>>,
    am: AmTable,

    /// User data.
    pub cdata: ClientData,

    ext: Option<HeapBytes>,
}

impl Endpoint
{
    pub (crate) fn new(
        heap: &Arc<DebugHeap>,
        handle: EpHandle,
        client: ClientHandle,
        index: u32,
        caps: Capabilities,
        flags: Flags,
        ext_len: usize,
    ) -> Result<Self>
    {
        let ext = extension(heap, ext_len, Site::Named("endpoint extension"))?;
        Ok(Self{
            handle,
            client,
            index,
            orig_caps: caps,
            caps: AtomicU32::new(caps.bits()),
            flags,
            segment: Mutex::new(None),
            am: AmTable::default(),
            cdata: ClientData::default(),
            ext,
        })
    }

    /// The handle of the endpoint.
    pub fn handle(&self) -> EpHandle
    {
        self.handle
    }

    /// The client the endpoint belongs to.
    pub fn client(&self) -> ClientHandle
    {
        self.client
    }

    /// Index of the endpoint within its client.
    pub fn index(&self) -> u32
    {
        self.index
    }

    /// Whether this is the first endpoint of its client.
    pub fn is_primordial(&self) -> bool
    {
        self.index == 0
    }

    /// Capabilities the endpoint was created with.
    pub fn orig_caps(&self) -> Capabilities
    {
        self.orig_caps
    }

    /// Capabilities the endpoint has now.
    pub fn caps(&self) -> Capabilities
    {
        Capabilities::from_bits_truncate(self.caps.load(Acquire))
    }

    /// Take capabilities away from the endpoint.
    ///
    /// Returns the capabilities the endpoint had before.
    pub fn revoke(&self, caps: Capabilities) -> Capabilities
    {
        let old = self.caps.fetch_and(!caps.bits(), AcqRel);
        Capabilities::from_bits_truncate(old)
    }

    /// The flags the endpoint was created with.
    pub fn flags(&self) -> Flags
    {
        self.flags
    }

    /// The segment bound to the endpoint.
    pub fn segment(&self) -> Option<SegmentHandle>
    {
        *self.segment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The handler table of the endpoint.
    pub fn am(&self) -> &AmTable
    {
        &self.am
    }

    /// The zeroed extension region.
    pub fn ext(&self) -> &[u8]
    {
        extension_bytes(&self.ext)
    }

    /// Bind a segment, returning the segment bound before.
    pub (crate) fn bind_segment(&self, segment: Option<SegmentHandle>)
        -> Option<SegmentHandle>
    {
        let mut bound = self.segment.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *bound, segment)
    }
}
