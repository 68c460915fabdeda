use {
    super::{ClientData, Flags, extension, extension_bytes},
    crate::{
        Result,
        handle::{ClientHandle, EpHandle, TmHandle},
        malloc::{DebugHeap, HeapBytes, Site},
    },
    std::sync::{
        Arc, OnceLock,
        atomic::{AtomicU32, AtomicU64, Ordering::{AcqRel, Acquire, Release}},
    },
};

/// Root object of a communication domain.
pub struct Client
{
    pub (crate) handle: ClientHandle,
    name: HeapBytes,
    flags: Flags,

    /// Number of endpoint indices handed out.
    next_ep_index: AtomicU32,

    /// Raw endpoint handles by index, zero when vacant.
    eps: Box<[AtomicU64]>,

    tm0: OnceLock<TmHandle>,

    /// User data.
    pub cdata: ClientData,

    ext: Option<HeapBytes>,
}

impl Client
{
    pub (crate) fn new(
        heap: &Arc<DebugHeap>,
        handle: ClientHandle,
        name: &str,
        flags: Flags,
        max_eps: u32,
        ext_len: usize,
    ) -> Result<Self>
    {
        let name = HeapBytes::strdup(heap, name, Site::Named("client name"))?;
        let ext = extension(heap, ext_len, Site::Named("client extension"))?;
        let eps = (0 .. max_eps).map(|_| AtomicU64::new(0)).collect();
        Ok(Self{
            handle,
            name,
            flags,
            next_ep_index: AtomicU32::new(0),
            eps,
            tm0: OnceLock::new(),
            cdata: ClientData::default(),
            ext,
        })
    }

    /// The handle of the client.
    pub fn handle(&self) -> ClientHandle
    {
        self.handle
    }

    /// The name the client was created with.
    pub fn name(&self) -> String
    {
        self.name.as_c_str_lossy()
    }

    /// The flags the client was created with.
    pub fn flags(&self) -> Flags
    {
        self.flags
    }

    /// Capacity of the endpoint table.
    pub fn max_eps(&self) -> u32
    {
        self.eps.len() as u32
    }

    /// Number of endpoint indices handed out so far.
    pub fn ep_count(&self) -> u32
    {
        self.next_ep_index.load(Acquire).min(self.max_eps())
    }

    /// The endpoint with the given index, if it exists.
    pub fn ep(&self, index: u32) -> Option<EpHandle>
    {
        let raw = self.eps.get(index as usize)?.load(Acquire);
        (raw != 0).then(|| EpHandle::from_raw(raw))
    }

    /// The first team created for this client.
    pub fn tm0(&self) -> Option<TmHandle>
    {
        self.tm0.get().copied()
    }

    /// The zeroed extension region.
    pub fn ext(&self) -> &[u8]
    {
        extension_bytes(&self.ext)
    }

    /// Take the next endpoint index.
    ///
    /// Returns [`None`] when the endpoint table is full.
    pub (crate) fn reserve_ep_index(&self) -> Option<u32>
    {
        let index = self.next_ep_index.fetch_add(1, AcqRel);
        if index >= self.max_eps() {
            self.next_ep_index.fetch_sub(1, AcqRel);
            return None;
        }
        Some(index)
    }

    pub (crate) fn set_ep(&self, index: u32, handle: EpHandle)
    {
        if let Some(slot) = self.eps.get(index as usize) {
            slot.store(handle.into_raw(), Release);
        }
    }

    pub (crate) fn clear_ep(&self, index: u32)
    {
        if let Some(slot) = self.eps.get(index as usize) {
            slot.store(0, Release);
        }
    }

    /// Make `handle` the first team, unless there already is one.
    ///
    /// Returns whether `handle` became the first team.
    pub (crate) fn claim_tm0(&self, handle: TmHandle) -> bool
    {
        self.tm0.set(handle).is_ok()
    }
}
