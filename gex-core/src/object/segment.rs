use {
    super::{ClientData, Flags, extension, extension_bytes},
    crate::{
        Result,
        handle::{ClientHandle, SegmentHandle},
        malloc::{DebugHeap, HeapBytes, Site},
    },
    allocator_ext::{AligningAllocator, Region, System},
    std::{
        ops::Range,
        sync::{Arc, atomic::{AtomicUsize, Ordering::{Acquire, Release}}},
    },
};

/// Alignment of segment storage allocated by the runtime.
pub const PAGE_SIZE: usize = 4096;

/// Allocator for segment storage.
pub type PageAllocator = AligningAllocator<System, PAGE_SIZE>;

/// Where the memory of a segment lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum MemoryKind
{
    /// Ordinary host memory.
    Host,

    /// Memory of the device with the given ordinal.
    Device(u32),
}

/// Memory backing a segment.
pub enum Storage
{
    /// Memory owned by the caller, which must outlive the segment.
    Client{addr: usize, size: usize},

    /// Memory owned by the segment.
    Runtime(Region<PageAllocator>),
}

impl Storage
{
    /// Allocate zeroed, page-aligned storage.
    ///
    /// Returns [`None`] if the memory could not be allocated.
    pub fn allocate(size: usize) -> Option<Self>
    {
        Region::zeroed(AligningAllocator(System), size, PAGE_SIZE).map(Self::Runtime)
    }

    fn range(&self) -> Range<usize>
    {
        match self {
            Self::Client{addr, size} => *addr .. addr + size,
            Self::Runtime(region) => {
                let addr = region.as_ptr() as usize;
                addr .. addr + region.len()
            },
        }
    }
}

/// Registered memory region.
pub struct Segment
{
    pub (crate) handle: SegmentHandle,
    client: ClientHandle,
    range: Range<usize>,
    kind: MemoryKind,
    flags: Flags,
    table_index: AtomicUsize,
    storage: Storage,

    /// User data.
    pub cdata: ClientData,

    ext: Option<HeapBytes>,
}

impl Segment
{
    pub (crate) fn new(
        heap: &Arc<DebugHeap>,
        handle: SegmentHandle,
        client: ClientHandle,
        storage: Storage,
        kind: MemoryKind,
        flags: Flags,
        ext_len: usize,
    ) -> Result<Self>
    {
        let ext = extension(heap, ext_len, Site::Named("segment extension"))?;
        Ok(Self{
            handle,
            client,
            range: storage.range(),
            kind,
            flags,
            table_index: AtomicUsize::new(usize::MAX),
            storage,
            cdata: ClientData::default(),
            ext,
        })
    }

    /// The handle of the segment.
    pub fn handle(&self) -> SegmentHandle
    {
        self.handle
    }

    /// The client the segment belongs to.
    pub fn client(&self) -> ClientHandle
    {
        self.client
    }

    /// Base address.
    pub fn addr(&self) -> usize
    {
        self.range.start
    }

    /// Address just past the end.
    pub fn ub(&self) -> usize
    {
        self.range.end
    }

    /// Length in bytes.
    pub fn size(&self) -> usize
    {
        self.range.len()
    }

    /// The address range of the segment.
    pub fn range(&self) -> Range<usize>
    {
        self.range.clone()
    }

    /// Where the memory lives.
    pub fn kind(&self) -> MemoryKind
    {
        self.kind
    }

    /// Whether the memory lives on a device.
    pub fn is_device(&self) -> bool
    {
        matches!(self.kind, MemoryKind::Device(..))
    }

    /// Whether the caller supplied the memory.
    pub fn client_allocated(&self) -> bool
    {
        matches!(self.storage, Storage::Client{..})
    }

    /// The flags the segment was created with.
    pub fn flags(&self) -> Flags
    {
        self.flags
    }

    /// Whether `addr .. addr + len` lies within the segment.
    pub fn contains(&self, addr: usize, len: usize) -> bool
    {
        match addr.checked_add(len) {
            Some(end) => addr >= self.range.start && end <= self.range.end,
            None => false,
        }
    }

    /// The zeroed extension region.
    pub fn ext(&self) -> &[u8]
    {
        extension_bytes(&self.ext)
    }

    /// Position in the segment table.
    pub (crate) fn table_index(&self) -> usize
    {
        self.table_index.load(Acquire)
    }

    pub (crate) fn set_table_index(&self, index: usize)
    {
        self.table_index.store(index, Release)
    }
}
