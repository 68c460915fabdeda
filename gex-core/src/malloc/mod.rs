//! Debugging allocator.
//!
//! Every block handed out by [`DebugHeap`] is laid out as follows:
//!
//! ```text
//! | size | BEGINPOST | payload ... | ENDPOST |
//!                    ^ returned pointer
//! ```
//!
//! The size and the two guard words live next to the payload,
//! so that writes just outside the payload are noticed.
//! Everything else about a block (its allocation site and its
//! place in the ring of live blocks) lives in a side table.
//! Pointers that the side table does not know are never dereferenced.
//!
//! The ring is checked a little on every allocation and free
//! (see [`DebugHeap::check_one`]), and completely on request
//! (see [`DebugHeap::check_all`]).

pub use self::{
    bytes::*,
    corruption::*,
    report::*,
    settings::*,
};

use {
    self::ring::Ring,
    crate::{Error, Result},
    allocator_ext::{AligningAllocator, RawAllocator, System},
    gex_util::env::Env,
    std::{
        alloc::Layout,
        cell::Cell,
        ops::{Deref, DerefMut, Range},
        ptr::{self, NonNull},
        slice,
        sync::{
            Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError,
            atomic::{AtomicBool, Ordering::{Acquire, Release}},
        },
    },
};

mod bytes;
mod corruption;
mod report;
mod ring;
mod settings;

/// Leading guard of a live block.
pub const BEGINPOST: u64 = 0xDEAD_BABE_DEAD_BABE;

/// Leading guard of a block that is never expected to be freed.
pub const LEAKMARK: u64 = 0xBABE_DEAD_CAFE_BEEF;

/// Trailing guard of every block.
pub const ENDPOST: u64 = 0xCAFE_DEED_CAFE_DEED;

/// Leading guard of a freed block.
pub const FREEMARK: u64 = 0xBEEF_EFAD_BEEF_EFAD;

const HEADER_SIZE: usize = 16;
const TAIL_SIZE: usize = 8;

/// Bytes added to every allocation.
pub const EXTRA_SIZE: usize = HEADER_SIZE + TAIL_SIZE;

/// Alignment of every payload.
pub const PAYLOAD_ALIGN: usize = 16;

type BlockAllocator = AligningAllocator<System, PAYLOAD_ALIGN>;

thread_local! {
    /// Set while this thread holds the lock of some heap.
    static IN_HEAP: Cell<bool> = Cell::new(false);
}

#[derive(Default)]
struct HeapState
{
    ring: Ring,
    allocated_bytes: u64,
    freed_bytes: u64,
    allocated_objects: u64,
    freed_objects: u64,
    ring_objects: u64,
    ring_bytes: u64,
    max_object_size: usize,
    max_object_loc: usize,
    max_live_bytes: u64,
    max_live_objects: u64,
}

impl HeapState
{
    fn live_bytes(&self) -> u64
    {
        self.allocated_bytes - self.freed_bytes
    }

    fn live_objects(&self) -> u64
    {
        self.allocated_objects - self.freed_objects
    }
}

/// Exclusive access to the heap state from this thread.
struct Entered<'a>
{
    state: MutexGuard<'a, HeapState>,
}

impl<'a> Deref for Entered<'a>
{
    type Target = HeapState;

    fn deref(&self) -> &HeapState
    {
        &self.state
    }
}

impl<'a> DerefMut for Entered<'a>
{
    fn deref_mut(&mut self) -> &mut HeapState
    {
        &mut self.state
    }
}

impl<'a> Drop for Entered<'a>
{
    fn drop(&mut self)
    {
        IN_HEAP.with(|flag| flag.set(false));
    }
}

/// Position of this process in the job, for messages and reports.
#[derive(Clone, Copy, Debug)]
struct Identity
{
    rank: u32,
    size: u32,
}

/// Allocator that detects heap corruption.
pub struct DebugHeap
{
    allocator: BlockAllocator,

    env: Option<Arc<dyn Env>>,
    env_read: AtomicBool,
    env_lock: Mutex<()>,
    settings: RwLock<Settings>,

    state: Mutex<HeapState>,

    segment: RwLock<Option<Range<usize>>>,
    identity: RwLock<Identity>,
}

impl DebugHeap
{
    /// Create a heap that reads its settings from `env` on first use.
    pub fn new(env: Arc<dyn Env>) -> Arc<Self>
    {
        Arc::new(Self::with_parts(Some(env), Settings::default(), false))
    }

    /// Create a heap with fixed settings.
    pub fn with_settings(mut settings: Settings) -> Arc<Self>
    {
        let warnings = settings.resolve_dependencies();
        let heap = Self::with_parts(None, settings, true);
        heap.warn(&warnings);
        Arc::new(heap)
    }

    fn with_parts(env: Option<Arc<dyn Env>>, settings: Settings, env_read: bool)
        -> Self
    {
        Self{
            allocator: AligningAllocator(System),
            env,
            env_read: AtomicBool::new(env_read),
            env_lock: Mutex::new(()),
            settings: RwLock::new(settings),
            state: Mutex::new(HeapState::default()),
            segment: RwLock::new(None),
            identity: RwLock::new(Identity{rank: 0, size: 1}),
        }
    }

    /// The settings currently in effect.
    pub fn settings(&self) -> Settings
    {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the position of this process in the job.
    pub fn set_identity(&self, rank: u32, size: u32)
    {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) =
            Identity{rank, size};
    }

    /// Record the address range of the attached segment.
    ///
    /// Bad pointers into this range get a more specific diagnosis.
    pub fn set_segment(&self, range: Option<Range<usize>>)
    {
        *self.segment.write().unwrap_or_else(PoisonError::into_inner) = range;
    }

    /* -------------------------------------------------------------------- */
    /*                               Settings                               */
    /* -------------------------------------------------------------------- */

    /// Read the settings from the environment, once.
    ///
    /// The flag is raised before the lookup,
    /// so allocations made by the lookup itself use the defaults.
    fn init_from_env(&self) -> Result<()>
    {
        if self.env_read.load(Acquire) {
            return Ok(());
        }

        let _lock = self.env_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.env_read.load(Acquire) {
            return Ok(());
        }
        self.env_read.store(true, Release);

        let Some(env) = &self.env
            else { return Ok(()) };
        let mut settings = Settings::from_env(env.as_ref())?;
        let warnings = settings.resolve_dependencies();
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        self.warn(&warnings);
        Ok(())
    }

    fn warn(&self, warnings: &[&'static str])
    {
        let rank = self.identity.read().unwrap_or_else(PoisonError::into_inner).rank;
        if rank != 0 || self.settings().quiet {
            return;
        }
        for warning in warnings {
            tracing::warn!("{}", warning);
        }
    }

    /* -------------------------------------------------------------------- */
    /*                                Locking                               */
    /* -------------------------------------------------------------------- */

    /// Lock the heap state.
    ///
    /// Fails if this thread already holds the lock of a heap.
    fn enter(&self) -> Result<Entered>
    {
        if IN_HEAP.with(Cell::get) {
            return Err(Error::usage("the debug heap", "from within the debug heap"));
        }
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        IN_HEAP.with(|flag| flag.set(true));
        Ok(Entered{state})
    }

    /// Lock the heap state if nobody holds it.
    ///
    /// Returns [`None`] when the lock is held,
    /// including by this very thread.
    fn try_enter(&self) -> Option<Entered>
    {
        if IN_HEAP.with(Cell::get) {
            return None;
        }
        let state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        IN_HEAP.with(|flag| flag.set(true));
        Some(Entered{state})
    }

    /* -------------------------------------------------------------------- */
    /*                              Allocation                              */
    /* -------------------------------------------------------------------- */

    /// Allocate `size` bytes.
    ///
    /// Returns [`None`] for a zero-byte request.
    /// Running out of memory is an error.
    pub fn malloc(&self, size: usize, site: Site) -> Result<Option<NonNull<u8>>>
    {
        self.malloc_inner(false, size, site)
    }

    /// Allocate `size` bytes, returning [`None`] on failure.
    pub fn try_malloc(&self, size: usize, site: Site) -> Result<Option<NonNull<u8>>>
    {
        self.malloc_inner(true, size, site)
    }

    fn malloc_inner(&self, allow_fail: bool, size: usize, site: Site)
        -> Result<Option<NonNull<u8>>>
    {
        self.init_from_env()?;
        self.check_one(site)?;

        if size == 0 {
            return Ok(None);
        }

        let block = block_layout(size).and_then(|layout| self.allocator.allocate(layout));
        let Some(block) = block else {
            if allow_fail {
                tracing::trace!(size, %site, "returning nothing for a failed debug malloc");
                return Ok(None);
            }
            let state = self.enter()?;
            return Err(Error::Resource(format!(
                "Debug malloc({}) failed ({} bytes in use, in {} objects)\n   at: {}",
                size, state.live_bytes(), state.live_objects(), site,
            )));
        };

        // SAFETY: The block holds the header, the payload, and the trailer.
        let payload = unsafe {
            let base = block.as_ptr();
            base.cast::<u64>().write(size as u64);
            base.add(8).cast::<u64>().write(BEGINPOST);
            let payload = base.add(HEADER_SIZE);
            payload.add(size).cast::<u64>().write_unaligned(ENDPOST);
            NonNull::new_unchecked(payload)
        };
        let addr = payload.as_ptr() as usize;

        {
            let mut state = self.enter()?;
            state.allocated_bytes += size as u64;
            state.allocated_objects += 1;
            state.ring_objects += 1;
            state.ring_bytes += size as u64;
            state.max_object_size = state.max_object_size.max(size);
            state.max_object_loc = state.max_object_loc.max(addr + size);
            state.max_live_bytes = state.max_live_bytes.max(state.live_bytes());
            state.max_live_objects = state.max_live_objects.max(state.live_objects());
            state.ring.insert(addr, size, site);
        }

        let settings = self.settings();
        if settings.init {
            // SAFETY: The payload is owned by this heap and size bytes long.
            let bytes = unsafe { slice::from_raw_parts_mut(payload.as_ptr(), size) };
            fill_pattern(bytes, settings.init_value);
        }

        self.check(Some(payload), CheckType::Live, site)?;
        Ok(Some(payload))
    }

    /// Allocate zeroed memory for `count` elements of `size` bytes each.
    pub fn calloc(&self, count: usize, size: usize, site: Site)
        -> Result<Option<NonNull<u8>>>
    {
        let Some(nbytes) = count.checked_mul(size) else {
            return Err(Error::Resource(format!(
                "Debug calloc({}, {}) overflows\n   at: {}", count, size, site,
            )));
        };
        let Some(ptr) = self.malloc(nbytes, site)?
            else { return Ok(None) };
        // SAFETY: The payload is nbytes long.
        unsafe { ptr.as_ptr().write_bytes(0, nbytes); }
        self.check(Some(ptr), CheckType::Live, site)?;
        Ok(Some(ptr))
    }

    /// Move the contents of `ptr` into a new block of `size` bytes.
    ///
    /// The old block is freed, even when `size` is zero.
    pub fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize, site: Site)
        -> Result<Option<NonNull<u8>>>
    {
        let new = self.malloc(size, site)?;
        if let Some(old) = ptr {
            let nbytes = self.check(Some(old), CheckType::Live, site)?;
            if let Some(new) = new {
                // SAFETY: Both blocks are live and at least this long.
                unsafe {
                    ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), nbytes.min(size));
                }
            }
            self.free(Some(old), site)?;
        }
        if new.is_some() {
            self.check(new, CheckType::Live, site)?;
        }
        Ok(new)
    }

    /// Free a block.
    ///
    /// Freeing [`None`] does nothing.
    /// Freeing anything that is not a live block of this heap
    /// is reported as corruption; nothing is written in that case.
    pub fn free(&self, ptr: Option<NonNull<u8>>, site: Site) -> Result<()>
    {
        self.init_from_env()?;
        self.check_one(site)?;

        let Some(ptr) = ptr
            else { return Ok(()) };
        let addr = ptr.as_ptr() as usize;
        let settings = self.settings();

        let mut state = self.enter()?;
        let size = self.check_locked(&state, &settings, addr, CheckType::Freeing, site)?;

        // SAFETY: The check found a live block of this size at addr.
        unsafe {
            if settings.clobber {
                let bytes = slice::from_raw_parts_mut(ptr.as_ptr(), size);
                fill_pattern(bytes, settings.clobber_value);
            }
            header(addr).add(1).write(FREEMARK);
        }

        state.freed_bytes += size as u64;
        state.freed_objects += 1;
        if !settings.scan_freed {
            state.ring_objects -= 1;
            state.ring_bytes -= size as u64;
            if let Some(index) = state.ring.find(addr) {
                state.ring.remove(index);
            }
        }
        drop(state);

        if !settings.leak_all {
            if let Some(layout) = block_layout(size) {
                // SAFETY: The block was allocated with this layout
                //         and is no longer reachable from the ring.
                unsafe {
                    let base = NonNull::new_unchecked(header(addr).cast::<u8>());
                    self.allocator.deallocate(base, layout);
                }
            }
        }

        Ok(())
    }

    /// Mark a live block as intentionally never freed.
    pub fn leak(&self, ptr: Option<NonNull<u8>>, site: Site) -> Result<()>
    {
        let Some(ptr) = ptr
            else { return Ok(()) };
        self.check(Some(ptr), CheckType::Live, site)?;

        let addr = ptr.as_ptr() as usize;
        let state = self.enter()?;
        if state.ring.find(addr).is_some() {
            // SAFETY: The block is live.
            unsafe { header(addr).add(1).write(LEAKMARK); }
        }
        Ok(())
    }

    /* -------------------------------------------------------------------- */
    /*                               Checking                               */
    /* -------------------------------------------------------------------- */

    /// Verify the integrity of one block, returning its size.
    ///
    /// If this thread already holds the heap lock,
    /// the check is skipped and zero is returned.
    pub fn check(&self, ptr: Option<NonNull<u8>>, check: CheckType, site: Site)
        -> Result<usize>
    {
        let addr = ptr.map_or(0, |ptr| ptr.as_ptr() as usize);
        if IN_HEAP.with(Cell::get) {
            return Ok(0);
        }
        let settings = self.settings();
        let state = self.enter()?;
        let size = self.check_locked(&state, &settings, addr, check, site)?;
        Ok(size)
    }

    /// Check the block at the scan cursor and advance the cursor.
    ///
    /// With `MALLOC_EXTRACHECK`, check the whole ring instead.
    /// Skipped if the heap lock is held.
    pub fn check_one(&self, site: Site) -> Result<()>
    {
        let settings = self.settings();
        if settings.extra_check {
            return self.check_all(site);
        }

        let Some(mut state) = self.try_enter()
            else { return Ok(()) };

        let Some(cursor) = state.ring.cursor() else {
            if state.ring_objects != 0 || state.ring_bytes != 0 {
                return Err(Error::RingLinkage{at: site.to_string()});
            }
            return Ok(());
        };

        let Some(desc) = state.ring.get(cursor)
            else { return Err(Error::RingLinkage{at: site.to_string()}) };
        let (addr, next) = (desc.addr, desc.next);
        self.check_locked(&state, &settings, addr, CheckType::Ring, site)?;
        state.ring.set_cursor(next);
        Ok(())
    }

    /// Check every block in the ring and the ring itself.
    ///
    /// Skipped if the heap lock is held.
    pub fn check_all(&self, site: Site) -> Result<()>
    {
        let settings = self.settings();
        let Some(mut state) = self.try_enter()
            else { return Ok(()) };
        let linkage = || Error::RingLinkage{at: site.to_string()};

        let Some(begin) = state.ring.cursor() else {
            if state.ring_objects != 0 || state.ring_bytes != 0 {
                return Err(linkage());
            }
            return Ok(());
        };

        let mut pos = begin;
        let mut count = 0;
        let mut sum = 0;
        while count < state.ring_objects {
            let Some(desc) = state.ring.get(pos)
                else { return Err(linkage()) };
            let (addr, next) = (desc.addr, desc.next);
            sum += self.check_locked(&state, &settings, addr, CheckType::Ring, site)? as u64;
            pos = next;
            state.ring.set_cursor(pos);
            if pos == begin {
                break;
            }
            count += 1;
        }

        if count + 1 != state.ring_objects || pos != begin || sum != state.ring_bytes {
            return Err(linkage());
        }

        Ok(())
    }

    fn check_locked(
        &self,
        state:    &HeapState,
        settings: &Settings,
        addr:     usize,
        check:    CheckType,
        site:     Site,
    ) -> std::result::Result<usize, HeapCorruption>
    {
        let mut nbytes = 0;
        let mut allocated_at = None;
        let mut begin = 0;
        let mut end = 0;
        let mut in_ring = false;

        if addr != 0 && addr % PAYLOAD_ALIGN == 0 {
            if let Some(desc) = state.ring.find(addr).and_then(|i| state.ring.get(i)) {
                in_ring = true;

                // SAFETY: The ring only holds blocks that are still allocated.
                let (stored_size, stored_begin) = unsafe {
                    (header(addr).read(), header(addr).add(1).read())
                };
                begin = if stored_begin == LEAKMARK { BEGINPOST } else { stored_begin };

                let plausible =
                    stored_size == desc.size as u64 &&
                    desc.size != 0 &&
                    desc.size <= state.max_object_size &&
                    addr + desc.size <= state.max_object_loc &&
                    state.ring.is_linked(desc.prev) &&
                    state.ring.is_linked(desc.next);

                if plausible {
                    nbytes = desc.size;
                    allocated_at = Some(desc.site);
                    // SAFETY: The trailer follows the payload.
                    end = unsafe {
                        (addr as *const u8).add(nbytes).cast::<u64>().read_unaligned()
                    };
                }
            } else if let Some(retired) = state.ring.retired(addr) {
                begin = FREEMARK;
                nbytes = retired.size;
                allocated_at = Some(retired.site);
            }
        }

        let mut kind = None;
        let mut scan = false;

        if begin == FREEMARK {
            match check {
                CheckType::Live    => kind = Some(CorruptionKind::CheckedFreedMemory),
                CheckType::Freeing => kind = Some(CorruptionKind::DuplicateFree),
                CheckType::Ring if !settings.scan_freed =>
                    kind = Some(CorruptionKind::FreedObjectInRing),
                CheckType::Ring => scan = in_ring,
            }
        }

        if begin != FREEMARK && (begin != BEGINPOST || end != ENDPOST) {
            let diagnosis =
                if self.in_segment(addr) {
                    CorruptionKind::SegmentPointer
                } else if nbytes != 0 && begin == BEGINPOST && end != ENDPOST {
                    CorruptionKind::Overflow
                } else if nbytes != 0 && begin != BEGINPOST && end == ENDPOST {
                    CorruptionKind::Underflow
                } else {
                    CorruptionKind::BadPointer
                };
            kind = Some(diagnosis);
        }

        if kind.is_none() && scan {
            // SAFETY: Freed blocks stay allocated while they are in the ring.
            let bytes = unsafe { slice::from_raw_parts(addr as *const u8, nbytes) };
            if let Some(offset) = find_pattern_mismatch(bytes, settings.clobber_value) {
                kind = Some(CorruptionKind::WriteAfterFree{offset});
            }
        }

        match kind {
            None => Ok(nbytes),
            Some(kind) => Err(HeapCorruption{
                kind, check, addr,
                size: nbytes,
                allocated_at,
                detected_at: site,
            }),
        }
    }

    fn in_segment(&self, addr: usize) -> bool
    {
        self.segment.read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |range| range.contains(&addr))
    }
}

/// Layout of the block holding a payload of `size` bytes.
fn block_layout(size: usize) -> Option<Layout>
{
    let len = size.checked_add(EXTRA_SIZE)?;
    Layout::from_size_align(len, 1).ok()
}

/// Header words of the block whose payload is at `addr`.
fn header(addr: usize) -> *mut u64
{
    (addr - HEADER_SIZE) as *mut u64
}

/// Fill `bytes` with repetitions of the 8 bytes of `value`.
pub fn fill_pattern(bytes: &mut [u8], value: u64)
{
    let pattern = value.to_ne_bytes();
    let mut chunks = bytes.chunks_exact_mut(8);
    for chunk in &mut chunks {
        chunk.copy_from_slice(&pattern);
    }
    let rest = chunks.into_remainder();
    let len = rest.len();
    rest.copy_from_slice(&pattern[.. len]);
}

/// Offset of the first byte of `bytes` that deviates from
/// repetitions of the 8 bytes of `value`.
pub fn find_pattern_mismatch(bytes: &[u8], value: u64) -> Option<usize>
{
    let pattern = value.to_ne_bytes();
    bytes.iter()
        .zip(pattern.iter().cycle())
        .position(|(byte, expected)| byte != expected)
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        gex_util::env::MapEnv,
        proptest::proptest,
        std::{sync::mpsc, thread},
    };

    fn heap() -> Arc<DebugHeap>
    {
        DebugHeap::with_settings(Settings::default())
    }

    fn alloc(heap: &DebugHeap, size: usize) -> NonNull<u8>
    {
        heap.malloc(size, Site::here()).unwrap().unwrap()
    }

    fn corruption(result: Result<impl Sized>) -> HeapCorruption
    {
        match result {
            Err(Error::Heap(err)) => err,
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("corruption was not detected"),
        }
    }

    #[test]
    fn zero_size_is_none()
    {
        assert!(heap().malloc(0, Site::here()).unwrap().is_none());
    }

    #[test]
    fn payload_alignment()
    {
        let heap = heap();
        for size in [1, 7, 8, 15, 16, 100] {
            let ptr = alloc(&heap, size);
            assert_eq!(ptr.as_ptr() as usize % PAYLOAD_ALIGN, 0);
        }
    }

    #[test]
    fn free_then_double_free()
    {
        let heap = heap();
        let ptr = alloc(&heap, 32);
        heap.free(Some(ptr), Site::here()).unwrap();
        let err = corruption(heap.free(Some(ptr), Site::Named("second")));
        assert_eq!(err.kind(), CorruptionKind::DuplicateFree);
        assert!(err.to_string().contains("duplicate free()"));
        assert!(err.to_string().ends_with("freed at: second"));
    }

    #[test]
    fn checking_freed_memory()
    {
        let heap = heap();
        let ptr = alloc(&heap, 32);
        heap.free(Some(ptr), Site::here()).unwrap();
        let err = corruption(heap.check(Some(ptr), CheckType::Live, Site::here()));
        assert_eq!(err.kind(), CorruptionKind::CheckedFreedMemory);
    }

    #[test]
    fn overflow_by_one_byte()
    {
        let heap = heap();
        let ptr = alloc(&heap, 10);
        unsafe { ptr.as_ptr().add(10).write(0); }
        let err = corruption(heap.check(Some(ptr), CheckType::Live, Site::here()));
        assert_eq!(err.kind(), CorruptionKind::Overflow);
        assert!(err.to_string().contains("probable buffer overflow"));
        assert!(err.allocated_at().unwrap().is_line_numbered());
    }

    #[test]
    fn underflow_by_one_byte()
    {
        let heap = heap();
        let ptr = alloc(&heap, 10);
        unsafe { ptr.as_ptr().sub(1).write(0); }
        let err = corruption(heap.check(Some(ptr), CheckType::Live, Site::here()));
        assert_eq!(err.kind(), CorruptionKind::Underflow);
    }

    #[test]
    fn overflow_found_by_later_free()
    {
        let heap = heap();
        let ptr = alloc(&heap, 24);
        unsafe { ptr.as_ptr().add(24).write(0); }
        let err = corruption(heap.free(Some(ptr), Site::here()));
        assert_eq!(err.kind(), CorruptionKind::Overflow);
        assert!(err.to_string().starts_with("Debug free detected"));
    }

    #[test]
    fn unknown_pointer()
    {
        let heap = heap();
        let local = [0u64; 4];
        let ptr = NonNull::new(local.as_ptr().cast::<u8>().cast_mut()).unwrap();
        let err = corruption(heap.free(Some(ptr), Site::here()));
        assert!(matches!(err.kind(), CorruptionKind::BadPointer));
        assert_eq!(err.allocated_at(), None);
    }

    #[test]
    fn segment_pointer()
    {
        let heap = heap();
        let segment = vec![0u8; 64];
        let start = segment.as_ptr() as usize;
        heap.set_segment(Some(start .. start + 64));
        let ptr = NonNull::new(segment.as_ptr().cast_mut()).unwrap();
        let err = corruption(heap.check(Some(ptr), CheckType::Live, Site::here()));
        assert_eq!(err.kind(), CorruptionKind::SegmentPointer);
    }

    #[test]
    fn scan_freed_detects_write_after_free()
    {
        let heap = DebugHeap::with_settings(Settings{scan_freed: true, ..Settings::default()});
        let ptr = alloc(&heap, 40);
        heap.free(Some(ptr), Site::here()).unwrap();
        heap.check_all(Site::here()).unwrap();

        unsafe { ptr.as_ptr().add(17).write(0x42); }
        let err = corruption(heap.check_all(Site::here()));
        assert_eq!(err.kind(), CorruptionKind::WriteAfterFree{offset: 17});
    }

    #[test]
    fn check_all_counts()
    {
        let heap = heap();
        let ptrs: Vec<_> = (1 ..= 20).map(|n| alloc(&heap, n * 3)).collect();
        heap.check_all(Site::here()).unwrap();
        for ptr in ptrs.iter().step_by(2) {
            heap.free(Some(*ptr), Site::here()).unwrap();
        }
        heap.check_all(Site::here()).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.live_objects, 10);
        assert_eq!(stats.freed_objects, 10);
    }

    #[test]
    fn leak_marks_block()
    {
        let heap = heap();
        let ptr = alloc(&heap, 8);
        heap.leak(Some(ptr), Site::here()).unwrap();
        heap.check(Some(ptr), CheckType::Live, Site::here()).unwrap();
        let mut out = Vec::new();
        heap.dump_live(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("          8 *   "));
    }

    #[test]
    fn calloc_and_realloc()
    {
        let heap = DebugHeap::with_settings(Settings{init: true, ..Settings::default()});
        let ptr = heap.calloc(4, 4, Site::here()).unwrap().unwrap();
        let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), 16) };
        assert!(bytes.iter().all(|&b| b == 0));

        unsafe { ptr.as_ptr().write(7); }
        let ptr = heap.realloc(Some(ptr), 64, Site::here()).unwrap().unwrap();
        assert_eq!(unsafe { ptr.as_ptr().read() }, 7);
        assert_eq!(heap.check(Some(ptr), CheckType::Live, Site::here()).unwrap(), 64);

        assert!(heap.realloc(Some(ptr), 0, Site::here()).unwrap().is_none());
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn reentrant_check_is_skipped()
    {
        let heap = heap();
        let ptr = alloc(&heap, 8);
        unsafe { ptr.as_ptr().add(8).write(0); }

        let _entered = heap.enter().unwrap();
        assert!(heap.check_all(Site::here()).is_ok());
        assert!(heap.check_one(Site::here()).is_ok());
        assert_eq!(heap.check(Some(ptr), CheckType::Live, Site::here()).unwrap(), 0);
    }

    #[test]
    fn busy_lock_skips_check()
    {
        let heap = heap();
        let ptr = alloc(&heap, 8);
        unsafe { ptr.as_ptr().add(8).write(0); }

        let (locked_tx, locked_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let holder = {
            let heap = heap.clone();
            thread::spawn(move || {
                let _entered = heap.enter().unwrap();
                locked_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        assert!(heap.check_all(Site::here()).is_ok());
        done_tx.send(()).unwrap();
        holder.join().unwrap();

        assert!(heap.check_all(Site::here()).is_err());
    }

    #[test]
    fn settings_read_lazily()
    {
        let env = MapEnv::new()
            .with("MALLOC_SCANFREED", "1")
            .with("QUIET", "1");
        let heap = DebugHeap::new(Arc::new(env));
        assert!(!heap.settings().scan_freed);
        alloc(&heap, 1);
        let settings = heap.settings();
        assert!(settings.scan_freed && settings.clobber && settings.leak_all);
    }

    #[test]
    fn bad_setting_is_an_error()
    {
        let env = MapEnv::new().with("MALLOC_INIT", "perhaps");
        let heap = DebugHeap::new(Arc::new(env));
        assert!(matches!(heap.malloc(1, Site::here()), Err(Error::Setting(..))));
    }

    proptest!
    {
        #[test]
        fn malloc_then_check_is_clean(size in 1usize .. 4096)
        {
            let heap = heap();
            let ptr = alloc(&heap, size);
            assert_eq!(heap.check(Some(ptr), CheckType::Live, Site::here()).unwrap(), size);
            heap.free(Some(ptr), Site::here()).unwrap();
        }

        #[test]
        fn pattern_round_trip(len in 0usize .. 100, value: u64)
        {
            let mut bytes = vec![0u8; len];
            fill_pattern(&mut bytes, value);
            assert_eq!(find_pattern_mismatch(&bytes, value), None);
        }
    }
}
