use {
    super::{DebugHeap, Site},
    crate::{OrFatal, Result},
    std::{fmt, ptr::NonNull, slice, sync::Arc},
};

/// Bytes owned by a [`DebugHeap`].
///
/// The block is freed when this value is dropped.
/// A corrupted block is fatal at that point.
pub struct HeapBytes
{
    heap: Arc<DebugHeap>,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: The block is uniquely owned and the heap is thread-safe.
unsafe impl Send for HeapBytes {}
unsafe impl Sync for HeapBytes {}

impl HeapBytes
{
    /// Allocate `len` zero bytes.
    ///
    /// Returns [`None`] if `len` is zero.
    pub fn zeroed(heap: &Arc<DebugHeap>, len: usize, site: Site)
        -> Result<Option<Self>>
    {
        let ptr = heap.calloc(len, 1, site)?;
        Ok(ptr.map(|ptr| Self{heap: heap.clone(), ptr, len}))
    }

    /// Copy a string into the heap, with a terminating NUL.
    pub fn strdup(heap: &Arc<DebugHeap>, string: &str, site: Site) -> Result<Self>
    {
        let len = string.len() + 1;
        let ptr = heap.malloc(len, site)?
            .ok_or_else(|| crate::Error::Resource("strdup of a zero-length block".into()))?;

        // SAFETY: The block is len bytes long.
        unsafe {
            ptr.as_ptr().copy_from_nonoverlapping(string.as_ptr(), string.len());
            ptr.as_ptr().add(string.len()).write(0);
        }

        Ok(Self{heap: heap.clone(), ptr, len})
    }

    /// Address of the first byte.
    pub fn as_ptr(&self) -> *mut u8
    {
        self.ptr.as_ptr()
    }

    /// Number of bytes.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Always false; empty blocks are never allocated.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// View the bytes.
    pub fn as_slice(&self) -> &[u8]
    {
        // SAFETY: The block is live and owned by self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the bytes mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8]
    {
        // SAFETY: The block is live and uniquely owned by self.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// The string stored by [`strdup`][`Self::strdup`].
    pub fn as_c_str_lossy(&self) -> String
    {
        let bytes = self.as_slice();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[.. end]).into_owned()
    }
}

impl fmt::Debug for HeapBytes
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("HeapBytes")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for HeapBytes
{
    fn drop(&mut self)
    {
        self.heap.free(Some(self.ptr), Site::Named("HeapBytes::drop")).or_fatal()
    }
}
