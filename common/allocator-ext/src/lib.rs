//! Extra items for working with allocators.
//!
//! [`RawAllocator`] is the seam between the debug heap and
//! whatever actually hands out memory.
//! [`System`] forwards to the global allocator,
//! and [`AligningAllocator`] raises the alignment of another allocator.

#![warn(missing_docs)]

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
    slice,
};

/// Allocator that hands out raw, uninitialized memory.
///
/// # Safety
///
/// Memory returned by [`allocate`] must be valid for reads and writes
/// of `layout.size()` bytes and aligned to `layout.align()`,
/// until it is passed to [`deallocate`] with the same layout.
///
/// [`allocate`]: `Self::allocate`
/// [`deallocate`]: `Self::deallocate`
pub unsafe trait RawAllocator
{
    /// Allocate memory for `layout`.
    ///
    /// Returns [`None`] if the memory could not be allocated.
    /// Zero-sized layouts are rounded up to one byte.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release memory obtained from [`allocate`][`Self::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`][`Self::allocate`]
    /// on this allocator with the same `layout`, and not released since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct System;

// SAFETY: std::alloc upholds the contract.
unsafe impl RawAllocator for System
{
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>
    {
        let layout = nonzero_layout(layout)?;
        // SAFETY: The layout has non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout)
    {
        // allocate succeeded for this layout, so this cannot fail.
        if let Some(layout) = nonzero_layout(layout) {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

fn nonzero_layout(layout: Layout) -> Option<Layout>
{
    Layout::from_size_align(layout.size().max(1), layout.align()).ok()
}

/// Ensure a minimum alignment of `ALIGN` for each allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AligningAllocator<T, const ALIGN: usize>(pub T);

// SAFETY: Raising the alignment preserves the contract of T.
unsafe impl<T, const ALIGN: usize> RawAllocator for AligningAllocator<T, ALIGN>
    where T: RawAllocator
{
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>
    {
        let layout = layout.align_to(ALIGN).ok()?;
        self.0.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout)
    {
        // allocate succeeded for this layout, so align_to did too.
        if let Ok(layout) = layout.align_to(ALIGN) {
            self.0.deallocate(ptr, layout)
        }
    }
}

/// Owned, zero-initialized memory region.
///
/// The region is released through the allocator that created it
/// when the region is dropped.
pub struct Region<A>
    where A: RawAllocator
{
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: A,
}

impl<A> Region<A>
    where A: RawAllocator
{
    /// Allocate a zeroed region of `len` bytes aligned to `align`.
    ///
    /// Returns [`None`] if the layout is invalid
    /// or the allocator is out of memory.
    pub fn zeroed(allocator: A, len: usize, align: usize) -> Option<Self>
    {
        let layout = Layout::from_size_align(len, align).ok()?;
        let ptr = allocator.allocate(layout)?;
        // SAFETY: The allocation is at least len bytes.
        unsafe { ptr.as_ptr().write_bytes(0, len); }
        Some(Self{ptr, layout, allocator})
    }

    /// Address of the first byte.
    pub fn as_ptr(&self) -> *mut u8
    {
        self.ptr.as_ptr()
    }

    /// Number of bytes in the region.
    pub fn len(&self) -> usize
    {
        self.layout.size()
    }

    /// Whether the region has no bytes.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// View the region as bytes.
    pub fn as_slice(&self) -> &[u8]
    {
        // SAFETY: The region is initialized and owned by self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }
}

impl<A> Drop for Region<A>
    where A: RawAllocator
{
    fn drop(&mut self)
    {
        // SAFETY: ptr and layout come from Region::zeroed.
        unsafe { self.allocator.deallocate(self.ptr, self.layout) }
    }
}

// SAFETY: The region is uniquely owned memory.
unsafe impl<A> Send for Region<A> where A: RawAllocator + Send {}
unsafe impl<A> Sync for Region<A> where A: RawAllocator + Sync {}
