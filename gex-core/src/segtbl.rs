//! Dense table of the live segments of this process.

use {
    crate::object::Segment,
    std::sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Dense table of segments.
///
/// Every segment in the table knows its position in the table,
/// so removal is constant-time: the last segment moves into the hole.
/// Iteration order is therefore not preserved across removals.
#[derive(Default)]
pub struct SegmentTable
{
    segments: Mutex<Vec<Arc<Segment>>>,
}

impl SegmentTable
{
    /// Create an empty table.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append a segment and record its position.
    pub fn add(&self, segment: Arc<Segment>)
    {
        let mut segments = self.lock();
        segment.set_table_index(segments.len());
        segments.reserve_exact(1);
        segments.push(segment);
    }

    /// Remove a segment by moving the last segment into its position.
    ///
    /// Returns whether the segment was in the table.
    pub fn delete(&self, segment: &Segment) -> bool
    {
        let mut segments = self.lock();
        let index = segment.table_index();
        match segments.get(index) {
            Some(found) if std::ptr::eq(Arc::as_ptr(found), segment) => (),
            _ => return false,
        }
        segments.swap_remove(index);
        if let Some(moved) = segments.get(index) {
            moved.set_table_index(index);
        }
        segment.set_table_index(usize::MAX);
        true
    }

    /// Number of segments.
    pub fn len(&self) -> usize
    {
        self.lock().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Find a segment, holding the table lock for the whole scan.
    pub fn find<F>(&self, mut predicate: F) -> Option<Arc<Segment>>
        where F: FnMut(&Segment) -> bool
    {
        self.lock().iter().find(|segment| predicate(segment)).cloned()
    }

    /// Copy out the current contents.
    pub fn snapshot(&self) -> Vec<Arc<Segment>>
    {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<Vec<Arc<Segment>>>
    {
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
