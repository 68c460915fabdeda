use {
    super::Site,
    std::collections::{HashMap, VecDeque},
};

/// Number of freed blocks whose size and site are remembered.
pub (super) const RETIRED_CAPACITY: usize = 4096;

/// Metadata for one block, kept beside the heap rather than inside it.
#[derive(Clone, Debug)]
pub (super) struct Descriptor
{
    /// Address of the payload.
    pub addr: usize,

    /// Number of payload bytes requested.
    pub size: usize,

    /// Where the block was allocated.
    pub site: Site,

    pub prev: usize,
    pub next: usize,
}

/// Record of a block that left the ring.
#[derive(Clone, Copy, Debug)]
pub (super) struct Retired
{
    pub size: usize,
    pub site: Site,
}

/// Circular doubly-linked ring of descriptors, stored in a slab.
///
/// Links are slab indices.
/// Insertion happens just before the cursor, so the cursor
/// visits new blocks last.
#[derive(Default)]
pub (super) struct Ring
{
    slab: Vec<Option<Descriptor>>,
    vacant: Vec<usize>,
    by_addr: HashMap<usize, usize>,
    retired: HashMap<usize, (u64, Retired)>,
    retired_order: VecDeque<(usize, u64)>,
    retired_seq: u64,
    cursor: Option<usize>,
}

impl Ring
{
    pub fn cursor(&self) -> Option<usize>
    {
        self.cursor
    }

    pub fn set_cursor(&mut self, index: usize)
    {
        self.cursor = Some(index);
    }

    pub fn get(&self, index: usize) -> Option<&Descriptor>
    {
        self.slab.get(index)?.as_ref()
    }

    /// Slab index of the block whose payload starts at `addr`.
    pub fn find(&self, addr: usize) -> Option<usize>
    {
        self.by_addr.get(&addr).copied()
    }

    /// Whether `index` refers to an occupied slab entry.
    pub fn is_linked(&self, index: usize) -> bool
    {
        matches!(self.slab.get(index), Some(Some(_)))
    }

    /// Information about a block that was removed from the ring.
    pub fn retired(&self, addr: usize) -> Option<Retired>
    {
        self.retired.get(&addr).map(|&(_, retired)| retired)
    }

    /// Number of freed blocks currently remembered.
    #[cfg(test)]
    pub fn retired_len(&self) -> usize
    {
        self.retired.len()
    }

    /// Remember a freed block, forgetting the oldest one when full.
    fn retire(&mut self, addr: usize, retired: Retired)
    {
        if self.retired_order.len() == RETIRED_CAPACITY {
            if let Some((old, seq)) = self.retired_order.pop_front() {
                if matches!(self.retired.get(&old), Some(&(s, _)) if s == seq) {
                    self.retired.remove(&old);
                }
            }
        }
        self.retired_seq += 1;
        self.retired.insert(addr, (self.retired_seq, retired));
        self.retired_order.push_back((addr, self.retired_seq));
    }

    /// Link a new descriptor in front of the cursor.
    pub fn insert(&mut self, addr: usize, size: usize, site: Site) -> usize
    {
        self.retired.remove(&addr);

        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slab.push(None);
                self.slab.len() - 1
            },
        };

        let (prev, next) = match self.cursor {
            None => (index, index),
            Some(cursor) => {
                let prev = self.desc(cursor).prev;
                self.desc_mut(prev).next = index;
                self.desc_mut(cursor).prev = index;
                (prev, cursor)
            },
        };

        self.slab[index] = Some(Descriptor{addr, size, site, prev, next});
        self.by_addr.insert(addr, index);
        self.cursor.get_or_insert(index);
        index
    }

    /// Splice a descriptor out of the ring.
    ///
    /// If the cursor pointed at it, the cursor advances.
    pub fn remove(&mut self, index: usize) -> Option<Descriptor>
    {
        let desc = self.slab.get_mut(index)?.take()?;

        if desc.next == index {
            self.cursor = None;
        } else {
            if self.cursor == Some(index) {
                self.cursor = Some(desc.next);
            }
            self.desc_mut(desc.prev).next = desc.next;
            self.desc_mut(desc.next).prev = desc.prev;
        }

        self.by_addr.remove(&desc.addr);
        self.retire(desc.addr, Retired{size: desc.size, site: desc.site});
        self.vacant.push(index);
        Some(desc)
    }

    /// Descriptors in ring order starting at the cursor.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor>
    {
        let mut at = self.cursor;
        let start = self.cursor;
        let mut first = true;
        std::iter::from_fn(move || {
            let index = at?;
            if !first && Some(index) == start {
                return None;
            }
            first = false;
            let desc = self.get(index)?;
            at = Some(desc.next);
            Some(desc)
        })
    }

    fn desc(&self, index: usize) -> &Descriptor
    {
        match self.slab.get(index) {
            Some(Some(desc)) => desc,
            _ => unreachable!("ring link {} is dangling", index),
        }
    }

    fn desc_mut(&mut self, index: usize) -> &mut Descriptor
    {
        match self.slab.get_mut(index) {
            Some(Some(desc)) => desc,
            _ => unreachable!("ring link {} is dangling", index),
        }
    }
}
