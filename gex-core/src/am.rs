//! Active-message handler tables.
//!
//! Every endpoint has a table of 256 handler slots.
//! Index 0 is never used, so that it can mean "any free index".
//! Ranges of the table are set aside for the handlers of the runtime
//! and for those of its users; see the `*_BASE` constants.

use {
    smallvec::SmallVec,
    std::{
        fmt,
        ops::Range,
        sync::{Mutex, PoisonError},
    },
};

/// First index of the core handler range.
pub const CORE_BASE: usize = 1;

/// First index of the extended handler range.
pub const EXTENDED_BASE: usize = 64;

/// First index of the client handler range.
pub const CLIENT_BASE: usize = 128;

/// Number of slots in a handler table.
pub const TABLE_SIZE: usize = 256;

/// Indices reserved for core handlers.
pub const CORE_RANGE: Range<usize> = CORE_BASE .. EXTENDED_BASE;

/// Indices reserved for extended handlers.
pub const EXTENDED_RANGE: Range<usize> = EXTENDED_BASE .. CLIENT_BASE;

/// Indices available to clients.
pub const CLIENT_RANGE: Range<usize> = CLIENT_BASE .. TABLE_SIZE;

/// Active-message handler.
pub type Handler = fn(args: &[u32]);

/// Entry of a handler table.
#[derive(Clone, Copy)]
pub struct AmEntry
{
    /// Requested index, or zero for any free index in the range.
    pub index: u8,

    /// The handler.
    pub handler: Handler,

    /// Number of arguments the handler expects.
    pub nargs: u8,

    /// Name for diagnostics.
    pub name: &'static str,
}

impl fmt::Debug for AmEntry
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("AmEntry")
            .field("index", &self.index)
            .field("nargs", &self.nargs)
            .field("name", &self.name)
            .finish()
    }
}

/// Handler table of an endpoint.
pub struct AmTable
{
    slots: Mutex<Vec<Option<AmEntry>>>,
}

impl Default for AmTable
{
    fn default() -> Self
    {
        Self{slots: Mutex::new(vec![None; TABLE_SIZE])}
    }
}

impl AmTable
{
    /// Register handlers at indices within `range`.
    ///
    /// Entries with a fixed index must name a vacant slot in the range.
    /// The others take the lowest vacant slot in the range.
    /// Registration stops at the first entry that cannot be placed;
    /// the returned indices are those of the entries that were registered.
    pub fn register(&self, entries: &[AmEntry], range: Range<usize>) -> SmallVec<[u8; 16]>
    {
        let range = range.start.max(1) .. range.end.min(TABLE_SIZE);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut registered = SmallVec::new();

        for entry in entries {
            let index = match entry.index as usize {
                0 => range.clone().find(|&i| slots[i].is_none()),
                i if range.contains(&i) && slots[i].is_none() => Some(i),
                _ => None,
            };
            let Some(index) = index else {
                tracing::debug!(
                    name = entry.name,
                    index = entry.index,
                    ?range,
                    "cannot register handler",
                );
                break;
            };
            slots[index] = Some(AmEntry{index: index as u8, ..*entry});
            registered.push(index as u8);
        }

        registered
    }

    /// The handler registered at `index`.
    pub fn get(&self, index: u8) -> Option<AmEntry>
    {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)[index as usize]
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize
    {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
            .iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    fn nop(_: &[u32])
    {
    }

    fn entry(index: u8) -> AmEntry
    {
        AmEntry{index, handler: nop, nargs: 0, name: "nop"}
    }

    #[test]
    fn fixed_and_dynamic()
    {
        let table = AmTable::default();
        let ids = table.register(&[entry(3), entry(0), entry(0)], CORE_RANGE);
        assert_eq!(ids.as_slice(), &[3, 1, 2]);
        assert_eq!(table.get(3).map(|e| e.index), Some(3));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn collision_stops_registration()
    {
        let table = AmTable::default();
        let ids = table.register(&[entry(70), entry(70), entry(0)], EXTENDED_RANGE);
        assert_eq!(ids.as_slice(), &[70]);
    }

    #[test]
    fn out_of_range()
    {
        let table = AmTable::default();
        assert!(table.register(&[entry(64)], CORE_RANGE).is_empty());
        assert!(table.is_empty());
    }

    proptest!
    {
        #[test]
        fn dynamic_ids_are_distinct_and_in_range(count in 0usize .. 80)
        {
            let table = AmTable::default();
            let entries = vec![entry(0); count];
            let ids = table.register(&entries, EXTENDED_RANGE);
            assert_eq!(ids.len(), count.min(EXTENDED_RANGE.len()));
            let mut sorted = ids.to_vec();
            sorted.dedup();
            assert_eq!(sorted.len(), ids.len());
            assert!(ids.iter().all(|&i| EXTENDED_RANGE.contains(&(i as usize))));
        }
    }
}
