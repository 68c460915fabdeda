use {
    super::{
        ClientHandle, EpHandle, HandleError, Kind, SegmentHandle, TmHandle, TmPair,
        is_pair,
    },
    crate::{Error, Result, object::{Client, Endpoint, Segment, Team}},
    std::{
        collections::hash_map::RandomState,
        hash::{BuildHasher, Hasher},
        sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    },
};

/// Tag of a slot whose object is still being constructed.
const RESERVED: u64 = 0;

/// Largest number of slots.
const MAX_SLOTS: usize = 0x7fff_fffe;

const GENERATION_MASK: u32 = 0x7fff_ffff;

/// Object held by a registry slot.
#[allow(missing_docs)]
pub enum Object
{
    Client(Arc<Client>),
    Segment(Arc<Segment>),
    Endpoint(Arc<Endpoint>),
    Team(Arc<Team>),
}

impl Object
{
    /// The kind of the object.
    pub fn kind(&self) -> Kind
    {
        match self {
            Self::Client(..)   => Kind::Client,
            Self::Segment(..)  => Kind::Segment,
            Self::Endpoint(..) => Kind::Endpoint,
            Self::Team(..)     => Kind::Team,
        }
    }
}

/// Object type that can be stored in a [`Registry`].
pub trait Registered: Sized + Send + Sync + 'static
{
    /// Kind of the object.
    const KIND: Kind;

    /// Handle type that refers to the object.
    type Handle: Copy;

    #[allow(missing_docs)]
    fn handle_from_raw(raw: u64) -> Self::Handle;

    #[allow(missing_docs)]
    fn handle_into_raw(handle: Self::Handle) -> u64;

    #[allow(missing_docs)]
    fn wrap(this: Arc<Self>) -> Object;

    #[allow(missing_docs)]
    fn unwrap(object: &Object) -> Option<&Arc<Self>>;

    /// The handle the object was registered under.
    fn handle(&self) -> Self::Handle;
}

macro_rules! registered
{
    ($type:ident, $handle:ident) => {
        impl Registered for $type
        {
            const KIND: Kind = Kind::$type;

            type Handle = $handle;

            fn handle_from_raw(raw: u64) -> $handle
            {
                $handle::from_raw(raw)
            }

            fn handle_into_raw(handle: $handle) -> u64
            {
                handle.into_raw()
            }

            fn wrap(this: Arc<Self>) -> Object
            {
                Object::$type(this)
            }

            fn unwrap(object: &Object) -> Option<&Arc<Self>>
            {
                match object {
                    Object::$type(this) => Some(this),
                    _ => None,
                }
            }

            fn handle(&self) -> $handle
            {
                self.handle
            }
        }
    };
}

registered!(Client, ClientHandle);
registered!(Segment, SegmentHandle);
registered!(Endpoint, EpHandle);
registered!(Team, TmHandle);

/// Team named by a team handle.
#[derive(Clone)]
pub enum TeamRef
{
    /// A real team.
    Team(Arc<Team>),

    /// A pair of endpoint indices.
    Pair(TmPair),
}

struct Slot
{
    magic: u64,
    generation: u32,
    object: Option<Object>,
}

#[derive(Default)]
struct Slots
{
    entries: Vec<Slot>,
    vacant: Vec<usize>,
}

/// Table of live objects, indexed by handle.
///
/// A handle encodes a slot index and the generation of that slot.
/// Destroying an object overwrites the slot tag with the freed tag,
/// and reusing the slot bumps its generation,
/// so stale handles keep failing to import.
///
/// With swizzling, exported values are xored with a per-registry key.
/// The key keeps the low bit clear, so that [`TmPair`]s stay recognizable.
pub struct Registry
{
    slots: RwLock<Slots>,
    key: u64,
}

impl Registry
{
    /// Create an empty registry.
    pub fn new(swizzle: bool) -> Self
    {
        let key = if swizzle {
            let mut hasher = RandomState::new().build_hasher();
            hasher.write_u64(os_ext::getpid() as u64);
            (hasher.finish() | 1 << 63) & !1
        } else {
            0
        };
        Self{slots: RwLock::new(Slots::default()), key}
    }

    /// Number of live objects.
    pub fn len(&self) -> usize
    {
        self.read().entries.iter().filter(|slot| slot.object.is_some()).count()
    }

    /// Whether no objects are live.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Register a new object.
    ///
    /// `make` receives the handle of the object before the object exists,
    /// so that the object can record it.
    /// Until `make` returns, importing the handle fails.
    pub fn insert_with<T, F>(&self, make: F) -> Result<Arc<T>>
        where T: Registered, F: FnOnce(T::Handle) -> Result<T>
    {
        let (index, generation) = {
            let mut slots = self.write();
            match slots.vacant.pop() {
                Some(index) => {
                    let slot = &mut slots.entries[index];
                    slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
                    slot.magic = RESERVED;
                    (index, slot.generation)
                },
                None => {
                    if slots.entries.len() >= MAX_SLOTS {
                        return Err(Error::Resource("Handle registry is full".into()));
                    }
                    slots.entries.push(Slot{magic: RESERVED, generation: 0, object: None});
                    (slots.entries.len() - 1, 0)
                },
            }
        };

        let handle = T::handle_from_raw(self.encode(index, generation));

        match make(handle) {
            Ok(object) => {
                let object = Arc::new(object);
                let mut slots = self.write();
                let slot = &mut slots.entries[index];
                slot.magic = T::KIND.magic();
                slot.object = Some(T::wrap(object.clone()));
                tracing::trace!(kind = %T::KIND, handle = T::handle_into_raw(handle), "registered");
                Ok(object)
            },
            Err(err) => {
                let mut slots = self.write();
                slots.entries[index].magic = T::KIND.freed_magic();
                slots.vacant.push(index);
                Err(err)
            },
        }
    }

    /// Get the handle of a live object.
    pub fn export<T>(&self, object: &T) -> std::result::Result<T::Handle, HandleError>
        where T: Registered
    {
        let handle = object.handle();
        let found = self.import::<T>(handle)?;
        if !std::ptr::eq(Arc::as_ptr(&found), object) {
            let raw = T::handle_into_raw(handle);
            return Err(HandleError::Freed{kind: T::KIND, raw});
        }
        Ok(handle)
    }

    /// Get the object named by a handle.
    pub fn import<T>(&self, handle: T::Handle) -> std::result::Result<Arc<T>, HandleError>
        where T: Registered
    {
        let raw = T::handle_into_raw(handle);
        let slots = self.read();
        let index = self.validate::<T>(&slots, raw)?;
        match slots.entries[index].object.as_ref().and_then(T::unwrap) {
            Some(object) => Ok(object.clone()),
            None => Err(HandleError::Invalid{kind: T::KIND, raw}),
        }
    }

    /// Get the team or pair named by a team handle.
    pub fn import_tm(&self, handle: TmHandle) -> std::result::Result<TeamRef, HandleError>
    {
        if is_pair(handle.into_raw()) {
            Ok(TeamRef::Pair(TmPair::import(handle)?))
        } else {
            Ok(TeamRef::Team(self.import::<Team>(handle)?))
        }
    }

    /// Get the team named by a team handle, rejecting pairs.
    pub fn import_tm_nonpair(&self, handle: TmHandle)
        -> std::result::Result<Arc<Team>, HandleError>
    {
        if is_pair(handle.into_raw()) {
            return Err(HandleError::TmPair);
        }
        self.import::<Team>(handle)
    }

    /// Every live object of one kind, in slot order.
    pub fn live<T>(&self) -> Vec<Arc<T>>
        where T: Registered
    {
        self.read().entries.iter()
            .filter(|slot| slot.magic == T::KIND.magic())
            .filter_map(|slot| slot.object.as_ref().and_then(T::unwrap).cloned())
            .collect()
    }

    /// Unregister an object.
    ///
    /// `fini` runs while the object can still be imported.
    /// Afterwards the slot carries the freed tag and the object is returned
    /// so that the caller controls when its memory goes away.
    pub fn remove<T, F>(&self, handle: T::Handle, fini: F)
        -> std::result::Result<Arc<T>, HandleError>
        where T: Registered, F: FnOnce(&T)
    {
        let object = self.import::<T>(handle)?;
        fini(&object);

        let raw = T::handle_into_raw(handle);
        let mut slots = self.write();
        let index = self.validate::<T>(&slots, raw)?;
        let slot = &mut slots.entries[index];
        slot.magic = T::KIND.freed_magic();
        let object = slot.object.take();
        slots.vacant.push(index);

        match object.as_ref().and_then(T::unwrap) {
            Some(object) => {
                tracing::trace!(kind = %T::KIND, handle = raw, "unregistered");
                Ok(object.clone())
            },
            None => Err(HandleError::Invalid{kind: T::KIND, raw}),
        }
    }

    /// Find the slot named by `raw` and check its tag.
    fn validate<T>(&self, slots: &Slots, raw: u64) -> std::result::Result<usize, HandleError>
        where T: Registered
    {
        let invalid = HandleError::Invalid{kind: T::KIND, raw};
        let (index, generation) = self.decode(raw).ok_or(invalid.clone())?;
        let slot = slots.entries.get(index).ok_or(invalid.clone())?;

        if slot.generation != generation {
            return Err(HandleError::Freed{kind: T::KIND, raw});
        }
        if slot.magic == T::KIND.magic() {
            return Ok(index);
        }
        if slot.magic == T::KIND.freed_magic() {
            return Err(HandleError::Freed{kind: T::KIND, raw});
        }

        let found = [Kind::Client, Kind::Segment, Kind::Endpoint, Kind::Team]
            .into_iter()
            .find(|kind| slot.magic == kind.magic() || slot.magic == kind.freed_magic());
        match found {
            Some(found) => Err(HandleError::WrongKind{expected: T::KIND, found, raw}),
            None => Err(invalid),
        }
    }

    fn encode(&self, index: usize, generation: u32) -> u64
    {
        let raw = (u64::from(generation & GENERATION_MASK) << 32) | ((index as u64 + 1) << 1);
        raw ^ self.key
    }

    fn decode(&self, value: u64) -> Option<(usize, u32)>
    {
        if value == 0 || is_pair(value) {
            return None;
        }
        let raw = value ^ self.key;
        let generation = raw >> 32;
        if generation > u64::from(GENERATION_MASK) {
            return None;
        }
        let slot = (raw & 0xffff_ffff) >> 1;
        if slot == 0 {
            return None;
        }
        Some(((slot - 1) as usize, generation as u32))
    }

    fn read(&self) -> RwLockReadGuard<Slots>
    {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<Slots>
    {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}
