//! The runtime context.
//!
//! [`Runtime`] owns every piece of process-wide state:
//! the settings, the debug heap, the handle registry,
//! the segment table, the bootstrap, and the nodemap.
//! Each is protected on its own.

use {
    crate::{
        Error, Result,
        am::{CORE_RANGE, EXTENDED_RANGE},
        conduit::Conduit,
        config::Config,
        handle::{
            ClientHandle, EpHandle, Registered, Registry, SegmentHandle, TeamRef,
            TmHandle, TmPair,
        },
        malloc::DebugHeap,
        nodemap::{Nodemap, Topology},
        object::{Capabilities, Client, Endpoint, Flags, MemoryKind, Segment, Storage, Team},
        segtbl::SegmentTable,
        spawner::{self, Backend, Bootstrap},
    },
    gex_util::env::Env,
    std::sync::{
        Arc, OnceLock, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering::{AcqRel, Release}},
    },
};

/// Local address range that does not match the kind of the bound segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsViolation
{
    /// The endpoint is bound to this device segment,
    /// and the range lies outside it.
    OutsideDeviceSegment(SegmentHandle),

    /// The range lies in this device segment,
    /// which is not the one bound to the endpoint.
    InsideDeviceSegment(SegmentHandle),
}

/// Process-wide state of the runtime.
pub struct Runtime
{
    config: Config,
    conduit: Arc<dyn Conduit>,
    heap: Arc<DebugHeap>,
    registry: Registry,
    segments: SegmentTable,
    bootstrap: Box<dyn Bootstrap>,
    nodemap: RwLock<Option<Arc<Nodemap>>>,
    client: OnceLock<ClientHandle>,
    attached: AtomicBool,
}

impl Runtime
{
    /// Bootstrap the job.
    ///
    /// The spawner is chosen among `backends` as configured;
    /// see [`spawner::select`].
    pub fn init(env: Arc<dyn Env>, conduit: Arc<dyn Conduit>, backends: Vec<Backend>)
        -> Result<Self>
    {
        Self::init_with(env, conduit, backends, None)
    }

    /// Bootstrap the job with the named spawner, ignoring the settings.
    pub fn init_forced(
        env: Arc<dyn Env>,
        conduit: Arc<dyn Conduit>,
        backends: Vec<Backend>,
        spawner: &str,
    ) -> Result<Self>
    {
        Self::init_with(env, conduit, backends, Some(spawner))
    }

    fn init_with(
        env: Arc<dyn Env>,
        conduit: Arc<dyn Conduit>,
        backends: Vec<Backend>,
        force_spawner: Option<&str>,
    ) -> Result<Self>
    {
        let config = match force_spawner {
            Some(name) => Config::from_env_forced(env.as_ref(), conduit.as_ref(), name)?,
            None => Config::from_env(env.as_ref(), conduit.as_ref())?,
        };

        let heap = DebugHeap::new(env);

        let bootstrap = spawner::select(&config.spawner, backends)?;
        let (rank, size) = (bootstrap.rank(), bootstrap.size());
        if config.spawn_verbose {
            tracing::info!(
                spawner = bootstrap.name(),
                "process {} of {} bootstrapped", rank, size,
            );
        }
        heap.set_identity(rank, size);

        let nodemap = Nodemap::init(
            &config,
            conduit.name(),
            Some(bootstrap.as_ref()),
            conduit.host_ids(),
            rank,
            size,
        )?;

        Ok(Self{
            registry: Registry::new(config.swizzle_handles),
            config,
            conduit,
            heap,
            segments: SegmentTable::new(),
            bootstrap,
            nodemap: RwLock::new(Some(Arc::new(nodemap))),
            client: OnceLock::new(),
            attached: AtomicBool::new(false),
        })
    }

    /// The settings read at startup.
    pub fn config(&self) -> &Config
    {
        &self.config
    }

    /// The debug heap.
    pub fn heap(&self) -> &Arc<DebugHeap>
    {
        &self.heap
    }

    /// The bootstrap collectives.
    pub fn bootstrap(&self) -> &dyn Bootstrap
    {
        self.bootstrap.as_ref()
    }

    /// Rank of this process.
    pub fn rank(&self) -> u32
    {
        self.bootstrap.rank()
    }

    /// Number of processes.
    pub fn size(&self) -> u32
    {
        self.bootstrap.size()
    }

    /// The nodemap, unless it was released.
    pub fn nodemap(&self) -> Option<Arc<Nodemap>>
    {
        self.nodemap.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The layout of the job, unless the nodemap was released.
    pub fn topology(&self) -> Option<Topology>
    {
        self.nodemap().map(|nodemap| nodemap.topology().clone())
    }

    /// Release the nodemap.
    pub fn nodemap_fini(&self)
    {
        let nodemap = self.nodemap.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(nodemap) = nodemap.and_then(|n| Arc::try_unwrap(n).ok()) {
            nodemap.fini();
        }
    }

    /// The segment table.
    pub fn segments(&self) -> &SegmentTable
    {
        &self.segments
    }

    /// The handle registry.
    pub fn registry(&self) -> &Registry
    {
        &self.registry
    }

    /// The client, once created.
    pub fn client_handle(&self) -> Option<ClientHandle>
    {
        self.client.get().copied()
    }

    /* -------------------------------------------------------------------- */
    /*                                Imports                               */
    /* -------------------------------------------------------------------- */

    /// Import a client handle.
    pub fn client(&self, handle: ClientHandle) -> Result<Arc<Client>>
    {
        Ok(self.registry.import(handle)?)
    }

    /// Import an endpoint handle.
    pub fn ep(&self, handle: EpHandle) -> Result<Arc<Endpoint>>
    {
        Ok(self.registry.import(handle)?)
    }

    /// Import a segment handle.
    pub fn segment(&self, handle: SegmentHandle) -> Result<Arc<Segment>>
    {
        Ok(self.registry.import(handle)?)
    }

    /// Import a team handle, rejecting pairs.
    pub fn team(&self, handle: TmHandle) -> Result<Arc<Team>>
    {
        Ok(self.registry.import_tm_nonpair(handle)?)
    }

    /// Import a team handle that may be a pair.
    pub fn team_or_pair(&self, handle: TmHandle) -> Result<TeamRef>
    {
        Ok(self.registry.import_tm(handle)?)
    }

    /// The handle of a live object.
    pub fn export<T>(&self, object: &T) -> Result<T::Handle>
        where T: Registered
    {
        Ok(self.registry.export(object)?)
    }

    /* -------------------------------------------------------------------- */
    /*                                Clients                               */
    /* -------------------------------------------------------------------- */

    /// Create the client, its primordial endpoint, and the team of the job.
    pub fn client_init(&self, name: &str, flags: Flags)
        -> Result<(ClientHandle, EpHandle, TmHandle)>
    {
        if self.client.get().is_some() {
            return Err(Error::usage("client_init()", "more than once"));
        }
        tracing::trace!(name, ?flags, "client_init");

        let sizes = self.conduit.extension_sizes();
        let client = self.registry.insert_with(|handle| {
            Client::new(&self.heap, handle, name, flags, self.config.max_eps, sizes.client)
        })?;
        if self.client.set(client.handle()).is_err() {
            self.registry.remove::<Client, _>(client.handle(), |_| ())?;
            return Err(Error::usage("client_init()", "more than once"));
        }

        let ep = self.ep_create(client.handle(), Capabilities::ALL, flags)?;
        let tm = self.tm_create(ep, self.rank(), self.size(), flags)?;
        Ok((client.handle(), ep, tm))
    }

    /* -------------------------------------------------------------------- */
    /*                               Endpoints                              */
    /* -------------------------------------------------------------------- */

    /// Create an endpoint.
    ///
    /// The first endpoint of a client must have every capability.
    /// Running out of endpoint indices is a resource error.
    pub fn ep_create(&self, client: ClientHandle, caps: Capabilities, flags: Flags)
        -> Result<EpHandle>
    {
        let client = self.client(client)?;
        tracing::trace!(client = %client.name(), ?caps, ?flags, "ep_create");

        if caps.is_empty() {
            return Err(Error::usage("ep_create()", "with no capabilities requested"));
        }
        if client.ep_count() == 0 && caps != Capabilities::ALL {
            return Err(Error::usage(
                "ep_create()",
                "for a primordial endpoint without every capability",
            ));
        }

        let Some(index) = client.reserve_ep_index() else {
            return Err(Error::Resource(format!(
                "would exceed per-client EP limit of {}", client.max_eps(),
            )));
        };

        let sizes = self.conduit.extension_sizes();
        let ep = self.registry.insert_with(|handle| {
            Endpoint::new(&self.heap, handle, client.handle(), index, caps, flags, sizes.endpoint)
        })?;
        client.set_ep(index, ep.handle());

        let tables = [
            (self.conduit.core_handlers(), CORE_RANGE, "core"),
            (self.conduit.extended_handlers(), EXTENDED_RANGE, "extended"),
        ];
        for (entries, range, which) in tables {
            let registered = ep.am().register(entries, range);
            if registered.len() != entries.len() {
                self.free_ep(&client, &ep);
                return Err(Error::Resource(format!(
                    "Error registering {} API handlers", which,
                )));
            }
        }

        if let Err(err) = self.conduit.ep_init(&ep) {
            self.free_ep(&client, &ep);
            return Err(err);
        }

        Ok(ep.handle())
    }

    fn free_ep(&self, client: &Client, ep: &Endpoint)
    {
        client.clear_ep(ep.index());
        if let Err(err) = self.registry.remove::<Endpoint, _>(ep.handle(), |_| ()) {
            tracing::debug!(%err, "endpoint vanished during creation");
        }
    }

    /// Bind a segment to an endpoint of the same client.
    pub fn ep_bind_segment(&self, ep: EpHandle, segment: SegmentHandle, flags: Flags)
        -> Result<()>
    {
        if !flags.is_empty() {
            return Err(Error::usage("ep_bind_segment()", "with non-zero flags"));
        }
        let ep = self.ep(ep)?;
        let segment = self.segment(segment)?;
        if ep.client() != segment.client() {
            return Err(Error::usage("ep_bind_segment()", "with a segment of another client"));
        }
        ep.bind_segment(Some(segment.handle()));
        Ok(())
    }

    /// The segment bound to the endpoint with the given index.
    pub fn epidx_to_segment(&self, client: ClientHandle, ep_idx: u32)
        -> Result<Option<SegmentHandle>>
    {
        let client = self.client(client)?;
        if ep_idx >= client.ep_count() {
            return Err(Error::usage("epidx_to_segment()", format!(
                "with endpoint index {} of {}", ep_idx, client.ep_count(),
            )));
        }
        let ep = client.ep(ep_idx).ok_or_else(|| Error::usage(
            "epidx_to_segment()",
            format!("with index {} of a destroyed endpoint", ep_idx),
        ))?;
        Ok(self.ep(ep)?.segment())
    }

    /* -------------------------------------------------------------------- */
    /*                                 Teams                                */
    /* -------------------------------------------------------------------- */

    /// Create a team over an endpoint.
    ///
    /// The first team of a client becomes its default team.
    pub fn tm_create(&self, ep: EpHandle, rank: u32, size: u32, flags: Flags)
        -> Result<TmHandle>
    {
        if size == 0 || rank >= size {
            return Err(Error::usage("tm_create()", format!(
                "with rank {} of a team of size {}", rank, size,
            )));
        }
        let ep = self.ep(ep)?;
        let client = self.client(ep.client())?;

        let sizes = self.conduit.extension_sizes();
        let tm = self.registry.insert_with(|handle| {
            Team::new(&self.heap, handle, ep.handle(), rank, size, flags, sizes.team)
        })?;
        if client.claim_tm0(tm.handle()) {
            tracing::trace!(rank, size, "created the first team");
        }
        Ok(tm.handle())
    }

    /// Destroy a team.
    pub fn tm_destroy(&self, tm: TmHandle) -> Result<()>
    {
        let team = self.team(tm)?;
        let client = self.client(self.ep(team.ep())?.client())?;
        if client.tm0() == Some(tm) {
            return Err(Error::usage("tm_destroy()", "on the first team of a client"));
        }
        self.registry.remove::<Team, _>(tm, |_| ())?;
        Ok(())
    }

    /// Make a pair of a local endpoint and a remote endpoint index.
    pub fn tm_pair(&self, ep: EpHandle, remote_index: u16) -> Result<TmHandle>
    {
        let ep = self.ep(ep)?;
        let local = u16::try_from(ep.index()).map_err(|_| Error::usage(
            "tm_pair()",
            format!("with endpoint index {}", ep.index()),
        ))?;
        Ok(TmPair{local, remote: remote_index}.export())
    }

    /// Decode a pair made by [`tm_pair`][`Self::tm_pair`].
    pub fn import_tm_pair(&self, tm: TmHandle) -> Result<TmPair>
    {
        Ok(TmPair::import(tm)?)
    }

    /// The local endpoint of a team or pair.
    pub fn tm_to_ep(&self, tm: TmHandle) -> Result<Arc<Endpoint>>
    {
        match self.team_or_pair(tm)? {
            TeamRef::Team(team) => self.ep(team.ep()),
            TeamRef::Pair(pair) => {
                let client = self.client_handle().ok_or_else(||
                    Error::usage("tm_to_ep()", "before client_init()"))?;
                let ep = self.client(client)?.ep(pair.local.into()).ok_or_else(||
                    Error::usage("tm_to_ep()", format!(
                        "with a pair naming endpoint {}", pair.local,
                    )))?;
                self.ep(ep)
            },
        }
    }

    /* -------------------------------------------------------------------- */
    /*                               Segments                               */
    /* -------------------------------------------------------------------- */

    /// Register a memory region.
    ///
    /// With `addr`, the caller provides the memory,
    /// which must stay valid until the segment is destroyed.
    /// Without, the runtime allocates zeroed memory.
    pub fn segment_create(
        &self,
        client: ClientHandle,
        addr: Option<usize>,
        size: usize,
        kind: MemoryKind,
        flags: Flags,
    ) -> Result<SegmentHandle>
    {
        if !flags.is_empty() {
            return Err(Error::usage("segment_create()", "with non-zero flags"));
        }
        if size == 0 {
            return Err(Error::usage("segment_create()", "with zero length"));
        }
        let client = self.client(client)?;
        tracing::trace!(client = %client.name(), ?addr, size, ?kind, "segment_create");

        let storage = match addr {
            Some(addr) => Storage::Client{addr, size},
            None => Storage::allocate(size).ok_or_else(|| Error::Resource(format!(
                "Failed to allocate {} bytes of segment memory", size,
            )))?,
        };

        let sizes = self.conduit.extension_sizes();
        let segment = self.registry.insert_with(|handle| {
            Segment::new(&self.heap, handle, client.handle(), storage, kind, flags, sizes.segment)
        })?;
        self.segments.add(segment.clone());
        Ok(segment.handle())
    }

    /// Create the segment of this process and bind it to the team endpoint.
    ///
    /// Succeeds at most once. A failed call leaves the attach available.
    pub fn segment_attach(&self, tm: TmHandle, size: usize) -> Result<SegmentHandle>
    {
        let team = self.team(tm)?;
        let ep = self.ep(team.ep())?;

        if self.attached.swap(true, AcqRel) {
            return Err(Error::usage(
                "segment_attach()",
                "more than once; the current implementation can be called at most once",
            ));
        }

        let attached = self.attach_segment(&ep, size);
        if attached.is_err() {
            self.attached.store(false, Release);
        }
        attached
    }

    fn attach_segment(&self, ep: &Endpoint, size: usize) -> Result<SegmentHandle>
    {
        let handle = self.segment_create(ep.client(), None, size, MemoryKind::Host, Flags::empty())?;
        let segment = self.segment(handle)?;

        if let Err(err) = self.conduit.segment_attach(&segment) {
            self.segment_destroy(handle, Flags::empty())?;
            return Err(Error::Resource(format!("Error attaching segment: {}", err)));
        }

        ep.bind_segment(Some(handle));
        self.heap.set_segment(Some(segment.range()));
        tracing::debug!(addr = segment.addr(), size, "segment attached");
        Ok(handle)
    }

    /// Destroy a segment.
    ///
    /// Endpoints of the owning client that are bound to it become unbound.
    pub fn segment_destroy(&self, handle: SegmentHandle, flags: Flags) -> Result<()>
    {
        if !flags.is_empty() {
            return Err(Error::usage("segment_destroy()", "with non-zero flags"));
        }
        let segment = self.segment(handle)?;

        if let Ok(client) = self.client(segment.client()) {
            for index in 0 .. client.ep_count() {
                let Some(ep) = client.ep(index)
                    else { continue };
                if let Ok(ep) = self.ep(ep) {
                    if ep.segment() == Some(handle) {
                        ep.bind_segment(None);
                    }
                }
            }
        }

        let conduit = &self.conduit;
        self.registry.remove::<Segment, _>(handle, |segment| conduit.segment_fini(segment))?;
        self.segments.delete(&segment);
        Ok(())
    }

    /// Check a local address range against the bound segment.
    ///
    /// If the endpoint of `tm` is bound to a device segment,
    /// the range must lie in it. Otherwise it must not lie in any
    /// device segment. Empty ranges are always fine.
    pub fn boundscheck_local(&self, tm: TmHandle, addr: usize, len: usize)
        -> Result<Option<BoundsViolation>>
    {
        if len == 0 {
            return Ok(None);
        }

        let ep = self.tm_to_ep(tm)?;
        if let Some(bound) = ep.segment() {
            let bound = self.segment(bound)?;
            if bound.contains(addr, len) {
                return Ok(None);
            }
            if bound.is_device() {
                return Ok(Some(BoundsViolation::OutsideDeviceSegment(bound.handle())));
            }
        }

        let found = self.segments.find(|segment| segment.contains(addr, len));
        Ok(match found {
            Some(segment) if segment.is_device() =>
                Some(BoundsViolation::InsideDeviceSegment(segment.handle())),
            _ => None,
        })
    }

    /* -------------------------------------------------------------------- */
    /*                               Teardown                               */
    /* -------------------------------------------------------------------- */

    /// Destroy the client and everything it owns.
    pub fn fini(&self) -> Result<()>
    {
        for segment in self.segments.snapshot() {
            self.segment_destroy(segment.handle(), Flags::empty())?;
        }

        if let Some(handle) = self.client.get().copied() {
            let client = self.client(handle)?;
            let eps: Vec<EpHandle> = (0 .. client.ep_count())
                .filter_map(|index| client.ep(index))
                .collect();
            for team in self.registry.live::<Team>() {
                if eps.contains(&team.ep()) {
                    self.registry.remove::<Team, _>(team.handle(), |_| ())?;
                }
            }
            for index in 0 .. client.ep_count() {
                if let Some(ep) = client.ep(index) {
                    client.clear_ep(index);
                    self.registry.remove::<Endpoint, _>(ep, |_| ())?;
                }
            }
            self.registry.remove::<Client, _>(handle, |_| ())?;
        }

        self.heap.set_segment(None);
        self.nodemap_fini();
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{
            am::AmEntry,
            conduit::Loopback,
            handle::HandleError,
            spawner::{SpawnerRequest, loopback_job},
        },
        gex_util::env::MapEnv,
    };

    fn runtime_with(env: MapEnv, conduit: Arc<dyn Conduit>) -> Result<Runtime>
    {
        let env = env.with("HOST_DETECT", "trivial");
        let backends = loopback_job(1).into_iter().map(|l| l.into_backend()).collect();
        Runtime::init(Arc::new(env), conduit, backends)
    }

    fn runtime(env: MapEnv) -> Runtime
    {
        let conduit = Loopback{default_spawner: Some("LOOPBACK")};
        runtime_with(env, Arc::new(conduit)).unwrap()
    }

    struct Picky
    {
        core: Vec<AmEntry>,
        reject_ep: Option<u32>,
    }

    fn nop(_args: &[u32])
    {
    }

    impl Conduit for Picky
    {
        fn name(&self) -> &str
        {
            "picky"
        }

        fn default_spawner(&self) -> Option<&str>
        {
            Some("LOOPBACK")
        }

        fn core_handlers(&self) -> &[AmEntry]
        {
            &self.core
        }

        fn ep_init(&self, ep: &Endpoint) -> Result<()>
        {
            if self.reject_ep == Some(ep.index()) {
                return Err(Error::Resource("endpoint rejected".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn client_init_creates_the_primordial_objects()
    {
        let rt = runtime(MapEnv::new());
        assert_eq!((rt.rank(), rt.size()), (0, 1));

        let (client, ep, tm) = rt.client_init("test", Flags::empty()).unwrap();
        let client = rt.client(client).unwrap();
        assert_eq!(client.name(), "test");
        assert_eq!(client.ep(0), Some(ep));
        assert_eq!(client.tm0(), Some(tm));

        let ep = rt.ep(ep).unwrap();
        assert!(ep.is_primordial());
        assert_eq!(ep.caps(), Capabilities::ALL);
        assert_eq!(ep.am().len(), 1);

        let team = rt.team(tm).unwrap();
        assert_eq!((team.rank(), team.size()), (0, 1));
        assert_eq!(rt.export(&*team).unwrap(), tm);

        assert!(matches!(
            rt.client_init("again", Flags::empty()),
            Err(Error::Usage{operation: "client_init()", ..}),
        ));
    }

    #[test]
    fn ep_limit()
    {
        let rt = runtime(MapEnv::new().with("MAXEPS", "2"));
        let (client, _, _) = rt.client_init("test", Flags::empty()).unwrap();

        let ep = rt.ep_create(client, Capabilities::RMA, Flags::empty()).unwrap();
        assert_eq!(rt.ep(ep).unwrap().index(), 1);

        match rt.ep_create(client, Capabilities::RMA, Flags::empty()) {
            Err(Error::Resource(message)) =>
                assert_eq!(message, "would exceed per-client EP limit of 2"),
            other => panic!("{:?}", other),
        }
        assert_eq!(rt.client(client).unwrap().ep_count(), 2);
    }

    #[test]
    fn ep_needs_capabilities()
    {
        let rt = runtime(MapEnv::new());
        let (client, _, _) = rt.client_init("test", Flags::empty()).unwrap();
        assert!(matches!(
            rt.ep_create(client, Capabilities::empty(), Flags::empty()),
            Err(Error::Usage{operation: "ep_create()", ..}),
        ));
    }

    #[test]
    fn rejected_ep_is_destroyed()
    {
        let picky = Picky{core: Vec::new(), reject_ep: Some(1)};
        let rt = runtime_with(MapEnv::new(), Arc::new(picky)).unwrap();
        let (client, _, _) = rt.client_init("test", Flags::empty()).unwrap();
        let live = rt.registry().len();

        assert!(matches!(
            rt.ep_create(client, Capabilities::AM, Flags::empty()),
            Err(Error::Resource(..)),
        ));
        assert_eq!(rt.registry().len(), live);

        let client = rt.client(client).unwrap();
        assert_eq!(client.ep(1), None);

        let ep = rt.ep_create(client.handle(), Capabilities::AM, Flags::empty()).unwrap();
        assert_eq!(rt.ep(ep).unwrap().index(), 2);
        assert!(matches!(
            rt.epidx_to_segment(client.handle(), 1),
            Err(Error::Usage{..}),
        ));
    }

    #[test]
    fn too_many_core_handlers()
    {
        let entry = AmEntry{index: 0, handler: nop, nargs: 0, name: "nop"};
        let picky = Picky{core: vec![entry; 64], reject_ep: None};
        let rt = runtime_with(MapEnv::new(), Arc::new(picky)).unwrap();
        match rt.client_init("test", Flags::empty()) {
            Err(Error::Resource(message)) =>
                assert_eq!(message, "Error registering core API handlers"),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn teams()
    {
        let rt = runtime(MapEnv::new());
        let (_, ep, tm) = rt.client_init("test", Flags::empty()).unwrap();

        assert!(matches!(rt.tm_create(ep, 3, 3, Flags::empty()), Err(Error::Usage{..})));
        assert!(matches!(rt.tm_create(ep, 0, 0, Flags::empty()), Err(Error::Usage{..})));

        let other = rt.tm_create(ep, 2, 3, Flags::empty()).unwrap();
        assert_ne!(other, tm);
        assert!(matches!(rt.tm_destroy(tm), Err(Error::Usage{..})));
        rt.tm_destroy(other).unwrap();
        assert!(matches!(rt.team(other), Err(Error::Handle(HandleError::Freed{..}))));
    }

    #[test]
    fn pairs()
    {
        let rt = runtime(MapEnv::new());
        let (_, ep, _) = rt.client_init("test", Flags::empty()).unwrap();

        let pair = rt.tm_pair(ep, 7).unwrap();
        assert_eq!(rt.import_tm_pair(pair).unwrap(), TmPair{local: 0, remote: 7});
        assert!(matches!(rt.team(pair), Err(Error::Handle(HandleError::TmPair))));
        assert_eq!(rt.tm_to_ep(pair).unwrap().handle(), ep);
    }

    #[test]
    fn segment_lifecycle()
    {
        let rt = runtime(MapEnv::new());
        let (client, ep, tm) = rt.client_init("test", Flags::empty()).unwrap();

        assert!(matches!(
            rt.segment_create(client, None, 0, MemoryKind::Host, Flags::empty()),
            Err(Error::Usage{operation: "segment_create()", ..}),
        ));

        let segment = rt.segment_attach(tm, 3 * 4096).unwrap();
        assert!(matches!(rt.segment_attach(tm, 4096), Err(Error::Usage{..})));
        assert_eq!(rt.epidx_to_segment(client, 0).unwrap(), Some(segment));
        assert_eq!(rt.ep(ep).unwrap().segment(), Some(segment));
        assert_eq!(rt.segments().len(), 1);
        assert!(matches!(rt.epidx_to_segment(client, 5), Err(Error::Usage{..})));

        rt.segment_destroy(segment, Flags::empty()).unwrap();
        assert_eq!(rt.epidx_to_segment(client, 0).unwrap(), None);
        assert!(rt.segments().is_empty());
        assert!(matches!(rt.segment(segment), Err(Error::Handle(..))));
    }

    #[test]
    fn bind_checks_client()
    {
        let rt = runtime(MapEnv::new());
        let (client, ep, _) = rt.client_init("test", Flags::empty()).unwrap();
        let segment = rt.segment_create(client, None, 4096, MemoryKind::Host, Flags::empty()).unwrap();
        assert!(matches!(
            rt.ep_bind_segment(ep, segment, Flags::IMMEDIATE),
            Err(Error::Usage{..}),
        ));
        rt.ep_bind_segment(ep, segment, Flags::empty()).unwrap();
        assert_eq!(rt.epidx_to_segment(client, 0).unwrap(), Some(segment));
    }

    #[test]
    fn boundscheck()
    {
        let rt = runtime(MapEnv::new());
        let (client, ep, tm) = rt.client_init("test", Flags::empty()).unwrap();

        let base = 0x4000_0000;
        let device = rt.segment_create(
            client, Some(base), 0x1000, MemoryKind::Device(0), Flags::empty(),
        ).unwrap();
        let host = rt.segment_create(client, None, 4096, MemoryKind::Host, Flags::empty()).unwrap();
        let host_addr = rt.segment(host).unwrap().addr();

        let check = |addr, len| rt.boundscheck_local(tm, addr, len).unwrap();

        assert_eq!(check(base, 0), None);
        assert_eq!(check(base + 16, 16), Some(BoundsViolation::InsideDeviceSegment(device)));
        assert_eq!(check(host_addr, 4096), None);
        assert_eq!(check(8, 8), None);

        rt.ep_bind_segment(ep, device, Flags::empty()).unwrap();
        assert_eq!(check(base + 16, 16), None);
        assert_eq!(check(base + 0x0ff0, 32), Some(BoundsViolation::OutsideDeviceSegment(device)));
        assert_eq!(check(host_addr, 8), Some(BoundsViolation::OutsideDeviceSegment(device)));
    }

    #[test]
    fn forced_spawner_needs_no_default()
    {
        let env = MapEnv::new().with("HOST_DETECT", "trivial");
        let backends = loopback_job(1).into_iter().map(|l| l.into_backend()).collect();
        let conduit = Arc::new(Loopback{default_spawner: None});
        let rt = Runtime::init_forced(Arc::new(env), conduit, backends, "LOOPBACK").unwrap();
        assert_eq!(rt.config().spawner, SpawnerRequest::force("LOOPBACK"));
        assert_eq!(rt.bootstrap().name(), "loopback");
    }

    #[test]
    fn attach_survives_a_bad_team()
    {
        let rt = runtime(MapEnv::new());
        let (client, _, tm) = rt.client_init("test", Flags::empty()).unwrap();

        let bogus = TmHandle::from_raw(0xdead_beef_0000_0002);
        assert!(matches!(rt.segment_attach(bogus, 4096), Err(Error::Handle(..))));
        assert!(matches!(rt.segment_attach(tm, 0), Err(Error::Usage{..})));

        let segment = rt.segment_attach(tm, 4096).unwrap();
        assert_eq!(rt.epidx_to_segment(client, 0).unwrap(), Some(segment));
        assert!(matches!(rt.segment_attach(tm, 4096), Err(Error::Usage{..})));
    }

    #[test]
    fn fini_removes_every_team()
    {
        let rt = runtime(MapEnv::new());
        let (client, ep0, _) = rt.client_init("test", Flags::empty()).unwrap();
        let ep1 = rt.ep_create(client, Capabilities::COLL, Flags::empty()).unwrap();
        let tm1 = rt.tm_create(ep1, 0, 2, Flags::empty()).unwrap();
        let tm2 = rt.tm_create(ep0, 1, 2, Flags::empty()).unwrap();

        rt.fini().unwrap();
        assert!(rt.registry().live::<Team>().is_empty());
        assert!(rt.registry().is_empty());
        assert!(matches!(rt.team(tm1), Err(Error::Handle(..))));
        assert!(matches!(rt.team(tm2), Err(Error::Handle(..))));
    }

    #[test]
    fn fini_releases_everything()
    {
        let rt = runtime(MapEnv::new());
        let (client, _, tm) = rt.client_init("test", Flags::empty()).unwrap();
        rt.ep_create(client, Capabilities::COLL, Flags::empty()).unwrap();
        rt.segment_attach(tm, 4096).unwrap();
        assert!(rt.topology().is_some());

        rt.fini().unwrap();
        assert!(rt.registry().is_empty());
        assert!(rt.segments().is_empty());
        assert!(rt.topology().is_none());
    }
}
