//! Bootstrap a job and describe what it looks like.
//!
//! Every rank runs the same sequence:
//! bootstrap, create the client, attach a segment,
//! and record the layout of the job and the state of the heap.

#![warn(missing_docs)]

use {
    anyhow::{Context, Result, bail},
    gex_core::{
        Runtime,
        conduit::Loopback,
        malloc::HeapStats,
        nodemap::Topology,
        object::Flags,
        spawner::{self, Bootstrap, loopback_job},
    },
    gex_util::env::Env,
    serde::Serialize,
    std::{io::Write, sync::Arc, thread},
};

/// Segment size used when `PROBE_SEGMENT` is not set.
pub const DEFAULT_SEGMENT_SIZE: i64 = 64 << 10;

/// What one rank found out.
#[allow(missing_docs)]
#[derive(Clone, Debug, Serialize)]
pub struct Probe
{
    pub rank: u32,
    pub size: u32,
    pub spawner: String,
    pub host_detect: String,
    pub host_id: String,
    pub segment: (usize, usize),
    pub topology: Topology,
    pub heap: HeapStats,
}

/// How to run the probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode
{
    /// Ranks are threads of this process.
    Loopback(u32),

    /// Ranks are processes started by an external spawner.
    Spawned,
}

impl Mode
{
    /// Read `PROBE_RANKS`; zero or unset means [`Spawned`][`Self::Spawned`].
    pub fn from_env(env: &dyn Env) -> Result<Self>
    {
        let ranks = env.int("PROBE_RANKS", 0)?;
        match u32::try_from(ranks) {
            Ok(0) => Ok(Self::Spawned),
            Ok(n) => Ok(Self::Loopback(n)),
            Err(_) => bail!("PROBE_RANKS={} is not a number of ranks", ranks),
        }
    }
}

/// Run the probe on every local rank.
///
/// The heap report of the first local rank is written to `report`.
pub fn run(env: Arc<dyn Env>, mode: Mode, report: &mut (dyn Write + Send)) -> Result<Vec<Probe>>
{
    let segment_size = env.int("PROBE_SEGMENT", DEFAULT_SEGMENT_SIZE)?;
    let segment_size = usize::try_from(segment_size)
        .with_context(|| format!("PROBE_SEGMENT={}", segment_size))?;

    match mode {
        Mode::Spawned => {
            let conduit = Loopback{default_spawner: Some("PMI")};
            let runtime = Runtime::init(env, Arc::new(conduit), spawner::builtin())?;
            Ok(vec![probe(&runtime, segment_size, Some(report))?])
        },

        Mode::Loopback(ranks) => {
            let mut report = Some(report);
            thread::scope(|scope| {
                let threads: Vec<_> = loopback_job(ranks).into_iter()
                    .map(|rank| {
                        let env = env.clone();
                        let report = if rank.rank() == 0 { report.take() } else { None };
                        scope.spawn(move || -> Result<Probe> {
                            let conduit = Arc::new(Loopback{default_spawner: None});
                            let backends = vec![rank.into_backend()];
                            let runtime = Runtime::init_forced(env, conduit, backends, "LOOPBACK")?;
                            probe(&runtime, segment_size, report)
                        })
                    })
                    .collect();

                threads.into_iter()
                    .map(|thread| match thread.join() {
                        Ok(probe) => probe,
                        Err(_) => bail!("a loopback rank panicked"),
                    })
                    .collect()
            })
        },
    }
}

fn probe(runtime: &Runtime, segment_size: usize, report: Option<&mut (dyn Write + Send)>)
    -> Result<Probe>
{
    let (_, _, tm) = runtime.client_init("gex-probe", Flags::empty())?;
    let segment = runtime.segment(runtime.segment_attach(tm, segment_size)?)?;

    let nodemap = runtime.nodemap().context("nodemap released early")?;
    let heap = runtime.heap();
    let probe = Probe{
        rank: runtime.rank(),
        size: runtime.size(),
        spawner: runtime.bootstrap().name().to_owned(),
        host_detect: nodemap.setting().to_owned(),
        host_id: nodemap.id().to_string(),
        segment: (segment.addr(), segment.size()),
        topology: nodemap.topology().clone(),
        heap: heap.stats(),
    };
    tracing::debug!(rank = probe.rank, topology = ?probe.topology, "probed");

    if let Some(report) = report {
        heap.report(report, true)?;
    }

    drop((segment, nodemap));
    runtime.fini()?;
    runtime.bootstrap().barrier()?;
    Ok(probe)
}
