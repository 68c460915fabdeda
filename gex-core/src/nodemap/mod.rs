//! Which processes share a host.
//!
//! Every process contributes a key that identifies its host.
//! After the keys are exchanged, every process builds the same
//! nodemap: each rank maps to the lowest rank with an equal key.
//! Hosts are then split into supernodes of bounded size;
//! see [`parse`].

pub use self::{build::*, host::*, parse::*};

use crate::{Error, Result, config::Config, spawner::Bootstrap};

mod build;
mod host;
mod parse;

/// Host identifiers supplied by a conduit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConduitIds
{
    /// The identifier of this process, to be exchanged.
    Local(Vec<u8>),

    /// The identifiers of all processes, `sz` bytes each,
    /// `stride` bytes apart. They need not be equal across processes,
    /// as long as they lead to the same nodemap.
    Vector{bytes: Vec<u8>, sz: usize, stride: usize},
}

/// Result of host detection.
#[derive(Debug)]
pub struct Nodemap
{
    detect: HostDetect,
    setting: String,
    id: HostId,
    topology: Topology,
}

impl Nodemap
{
    /// Determine the layout of the job, collectively.
    ///
    /// Without a bootstrap, the only methods available are
    /// [`Conduit`][`HostDetect::Conduit`] with a full vector
    /// of identifiers, and [`Trivial`][`HostDetect::Trivial`].
    pub fn init(
        config: &Config,
        conduit: &str,
        bootstrap: Option<&dyn Bootstrap>,
        ids: Option<ConduitIds>,
        rank: u32,
        size: u32,
    ) -> Result<Self>
    {
        if rank >= size {
            return Err(Error::usage("nodemap construction", format!(
                "for rank {} of a job of size {}", rank, size,
            )));
        }

        let setting = config.host_detect.clone().unwrap_or_else(|| {
            let default = if ids.is_some() { HostDetect::Conduit } else { HostDetect::Gethostid };
            default.to_string()
        });
        let detect: HostDetect = setting.parse()?;

        let unsupported = || Error::Config(format!(
            "This conduit ({}) does not support HOST_DETECT='{}'", conduit, setting,
        ));
        let exact = config.nodemap_exact;
        let n = size as usize;

        let (id, nodemap) = match detect {
            HostDetect::Trivial => (HostId::Trivial(rank), (0 .. size).collect::<Vec<_>>()),
            HostDetect::Conduit => match ids {
                None => return Err(unsupported()),
                Some(ConduitIds::Vector{bytes, sz, stride}) => {
                    let keys = Keys::new(&bytes, n, sz, stride)?;
                    (HostId::Conduit, build(&keys, exact))
                },
                Some(ConduitIds::Local(local)) => {
                    let bootstrap = bootstrap.ok_or_else(unsupported)?;
                    (HostId::Conduit, exchange_and_build(bootstrap, &local, n, exact)?)
                },
            },
            HostDetect::Gethostid | HostDetect::Hostname => {
                let id = match detect {
                    HostDetect::Gethostid => HostId::Gethostid(gethostid()?),
                    _ => {
                        let (name, hash) = hosthash()?;
                        HostId::Hostname{name, hash}
                    },
                };
                let bootstrap = bootstrap.ok_or_else(unsupported)?;
                let nodemap = exchange_and_build(bootstrap, &id.key(), n, exact)?;
                (id, nodemap)
            },
        };

        tracing::debug!("HOST_DETECT={} yields {}", setting, id);

        let pshm = cfg!(feature = "pshm");
        let limit = supernode_limit(config.supernode_maxsize, pshm)?;
        let topology = parse(nodemap, rank, limit);

        if !pshm && rank == 0 && !config.quiet && size != topology.host.grp_count {
            tracing::warn!(
                "Running with multiple processes per host \
                 without shared-memory communication support. \
                 This can significantly reduce performance.",
            );
        }

        Ok(Self{detect, setting, id, topology})
    }

    /// The method used to detect hosts.
    pub fn detect(&self) -> HostDetect
    {
        self.detect
    }

    /// The `HOST_DETECT` value in effect, as written.
    pub fn setting(&self) -> &str
    {
        &self.setting
    }

    /// The identifier of this host.
    pub fn id(&self) -> &HostId
    {
        &self.id
    }

    /// The layout of the job.
    pub fn topology(&self) -> &Topology
    {
        &self.topology
    }

    /// Release the nodemap.
    pub fn fini(self)
    {
        tracing::trace!(size = self.topology.size(), "releasing nodemap");
    }
}

fn exchange_and_build(bootstrap: &dyn Bootstrap, local: &[u8], size: usize, exact: bool)
    -> Result<Vec<u32>>
{
    let sz = local.len();
    let mut all = vec![0; sz * size];
    bootstrap.exchange(local, &mut all)?;
    let keys = Keys::new(&all, size, sz, sz)?;
    Ok(build(&keys, exact))
}
