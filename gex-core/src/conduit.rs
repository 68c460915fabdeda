//! The network layer underneath the object model.
//!
//! Only the hooks that object creation needs are modelled here.

use crate::{
    Result,
    am::AmEntry,
    nodemap::ConduitIds,
    object::{Endpoint, Segment},
};

/// Sizes of the extension regions a conduit wants on each object.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtensionSizes
{
    pub client: usize,
    pub segment: usize,
    pub endpoint: usize,
    pub team: usize,
}

/// A network conduit.
pub trait Conduit: Send + Sync
{
    /// Short name of the conduit, such as `udp`.
    ///
    /// The upper-cased name prefixes the spawner setting.
    fn name(&self) -> &str;

    /// Spawner to use when none is requested.
    fn default_spawner(&self) -> Option<&str>
    {
        None
    }

    /// Handlers registered in the core range of every endpoint.
    fn core_handlers(&self) -> &[AmEntry]
    {
        &[]
    }

    /// Handlers registered in the extended range of every endpoint.
    fn extended_handlers(&self) -> &[AmEntry]
    {
        &[]
    }

    /// Extension regions to allocate with each object.
    fn extension_sizes(&self) -> ExtensionSizes
    {
        ExtensionSizes::default()
    }

    /// Identifiers for host detection, if the conduit has any.
    fn host_ids(&self) -> Option<ConduitIds>
    {
        None
    }

    /// Prepare a new endpoint.
    ///
    /// On failure the endpoint is destroyed.
    fn ep_init(&self, _ep: &Endpoint) -> Result<()>
    {
        Ok(())
    }

    /// Make a segment available to remote processes.
    fn segment_attach(&self, _segment: &Segment) -> Result<()>
    {
        Ok(())
    }

    /// Called before a segment is destroyed.
    fn segment_fini(&self, _segment: &Segment)
    {
    }
}

/// Conduit whose processes only talk to themselves.
#[derive(Clone, Debug, Default)]
pub struct Loopback
{
    /// Spawner to use when none is requested.
    pub default_spawner: Option<&'static str>,
}

static LOOPBACK_CORE: [AmEntry; 1] = [AmEntry{index: 0, handler: ping, nargs: 0, name: "ping"}];

fn ping(_args: &[u32])
{
}

impl Conduit for Loopback
{
    fn name(&self) -> &str
    {
        "loopback"
    }

    fn default_spawner(&self) -> Option<&str>
    {
        self.default_spawner
    }

    fn core_handlers(&self) -> &[AmEntry]
    {
        &LOOPBACK_CORE
    }
}
