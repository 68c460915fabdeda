//! Choosing how the job was launched.
//!
//! A spawner backend knows how to find the other processes of the job
//! and provides the collective operations used during bootstrap.
//! Backends are tried in a fixed order;
//! see [`select`] for the rules.

pub use self::loopback::*;
#[cfg(feature = "pmi-spawner")]
pub use self::pmi::*;

use {
    crate::{Error, Result},
    std::fmt,
};

mod loopback;
#[cfg(feature = "pmi-spawner")]
mod pmi;

/// Collective operations available during bootstrap.
pub trait Bootstrap: Send + Sync
{
    /// Name of the backend, for diagnostics.
    fn name(&self) -> &str;

    /// Rank of this process.
    fn rank(&self) -> u32;

    /// Number of processes in the job.
    fn size(&self) -> u32;

    /// Gather `send` from every process into `recv`, ordered by rank.
    ///
    /// `recv` must be `size` times as long as `send`,
    /// and every process must send the same number of bytes.
    fn exchange(&self, send: &[u8], recv: &mut [u8]) -> Result<()>;

    /// Copy `send` of process `root` into `recv` of every process.
    ///
    /// Only the contents of `send` at the root matter,
    /// but it must be as long as `recv` everywhere.
    fn broadcast(&self, send: &[u8], recv: &mut [u8], root: u32) -> Result<()>
    {
        let len = recv.len();
        if send.len() != len || root >= self.size() {
            return Err(Error::Bootstrap(format!(
                "broadcast of {} bytes into {} bytes from root {} of {}",
                send.len(), len, root, self.size(),
            )));
        }
        let mut all = vec![0; len * self.size() as usize];
        self.exchange(send, &mut all)?;
        let start = root as usize * len;
        recv.copy_from_slice(&all[start .. start + len]);
        Ok(())
    }

    /// Wait until every process gets here.
    fn barrier(&self) -> Result<()>
    {
        let mut all = vec![0; self.size() as usize];
        self.exchange(&[0], &mut all)
    }
}

/// Function that attempts to start a backend.
///
/// Returns [`None`] when the job was not launched this way.
/// Errors are fatal to bootstrap.
pub type InitFn =
    Box<dyn FnOnce() -> Result<Option<Box<dyn Bootstrap>>> + Send>;

/// Spawner backend known to this build.
pub struct Backend
{
    name: &'static str,
    init: Option<InitFn>,
    try_when_unset: bool,
}

impl Backend
{
    /// A backend that is compiled in.
    ///
    /// With `try_when_unset`, the backend is also tried
    /// when no spawner was requested at all.
    pub fn enabled<F>(name: &'static str, try_when_unset: bool, init: F) -> Self
        where F: FnOnce() -> Result<Option<Box<dyn Bootstrap>>> + Send + 'static
    {
        Self{name, init: Some(Box::new(init)), try_when_unset}
    }

    /// A backend that is known but not compiled in.
    pub fn disabled(name: &'static str, try_when_unset: bool) -> Self
    {
        Self{name, init: None, try_when_unset}
    }

    /// The name requests are matched against.
    pub fn name(&self) -> &'static str
    {
        self.name
    }

    /// Whether the backend is compiled in.
    pub fn is_enabled(&self) -> bool
    {
        self.init.is_some()
    }
}

impl fmt::Debug for Backend
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("try_when_unset", &self.try_when_unset)
            .finish()
    }
}

/// The backends of this build, in priority order.
pub fn builtin() -> Vec<Backend>
{
    vec![
        Backend::disabled("MPI", true),
        Backend::disabled("SSH", false),
        pmi_backend(),
    ]
}

#[cfg(feature = "pmi-spawner")]
fn pmi_backend() -> Backend
{
    Backend::enabled("PMI", true, || {
        let env = gex_util::env::ProcessEnv::with_prefix("");
        Ok(PmiSingleton::from_env(&env)?.map(|pmi| Box::new(pmi) as Box<dyn Bootstrap>))
    })
}

#[cfg(not(feature = "pmi-spawner"))]
fn pmi_backend() -> Backend
{
    Backend::disabled("PMI", true)
}

/// Which spawner to use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnerRequest
{
    /// Name of the requested or default spawner.
    pub name: String,

    /// Whether nobody asked for a spawner,
    /// so that `name` is only the built-in default.
    pub not_set: bool,
}

impl SpawnerRequest
{
    /// Request a spawner by name, regardless of any setting.
    pub fn force(name: impl Into<String>) -> Self
    {
        Self{name: name.into(), not_set: false}
    }
}

/// Start the first suitable backend.
///
/// Backends are visited in order.
/// A backend is tried if its name matches the request (ignoring case),
/// or if no spawner was requested and the backend is
/// [tried when unset][`Backend::enabled`].
/// A backend that is tried while a request is in effect
/// must match it; the first one that starts wins.
///
/// If none starts, the error says why:
/// the requested backend failed, is not compiled in, is unknown,
/// or nothing was requested and nothing could start.
pub fn select(request: &SpawnerRequest, backends: Vec<Backend>)
    -> Result<Box<dyn Bootstrap>>
{
    let mut enabled = 0;
    let mut disabled = 0;

    for backend in backends {
        let matches = backend.name.eq_ignore_ascii_case(&request.name);
        let attempt = if backend.try_when_unset {
            request.not_set || matches
        } else {
            matches && !request.not_set
        };

        let Some(init) = backend.init else {
            disabled += matches as u32;
            continue;
        };
        enabled += matches as u32;

        if attempt {
            tracing::debug!(spawner = backend.name, "trying spawner");
            if let Some(bootstrap) = init()? {
                tracing::debug!(
                    spawner = backend.name,
                    rank = bootstrap.rank(),
                    size = bootstrap.size(),
                    "spawner initialized",
                );
                return Ok(bootstrap);
            }
        }
    }

    let name = &request.name;
    Err(Error::Config(if enabled > 0 {
        format!("Requested spawner \"{}\" failed to initialize", name)
    } else if disabled > 0 {
        format!("Requested spawner \"{}\" is known, but not enabled in this build", name)
    } else if !request.not_set {
        format!("Requested spawner \"{}\" is unknown", name)
    } else {
        "No supported spawner was able to initialize the job".to_owned()
    }))
}
