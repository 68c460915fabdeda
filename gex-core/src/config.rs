//! Settings read when the runtime starts.

use {
    crate::{Error, Result, conduit::Conduit, spawner::SpawnerRequest},
    gex_util::env::Env,
};

/// Default capacity of the endpoint table of a client.
pub const DEFAULT_MAX_EPS: u32 = 32;

/// Settings of the runtime.
///
/// The debug heap reads its own settings, lazily;
/// see [`Settings`][`crate::malloc::Settings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config
{
    /// `HOST_DETECT`, if set.
    pub host_detect: Option<String>,

    /// `SUPERNODE_MAXSIZE`; zero or less means the largest possible.
    pub supernode_maxsize: i64,

    /// `NODEMAP_EXACT`.
    pub nodemap_exact: bool,

    /// `<CONDUIT>_SPAWNER`, or `SPAWN_CONTROL`, or the conduit default.
    pub spawner: SpawnerRequest,

    /// `SPAWN_VERBOSE`.
    pub spawn_verbose: bool,

    /// `QUIET`.
    pub quiet: bool,

    /// `MAXEPS`.
    pub max_eps: u32,

    /// `SWIZZLE_HANDLES`.
    pub swizzle_handles: bool,
}

impl Config
{
    /// Read the settings.
    pub fn from_env(env: &dyn Env, conduit: &dyn Conduit) -> Result<Self>
    {
        Self::read(env, conduit, None)
    }

    /// Read the settings, but use the named spawner.
    ///
    /// The spawner settings and the conduit default are not consulted.
    pub fn from_env_forced(env: &dyn Env, conduit: &dyn Conduit, spawner: &str)
        -> Result<Self>
    {
        Self::read(env, conduit, Some(spawner))
    }

    fn read(env: &dyn Env, conduit: &dyn Conduit, force_spawner: Option<&str>)
        -> Result<Self>
    {
        let max_eps = env.int("MAXEPS", DEFAULT_MAX_EPS.into())?;
        let max_eps = u32::try_from(max_eps).ok()
            .filter(|&n| (1 ..= 1 << 16).contains(&n))
            .ok_or_else(|| Error::Config(format!(
                "MAXEPS={} is out of range (1 to 65536)", max_eps,
            )))?;

        Ok(Self{
            host_detect: env.get("HOST_DETECT"),
            supernode_maxsize: env.int("SUPERNODE_MAXSIZE", 0)?,
            nodemap_exact: env.yes_no("NODEMAP_EXACT", true)?,
            spawner: match force_spawner {
                Some(name) => SpawnerRequest::force(name),
                None => spawner_request(env, conduit)?,
            },
            spawn_verbose: env.yes_no("SPAWN_VERBOSE", false)?,
            quiet: env.yes_no("QUIET", false)?,
            max_eps,
            swizzle_handles: env.yes_no("SWIZZLE_HANDLES", true)?,
        })
    }
}

/// Name of the setting that selects the spawner of `conduit`.
pub fn spawner_key(conduit: &dyn Conduit) -> String
{
    format!("{}_SPAWNER", conduit.name().to_ascii_uppercase())
}

fn spawner_request(env: &dyn Env, conduit: &dyn Conduit) -> Result<SpawnerRequest>
{
    let key = spawner_key(conduit);
    let explicit = env.get(&key);

    let (default, not_set) = match env.get("SPAWN_CONTROL") {
        Some(control) => (Some(control), false),
        None => (conduit.default_spawner().map(str::to_owned), explicit.is_none()),
    };

    match explicit.or(default) {
        Some(name) => Ok(SpawnerRequest{name, not_set}),
        None => Err(Error::Config(format!(
            "{} is not set and the {} conduit has no default spawner",
            key, conduit.name(),
        ))),
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::conduit::Loopback, gex_util::env::MapEnv};

    fn conduit(default_spawner: Option<&'static str>) -> Loopback
    {
        Loopback{default_spawner}
    }

    #[test]
    fn defaults()
    {
        let config = Config::from_env(&MapEnv::new(), &conduit(Some("PMI"))).unwrap();
        assert_eq!(config.host_detect, None);
        assert_eq!(config.supernode_maxsize, 0);
        assert!(config.nodemap_exact);
        assert_eq!(config.spawner, SpawnerRequest{name: "PMI".into(), not_set: true});
        assert!(!config.spawn_verbose);
        assert!(!config.quiet);
        assert_eq!(config.max_eps, DEFAULT_MAX_EPS);
        assert!(config.swizzle_handles);
    }

    #[test]
    fn spawner_precedence()
    {
        let loopback = conduit(Some("PMI"));

        let env = MapEnv::new().with("LOOPBACK_SPAWNER", "ssh").with("SPAWN_CONTROL", "mpi");
        let config = Config::from_env(&env, &loopback).unwrap();
        assert_eq!(config.spawner, SpawnerRequest{name: "ssh".into(), not_set: false});

        let env = MapEnv::new().with("SPAWN_CONTROL", "mpi");
        let config = Config::from_env(&env, &loopback).unwrap();
        assert_eq!(config.spawner, SpawnerRequest{name: "mpi".into(), not_set: false});

        let env = MapEnv::new().with("LOOPBACK_SPAWNER", "PMI");
        let config = Config::from_env(&env, &loopback).unwrap();
        assert_eq!(config.spawner, SpawnerRequest{name: "PMI".into(), not_set: false});
    }

    #[test]
    fn forced_spawner_skips_lookup()
    {
        let config = Config::from_env_forced(&MapEnv::new(), &conduit(None), "LOOPBACK").unwrap();
        assert_eq!(config.spawner, SpawnerRequest::force("LOOPBACK"));

        let env = MapEnv::new().with("LOOPBACK_SPAWNER", "ssh").with("SPAWN_CONTROL", "mpi");
        let config = Config::from_env_forced(&env, &conduit(Some("PMI")), "LOOPBACK").unwrap();
        assert_eq!(config.spawner, SpawnerRequest{name: "LOOPBACK".into(), not_set: false});
    }

    #[test]
    fn no_spawner_at_all()
    {
        assert!(matches!(
            Config::from_env(&MapEnv::new(), &conduit(None)),
            Err(Error::Config(..)),
        ));
        let env = MapEnv::new().with("LOOPBACK_SPAWNER", "ssh");
        assert!(Config::from_env(&env, &conduit(None)).is_ok());
    }

    #[test]
    fn bad_values()
    {
        let loopback = conduit(Some("PMI"));
        let env = MapEnv::new().with("MAXEPS", "0");
        assert!(matches!(Config::from_env(&env, &loopback), Err(Error::Config(..))));
        let env = MapEnv::new().with("NODEMAP_EXACT", "maybe");
        assert!(matches!(Config::from_env(&env, &loopback), Err(Error::Setting(..))));
    }
}
