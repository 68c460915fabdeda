use {
    crate::Result,
    gex_util::env::{Env, SIGNALING_NAN},
    smallvec::SmallVec,
};

/// Behavior switches of the debug heap.
///
/// | Setting             | Effect                                          |
/// |---------------------|-------------------------------------------------|
/// | `MALLOC_INIT`       | fill new blocks with `MALLOC_INITVAL`           |
/// | `MALLOC_CLOBBER`    | fill freed blocks with `MALLOC_CLOBBERVAL`      |
/// | `MALLOC_LEAKALL`    | never return freed blocks to the system         |
/// | `MALLOC_SCANFREED`  | keep freed blocks in the ring and rescan them   |
/// | `MALLOC_EXTRACHECK` | check the whole ring on every operation         |
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings
{
    pub init: bool,
    pub init_value: u64,
    pub clobber: bool,
    pub clobber_value: u64,
    pub leak_all: bool,
    pub scan_freed: bool,
    pub extra_check: bool,

    /// Suppress advisory warnings.
    pub quiet: bool,
}

impl Default for Settings
{
    fn default() -> Self
    {
        Self{
            init: false,
            init_value: SIGNALING_NAN,
            clobber: false,
            clobber_value: SIGNALING_NAN,
            leak_all: false,
            scan_freed: false,
            extra_check: false,
            quiet: false,
        }
    }
}

impl Settings
{
    /// Read the settings.
    ///
    /// Dependent settings are not yet enabled;
    /// see [`resolve_dependencies`][`Self::resolve_dependencies`].
    pub fn from_env(env: &dyn Env) -> Result<Self>
    {
        Ok(Self{
            init:          env.yes_no("MALLOC_INIT", false)?,
            init_value:    env.poison("MALLOC_INITVAL", "NAN")?,
            clobber:       env.yes_no("MALLOC_CLOBBER", false)?,
            clobber_value: env.poison("MALLOC_CLOBBERVAL", "NAN")?,
            leak_all:      env.yes_no("MALLOC_LEAKALL", false)?,
            scan_freed:    env.yes_no("MALLOC_SCANFREED", false)?,
            extra_check:   env.yes_no("MALLOC_EXTRACHECK", false)?,
            quiet:         env.yes_no("QUIET", false)?,
        })
    }

    /// Enable the settings that scanning freed memory relies on.
    ///
    /// Returns a warning for each setting that was switched on.
    pub fn resolve_dependencies(&mut self) -> SmallVec<[&'static str; 2]>
    {
        let mut warnings = SmallVec::new();
        if self.scan_freed && !self.clobber {
            self.clobber = true;
            warnings.push("MALLOC_SCANFREED requires MALLOC_CLOBBER: enabling it.");
        }
        if self.scan_freed && !self.leak_all {
            self.leak_all = true;
            warnings.push("MALLOC_SCANFREED requires MALLOC_LEAKALL: enabling it.");
        }
        warnings
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, gex_util::env::{MapEnv, QUIET_NAN}};

    #[test]
    fn defaults()
    {
        let settings = Settings::from_env(&MapEnv::new()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn reads_values()
    {
        let env = MapEnv::new()
            .with("MALLOC_INIT", "yes")
            .with("MALLOC_INITVAL", "qnan")
            .with("MALLOC_CLOBBERVAL", "0x5a");
        let settings = Settings::from_env(&env).unwrap();
        assert!(settings.init);
        assert_eq!(settings.init_value, QUIET_NAN);
        assert_eq!(settings.clobber_value, 0x5a5a_5a5a_5a5a_5a5a);
    }

    #[test]
    fn scan_freed_enables_dependencies()
    {
        let mut settings = Settings{scan_freed: true, ..Settings::default()};
        let warnings = settings.resolve_dependencies();
        assert!(settings.clobber && settings.leak_all);
        assert_eq!(warnings.len(), 2);
        assert!(settings.resolve_dependencies().is_empty());
    }
}
