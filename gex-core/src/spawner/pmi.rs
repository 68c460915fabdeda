use {
    super::Bootstrap,
    crate::{Error, Result},
    gex_util::env::Env,
};

/// PMI bootstrap for a job of one process.
///
/// A process started without a process manager,
/// or by one that reports a job of size one,
/// needs no communication to bootstrap.
#[derive(Debug)]
pub struct PmiSingleton
{
    rank: u32,
}

impl PmiSingleton
{
    /// Inspect the `PMI_SIZE` and `PMI_RANK` variables.
    ///
    /// Returns [`None`] for a job of more than one process.
    pub fn from_env(env: &dyn Env) -> Result<Option<Self>>
    {
        let size = env.int("PMI_SIZE", 1)?;
        let rank = env.int("PMI_RANK", 0)?;
        if size != 1 {
            tracing::debug!(size, "PMI job is not a singleton");
            return Ok(None);
        }
        if rank != 0 {
            return Err(Error::Bootstrap(format!("PMI rank {} in a job of size 1", rank)));
        }
        Ok(Some(Self{rank: 0}))
    }
}

impl Bootstrap for PmiSingleton
{
    fn name(&self) -> &str
    {
        "pmi"
    }

    fn rank(&self) -> u32
    {
        self.rank
    }

    fn size(&self) -> u32
    {
        1
    }

    fn exchange(&self, send: &[u8], recv: &mut [u8]) -> Result<()>
    {
        if recv.len() != send.len() {
            return Err(Error::Bootstrap(format!(
                "exchange of {} bytes into {} bytes", send.len(), recv.len(),
            )));
        }
        recv.copy_from_slice(send);
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, gex_util::env::MapEnv};

    #[test]
    fn singleton()
    {
        let pmi = PmiSingleton::from_env(&MapEnv::new()).unwrap().unwrap();
        assert_eq!((pmi.rank(), pmi.size()), (0, 1));
        let mut recv = [0; 2];
        pmi.exchange(&[4, 5], &mut recv).unwrap();
        assert_eq!(recv, [4, 5]);
    }

    #[test]
    fn larger_job_declines()
    {
        let env = MapEnv::new().with("PMI_SIZE", "4").with("PMI_RANK", "2");
        assert!(PmiSingleton::from_env(&env).unwrap().is_none());
    }

    #[test]
    fn bad_rank()
    {
        let env = MapEnv::new().with("PMI_RANK", "3");
        assert!(PmiSingleton::from_env(&env).is_err());
    }
}
