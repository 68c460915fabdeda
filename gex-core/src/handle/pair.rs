use super::{HandleError, TmHandle};

/// Pair of endpoint indices standing in for a team.
///
/// A pair names the local endpoint and a remote endpoint index,
/// and is passed wherever a [`TmHandle`] is accepted.
/// It has no backing object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TmPair
{
    /// Index of the local endpoint.
    pub local: u16,

    /// Index of the remote endpoint.
    pub remote: u16,
}

impl TmPair
{
    /// Encode the pair as a team handle.
    pub fn export(self) -> TmHandle
    {
        let raw = (u64::from(self.remote) << 17) | (u64::from(self.local) << 1) | 1;
        TmHandle::from_raw(raw)
    }

    /// Decode a team handle that carries a pair.
    pub fn import(handle: TmHandle) -> Result<Self, HandleError>
    {
        let raw = handle.into_raw();
        if !is_pair(raw) || raw >> 33 != 0 {
            return Err(HandleError::NotTmPair{raw});
        }
        Ok(Self{
            local:  ((raw >> 1) & 0xffff) as u16,
            remote: ((raw >> 17) & 0xffff) as u16,
        })
    }
}

/// Whether an exported team value carries a pair.
pub fn is_pair(raw: u64) -> bool
{
    raw & 1 == 1
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    proptest!
    {
        #[test]
        fn pair_round_trip(local: u16, remote: u16)
        {
            let pair = TmPair{local, remote};
            let handle = pair.export();
            assert!(is_pair(handle.into_raw()));
            assert_eq!(TmPair::import(handle), Ok(pair));
        }
    }

    #[test]
    fn plain_handle_is_not_pair()
    {
        let handle = TmHandle::from_raw(0x8000_0001_0000_0004);
        assert!(matches!(TmPair::import(handle), Err(HandleError::NotTmPair{..})));
    }
}
