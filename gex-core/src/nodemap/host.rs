use {
    crate::{Error, Result},
    gex_util::hash::{fnv1a_64, fold_32},
    std::{fmt, str::FromStr, time::Duration},
};

/// Attempts at gethostid(3) before falling back to the hostname.
pub const GETHOSTID_RETRIES: u32 = 24;

/// How processes on the same host are recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostDetect
{
    /// Identifiers supplied by the conduit.
    Conduit,

    /// The host identifier of the operating system.
    Gethostid,

    /// A hash of the hostname.
    Hostname,

    /// Every process is on a host of its own.
    Trivial,
}

impl FromStr for HostDetect
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        let all = [Self::Conduit, Self::Gethostid, Self::Hostname, Self::Trivial];
        all.into_iter()
            .find(|detect| detect.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("HOST_DETECT='{}' is not recognized", s)))
    }
}

impl fmt::Display for HostDetect
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(match self {
            Self::Conduit   => "conduit",
            Self::Gethostid => "gethostid",
            Self::Hostname  => "hostname",
            Self::Trivial   => "trivial",
        })
    }
}

/// Identifier of this host, as chosen by a [`HostDetect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostId
{
    /// Opaque identifier from the conduit.
    Conduit,

    /// Host identifier, possibly derived from the hostname.
    Gethostid(u32),

    /// Hostname and its hash.
    Hostname{name: String, hash: u64},

    /// Rank of this process.
    Trivial(u32),
}

impl HostId
{
    /// The bytes compared between processes.
    pub fn key(&self) -> Vec<u8>
    {
        match self {
            Self::Conduit => Vec::new(),
            Self::Gethostid(id) => id.to_ne_bytes().to_vec(),
            Self::Hostname{hash, ..} => hash.to_ne_bytes().to_vec(),
            Self::Trivial(rank) => rank.to_ne_bytes().to_vec(),
        }
    }
}

impl fmt::Display for HostId
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Conduit => write!(f, "[opaque conduit-specific value]"),
            Self::Gethostid(id) => write!(f, "{:#010x}", id),
            Self::Hostname{name, hash} => write!(f, "'{}' (hashed to {:#x})", name, hash),
            Self::Trivial(rank) => write!(f, "{}", rank),
        }
    }
}

/// Whether a host identifier is clearly not unique to the host.
///
/// These are all zeros, all ones, and every byte order of 127.0.0.1.
pub fn is_bogus_hostid(id: u32) -> bool
{
    const LOOPBACK: [u32; 12] = [
        0x7f00_0001, 0x7f00_0100, 0x7f01_0000,
        0x007f_0001, 0x007f_0100, 0x017f_0000,
        0x0000_7f01, 0x0001_7f00, 0x0100_7f00,
        0x0000_017f, 0x0001_007f, 0x0100_007f,
    ];
    id == 0 || id == !0 || LOOPBACK.contains(&id)
}

/// The hostname and its 64-bit hash.
pub fn hosthash() -> Result<(String, u64)>
{
    let name = os_ext::gethostname()
        .map_err(|err| Error::Resource(format!("gethostname: {}", err)))?;
    let name = name.to_string_lossy().into_owned();
    let hash = fnv1a_64(name.as_bytes());
    Ok((name, hash))
}

/// Identifier of this host from gethostid(3).
///
/// Bogus identifiers are retried with growing delays,
/// after which the folded hostname hash is used instead.
pub fn gethostid() -> Result<u32>
{
    gethostid_with(os_ext::gethostid, || Ok(hosthash()?.1))
}

fn gethostid_with<F, G>(mut source: F, fallback: G) -> Result<u32>
    where F: FnMut() -> u32, G: FnOnce() -> Result<u64>
{
    let mut delay = Duration::from_nanos(1);
    let mut id = source();
    for _ in 0 .. GETHOSTID_RETRIES {
        if !is_bogus_hostid(id) {
            return Ok(id);
        }
        tracing::trace!("Retrying after invalid return {:#010x} from gethostid()", id);
        os_ext::nanosleep(delay)
            .map_err(|err| Error::Resource(format!("nanosleep: {}", err)))?;
        delay *= 2;
        id = source();
    }
    if !is_bogus_hostid(id) {
        return Ok(id);
    }

    tracing::warn!(
        "Invalid return {:#010x} from gethostid(). \
         Please consider setting HOST_DETECT to 'hostname'.",
        id,
    );
    Ok(fold_32(fallback()?))
}

#[cfg(test)]
mod tests
{
    use {super::*, std::cell::Cell};

    #[test]
    fn parse_names()
    {
        assert_eq!("HostName".parse::<HostDetect>().unwrap(), HostDetect::Hostname);
        assert_eq!("trivial".parse::<HostDetect>().unwrap(), HostDetect::Trivial);
        assert_eq!(
            "dns".parse::<HostDetect>().unwrap_err().to_string(),
            "HOST_DETECT='dns' is not recognized",
        );
    }

    #[test]
    fn descriptions()
    {
        assert_eq!(HostId::Conduit.to_string(), "[opaque conduit-specific value]");
        assert_eq!(HostId::Gethostid(0xabc).to_string(), "0x00000abc");
        let hostname = HostId::Hostname{name: "n1".into(), hash: 0xff};
        assert_eq!(hostname.to_string(), "'n1' (hashed to 0xff)");
        assert_eq!(HostId::Trivial(7).to_string(), "7");
    }

    #[test]
    fn bogus_ids()
    {
        assert!(is_bogus_hostid(0));
        assert!(is_bogus_hostid(0xffff_ffff));
        assert!(is_bogus_hostid(0x0100_007f));
        assert!(is_bogus_hostid(0x7f01_0000));
        assert!(!is_bogus_hostid(0x7f00_0002));
        assert!(!is_bogus_hostid(0x1234_5678));
    }

    #[test]
    fn transient_bogus_id_is_retried()
    {
        let calls = Cell::new(0);
        let id = gethostid_with(
            || { calls.set(calls.get() + 1); if calls.get() < 4 { 0 } else { 0xa0b0 } },
            || panic!("fell back"),
        );
        assert_eq!(id.unwrap(), 0xa0b0);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn persistent_bogus_id_falls_back()
    {
        let calls = Cell::new(0);
        let id = gethostid_with(
            || { calls.set(calls.get() + 1); 0x7f00_0001 },
            || Ok(0x0000_0001_0000_0003),
        );
        assert_eq!(id.unwrap(), 2);
        assert_eq!(calls.get(), GETHOSTID_RETRIES + 1);
    }

    #[test]
    fn hostname_hash_is_fnv()
    {
        let (name, hash) = hosthash().unwrap();
        assert_eq!(hash, fnv1a_64(name.as_bytes()));
    }
}
