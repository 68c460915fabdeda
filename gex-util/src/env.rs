//! Key-value configuration lookup with defaults.
//!
//! The runtime reads its settings through the [`Env`] trait,
//! so that tests and bootstrap backends can supply their own values.
//! Keys are given without any prefix; [`ProcessEnv`] adds `GEX_`.
//!
//! | Helper        | Accepts                                            |
//! |---------------|----------------------------------------------------|
//! | [`yes_no`]    | `y`, `yes`, `1`, `true`, `on` and their negations  |
//! | [`int`]       | decimal or `0x` hex, optional `K`/`M`/`G`/`T`      |
//! | [`poison`]    | `NAN`, `SNAN`, `QNAN`, or an integer               |
//!
//! [`yes_no`]: `Env::yes_no`
//! [`int`]: `Env::int`
//! [`poison`]: `Env::poison`

use {
    std::{collections::HashMap, env},
    thiserror::Error,
};

/// Result of parsing a setting.
pub type Result<T> =
    std::result::Result<T, Error>;

/// Error parsing a setting.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error
{
    #[error("{key}={value} is not a recognized yes/no value")]
    NotYesNo{key: String, value: String},

    #[error("{key}={value} is not a valid integer")]
    NotInteger{key: String, value: String},
}

/// Signaling NaN bit pattern used as a poison value.
pub const SIGNALING_NAN: u64 = 0x7ff7_ffff_ffff_ffff;

/// Quiet NaN bit pattern used as a poison value.
pub const QUIET_NAN: u64 = 0x7fff_ffff_ffff_ffff;

/// Source of configuration values.
pub trait Env: Send + Sync
{
    /// Look up a raw value.
    fn get(&self, key: &str) -> Option<String>;

    /// Look up a value, falling back to `default`.
    fn get_or(&self, key: &str, default: &str) -> String
    {
        let value = self.get(key);
        tracing::debug!(key, value = ?value, default, "setting lookup");
        value.unwrap_or_else(|| default.to_owned())
    }

    /// Look up a boolean setting.
    fn yes_no(&self, key: &str, default: bool) -> Result<bool>
    {
        let Some(value) = self.get(key)
            else { return Ok(default) };
        parse_yes_no(&value).ok_or_else(||
            Error::NotYesNo{key: key.to_owned(), value})
    }

    /// Look up an integer setting.
    fn int(&self, key: &str, default: i64) -> Result<i64>
    {
        let Some(value) = self.get(key)
            else { return Ok(default) };
        parse_int(&value).ok_or_else(||
            Error::NotInteger{key: key.to_owned(), value})
    }

    /// Look up an 8-byte fill pattern.
    ///
    /// `NAN` and `SNAN` produce [`SIGNALING_NAN`], `QNAN` produces
    /// [`QUIET_NAN`]. Integers no greater than `0xff` are
    /// replicated into every byte of the result.
    fn poison(&self, key: &str, default: &str) -> Result<u64>
    {
        let value = self.get_or(key, default);
        parse_poison(&value).ok_or_else(||
            Error::NotInteger{key: key.to_owned(), value})
    }
}

/// The environment of the process.
///
/// Every key is looked up with a prefix, `GEX_` by default.
#[derive(Clone, Debug)]
pub struct ProcessEnv
{
    prefix: String,
}

impl ProcessEnv
{
    /// Read variables with the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self
    {
        Self{prefix: prefix.into()}
    }
}

impl Default for ProcessEnv
{
    fn default() -> Self
    {
        Self::with_prefix("GEX_")
    }
}

impl Env for ProcessEnv
{
    fn get(&self, key: &str) -> Option<String>
    {
        env::var(format!("{}{}", self.prefix, key)).ok()
    }
}

/// Settings held in memory.
#[derive(Clone, Debug, Default)]
pub struct MapEnv
{
    vars: HashMap<String, String>,
}

impl MapEnv
{
    /// Create an empty set of settings.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add a setting, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>)
        -> &mut Self
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`set`][`Self::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>)
        -> Self
    {
        self.set(key, value);
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
    where K: Into<String>, V: Into<String>
{
    fn from_iter<I>(iter: I) -> Self
        where I: IntoIterator<Item = (K, V)>
    {
        let vars = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self{vars}
    }
}

impl Env for MapEnv
{
    fn get(&self, key: &str) -> Option<String>
    {
        self.vars.get(key).cloned()
    }
}

/// Parse a yes/no value.
pub fn parse_yes_no(value: &str) -> Option<bool>
{
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "1" | "true"  | "on"  => Some(true),
        "n" | "no"  | "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer with an optional binary multiplier suffix.
pub fn parse_int(value: &str) -> Option<i64>
{
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None       => (false, value),
    };

    let (digits, shift) = match value.as_bytes().last()?.to_ascii_uppercase() {
        b'K' => (&value[.. value.len() - 1], 10),
        b'M' => (&value[.. value.len() - 1], 20),
        b'G' => (&value[.. value.len() - 1], 30),
        b'T' => (&value[.. value.len() - 1], 40),
        _    => (value, 0),
    };

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None      => digits.parse::<i64>().ok()?,
    };
    let magnitude = magnitude.checked_mul(1i64 << shift)?;

    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a poison value.
pub fn parse_poison(value: &str) -> Option<u64>
{
    let token: String = value.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match token.as_str() {
        "NAN" | "SNAN" => return Some(SIGNALING_NAN),
        "QNAN"         => return Some(QUIET_NAN),
        _              => (),
    }

    let value = match token.strip_prefix("0X") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None      => token.parse::<u64>().ok()?,
    };

    if value <= 0xff {
        Some(u64::from_ne_bytes([value as u8; 8]))
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    #[test]
    fn yes_no_values()
    {
        let env = MapEnv::new()
            .with("A", "Yes")
            .with("B", "off")
            .with("C", "maybe");
        assert_eq!(env.yes_no("A", false), Ok(true));
        assert_eq!(env.yes_no("B", true), Ok(false));
        assert_eq!(env.yes_no("MISSING", true), Ok(true));
        assert!(matches!(env.yes_no("C", true), Err(Error::NotYesNo{..})));
    }

    #[test]
    fn int_suffixes()
    {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" 0x10 "), Some(16));
        assert_eq!(parse_int("4K"), Some(4096));
        assert_eq!(parse_int("2m"), Some(2 << 20));
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("twelve"), None);
    }

    #[test]
    fn poison_tokens()
    {
        assert_eq!(parse_poison("nan"), Some(SIGNALING_NAN));
        assert_eq!(parse_poison(" s n a n "), Some(SIGNALING_NAN));
        assert_eq!(parse_poison("QNaN"), Some(QUIET_NAN));
        assert_eq!(parse_poison("0"), Some(0));
        assert_eq!(parse_poison("0xAB"), Some(0xabab_abab_abab_abab));
        assert_eq!(parse_poison("256"), Some(256));
        assert_eq!(parse_poison("garbage"), None);
    }

    #[test]
    fn env_poison_uses_default()
    {
        let env = MapEnv::new();
        assert_eq!(env.poison("MALLOC_INITVAL", "NAN"), Ok(SIGNALING_NAN));
    }

    proptest!
    {
        #[test]
        fn small_poison_replicates_byte(byte: u8)
        {
            let value = parse_poison(&byte.to_string()).unwrap();
            assert!(value.to_ne_bytes().iter().all(|&b| b == byte));
        }

        #[test]
        fn int_round_trips(value in -1_000_000_000i64 .. 1_000_000_000)
        {
            assert_eq!(parse_int(&value.to_string()), Some(value));
        }
    }
}
