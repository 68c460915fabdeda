use {
    crate::{handle::HandleError, malloc::HeapCorruption},
    std::{io::{self, Write}, process},
    thiserror::Error,
};

/// Result of a runtime operation.
pub type Result<T> =
    std::result::Result<T, Error>;

/// Runtime error.
///
/// Every variant belongs to one [`ErrorClass`].
/// Usage, corruption, and configuration errors are programming
/// or deployment mistakes and are normally passed to [`fatal`].
/// Resource errors may be handed back to the caller.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error
{
    #[error("Invalid call to {operation} {reason}")]
    Usage{operation: &'static str, reason: String},

    #[error("{0}")]
    Resource(String),

    #[error("{0}")]
    Handle(#[from] HandleError),

    #[error("{0}")]
    Heap(#[from] HeapCorruption),

    #[error("Debug malloc memcheck_all (called at {at}) detected an error \
             in the memory ring linkage, most likely as a result of memory corruption.")]
    RingLinkage{at: String},

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Setting(#[from] gex_util::env::Error),

    #[error("Bootstrap failure: {0}")]
    Bootstrap(String),
}

/// Broad category of an [`Error`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass
{
    Usage,
    Resource,
    Corruption,
    Configuration,
}

impl Error
{
    /// Construct a usage error.
    pub fn usage(operation: &'static str, reason: impl Into<String>) -> Self
    {
        Self::Usage{operation, reason: reason.into()}
    }

    /// The category this error belongs to.
    pub fn class(&self) -> ErrorClass
    {
        match self {
            Self::Usage{..}                       => ErrorClass::Usage,
            Self::Handle(HandleError::TmPair)     => ErrorClass::Usage,
            Self::Resource(..) | Self::Bootstrap(..) => ErrorClass::Resource,
            Self::Handle(..) | Self::Heap(..) | Self::RingLinkage{..} =>
                ErrorClass::Corruption,
            Self::Config(..) | Self::Setting(..)  => ErrorClass::Configuration,
        }
    }
}

/// Report `err` and terminate the process.
///
/// The message goes to the log and to standard error,
/// which is flushed before the process aborts.
pub fn fatal(err: &Error) -> !
{
    tracing::error!(class = ?err.class(), "{}", err);

    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "*** FATAL ERROR (proc {}): {}", os_ext::getpid(), err);
    let _ = stderr.flush();

    process::abort()
}

/// Terminate the process instead of returning an error.
pub trait OrFatal<T>
{
    /// Unwrap the value, or call [`fatal`] with the error.
    fn or_fatal(self) -> T;
}

impl<T, E> OrFatal<T> for std::result::Result<T, E>
    where E: Into<Error>
{
    fn or_fatal(self) -> T
    {
        match self {
            Ok(value) => value,
            Err(err)  => fatal(&err.into()),
        }
    }
}
