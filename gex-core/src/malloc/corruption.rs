use {
    serde::Serialize,
    std::{error::Error, fmt, panic::Location},
};

/// Where an allocation or check happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Site
{
    /// A source location.
    Line{file: &'static str, line: u32},

    /// An opaque name, such as the name of a subsystem.
    Named(&'static str),

    /// Nothing is known.
    Unknown,
}

impl Site
{
    /// The source location of the caller.
    #[track_caller]
    pub fn here() -> Self
    {
        let location = Location::caller();
        Self::Line{file: location.file(), line: location.line()}
    }

    /// Whether the site carries a line number.
    pub fn is_line_numbered(&self) -> bool
    {
        matches!(self, Self::Line{..})
    }
}

impl fmt::Display for Site
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Line{file, line} => write!(f, "{}:{}", file, line),
            Self::Named(name)      => write!(f, "{}", name),
            Self::Unknown          => write!(f, "<unknown>"),
        }
    }
}

/// What a block is expected to be when it is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckType
{
    /// A live object.
    Live,

    /// An object that is about to be freed.
    Freeing,

    /// An object found in the ring, which may already be freed.
    Ring,
}

/// Best available explanation of a corrupted block.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptionKind
{
    CheckedFreedMemory,
    DuplicateFree,
    FreedObjectInRing,
    BadPointer,
    SegmentPointer,
    Overflow,
    Underflow,
    WriteAfterFree{offset: usize},
}

impl CorruptionKind
{
    fn diagnosis(self) -> Option<&'static str>
    {
        match self {
            Self::BadPointer     => Some("a bad pointer or local heap corruption"),
            Self::SegmentPointer => Some("a bad pointer, referencing the shared segment (outside malloc heap)"),
            Self::Overflow       => Some("local heap corruption (probable buffer overflow)"),
            Self::Underflow      => Some("local heap corruption (probable buffer underflow)"),
            _ => None,
        }
    }
}

/// Corruption detected by the debug heap.
///
/// The rendered message carries everything that could be recovered
/// about the block, and is meant to be passed to [`fatal`].
///
/// [`fatal`]: `crate::fatal`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapCorruption
{
    pub (super) kind: CorruptionKind,
    pub (super) check: CheckType,
    pub (super) addr: usize,
    pub (super) size: usize,
    pub (super) allocated_at: Option<Site>,
    pub (super) detected_at: Site,
}

impl HeapCorruption
{
    /// The diagnosis.
    pub fn kind(&self) -> CorruptionKind
    {
        self.kind
    }

    /// Address of the payload that was checked.
    pub fn addr(&self) -> usize
    {
        self.addr
    }

    /// Where the block was allocated, if that could be recovered.
    pub fn allocated_at(&self) -> Option<Site>
    {
        self.allocated_at
    }

    /// Where the corruption was noticed.
    pub fn detected_at(&self) -> Site
    {
        self.detected_at
    }

    fn headline(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        if let Some(diagnosis) = self.kind.diagnosis() {
            return match self.check {
                CheckType::Freeing => write!(f, "Debug free detected {}", diagnosis),
                _ => write!(f, "Debug malloc memcheck() detected {}", diagnosis),
            };
        }

        match self.kind {
            CorruptionKind::CheckedFreedMemory =>
                write!(f, "Debug malloc memcheck() called on freed memory \
                           (may indicate local heap corruption)"),
            CorruptionKind::DuplicateFree =>
                write!(f, "Debug free detected a duplicate free() or local heap corruption"),
            CorruptionKind::FreedObjectInRing =>
                write!(f, "Debug malloc found a freed object in the memory ring, \
                           indicating local heap corruption"),
            CorruptionKind::WriteAfterFree{offset} =>
                write!(f, "Debug malloc memcheck() detected a write to freed memory \
                           at object offset: {} bytes", offset),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for HeapCorruption
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        self.headline(f)?;
        write!(f, "\n   ptr={:#x}", self.addr)?;
        if let Some(site) = &self.allocated_at {
            write!(f, " nbytes={}", self.size)?;
            write!(f, "\n   allocated at: {}", site)?;
        }
        match self.check {
            CheckType::Freeing => write!(f, "\n   freed at: {}", self.detected_at),
            _ => write!(f, "\n   detected at: {}", self.detected_at),
        }
    }
}

impl Error for HeapCorruption
{
}
