use {
    super::{DebugHeap, EXTRA_SIZE, LEAKMARK, Site, header},
    crate::Result,
    serde::Serialize,
    std::{env, io::{self, Write}, sync::{Mutex, PoisonError}},
};

/// Counters of the debug heap.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats
{
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub live_bytes: u64,
    pub live_bytes_max: u64,
    pub allocated_objects: u64,
    pub freed_objects: u64,
    pub live_objects: u64,
    pub live_objects_max: u64,

    /// Lower bound on bytes used beyond the live payloads.
    pub overhead_bytes: u64,
}

/// Serializes writers of heap reports.
static REPORT_LOCK: Mutex<()> = Mutex::new(());

impl DebugHeap
{
    /// Snapshot of the counters.
    pub fn stats(&self) -> HeapStats
    {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let live_bytes = state.live_bytes();
        HeapStats{
            allocated_bytes:   state.allocated_bytes,
            freed_bytes:       state.freed_bytes,
            live_bytes,
            live_bytes_max:    state.max_live_bytes,
            allocated_objects: state.allocated_objects,
            freed_objects:     state.freed_objects,
            live_objects:      state.live_objects(),
            live_objects_max:  state.max_live_objects,
            overhead_bytes:    state.ring_bytes.saturating_sub(live_bytes)
                             + state.ring_objects * EXTRA_SIZE as u64,
        }
    }

    /// Write one line per block in the ring.
    ///
    /// Blocks marked with [`leak`][`Self::leak`] are flagged with `*`.
    pub fn dump_live(&self, out: &mut dyn Write) -> io::Result<()>
    {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for desc in state.ring.iter() {
            // SAFETY: Blocks in the ring are still allocated.
            let leaked = unsafe { header(desc.addr).add(1).read() } == LEAKMARK;
            writeln!(out, "   {:10} {}   {}", desc.size, if leaked { '*' } else { ' ' }, desc.site)?;
        }
        Ok(())
    }

    /// Write the heap report.
    ///
    /// The ring is checked before the live objects are listed,
    /// so a corrupted ring is reported instead of being walked.
    pub fn report(&self, out: &mut dyn Write, show_live: bool) -> Result<()>
    {
        let _lock = REPORT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let stats = self.stats();
        let identity = *self.identity.read().unwrap_or_else(PoisonError::into_inner);
        let date = chrono::Local::now().format("%a %b %e %H:%M:%S %Y");
        let host = os_ext::gethostname()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unknown>".to_owned());

        let write_err = |err: io::Error| crate::Error::Resource(format!("writing heap report: {}", err));

        (|| -> io::Result<()> {
            writeln!(out, "# GEX Debug Mallocator Report")?;
            writeln!(out, "#")?;
            writeln!(out, "# program: {}", program_name())?;
            writeln!(out, "# date:    {}", date)?;
            writeln!(out, "# host:    {}", host)?;
            writeln!(out, "# pid:     {}", os_ext::getpid())?;
            writeln!(out, "# node:    {} / {}", identity.rank, identity.size)?;
            writeln!(out, "#")?;
            writeln!(out, "# Private memory utilization:")?;
            writeln!(out, "# ---------------------------")?;
            writeln!(out, "#")?;
            writeln!(out, "# malloc() space total:        {:10} bytes, in {:10} objects",
                     stats.allocated_bytes, stats.allocated_objects)?;
            writeln!(out, "# malloc() space in-use:       {:10} bytes, in {:10} objects",
                     stats.live_bytes, stats.live_objects)?;
            writeln!(out, "# malloc() space freed:        {:10} bytes, in {:10} objects",
                     stats.freed_bytes, stats.freed_objects)?;
            writeln!(out, "# malloc() space peak usage:   {:10} bytes,    {:10} objects",
                     stats.live_bytes_max, stats.live_objects_max)?;
            writeln!(out, "# malloc() system overhead: >= {:10} bytes", stats.overhead_bytes)?;
            writeln!(out, "#")?;
            Ok(())
        })().map_err(write_err)?;

        self.check_all(Site::Named("heap report"))?;

        if show_live {
            (|| -> io::Result<()> {
                writeln!(out, "# Live objects")?;
                writeln!(out, "# ------------")?;
                writeln!(out, "#")?;
                writeln!(out, "# Table below shows objects allocated, but not freed.")?;
                writeln!(out, "# Permanent runtime data structures are not freed before exit.")?;
                writeln!(out, "# An asterisk (*) following the size identifies these allocations.")?;
                writeln!(out, "#")?;
                writeln!(out, "# Object size     Location Allocated")?;
                writeln!(out, "# ==================================")?;
                self.dump_live(&mut *out)
            })().map_err(write_err)?;
        }

        Ok(())
    }
}

fn program_name() -> String
{
    env::args().next()
        .unwrap_or_else(|| "<unknown>".to_owned())
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::malloc::Settings};

    #[test]
    fn stats_track_peaks()
    {
        let heap = DebugHeap::with_settings(Settings::default());
        let a = heap.malloc(100, Site::here()).unwrap();
        let b = heap.malloc(50, Site::here()).unwrap();
        heap.free(a, Site::here()).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.allocated_bytes, 150);
        assert_eq!(stats.live_bytes, 50);
        assert_eq!(stats.live_bytes_max, 150);
        assert_eq!(stats.live_objects_max, 2);
        assert_eq!(stats.overhead_bytes, EXTRA_SIZE as u64);

        heap.free(b, Site::here()).unwrap();
    }

    #[test]
    fn report_layout()
    {
        let heap = DebugHeap::with_settings(Settings::default());
        heap.set_identity(3, 8);
        let _a = heap.malloc(12, Site::Named("nodemap")).unwrap();

        let mut out = Vec::new();
        heap.report(&mut out, true).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("# GEX Debug Mallocator Report\n#\n# program: "));
        assert!(out.contains("# node:    3 / 8\n"));
        assert!(out.contains("# malloc() space in-use:               12 bytes, in          1 objects\n"));
        assert!(out.ends_with("           12     nodemap\n"));
    }
}
