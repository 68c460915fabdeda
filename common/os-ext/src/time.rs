use {
    crate::retry_on_eintr,
    std::{io, time::Duration},
};

/// Call nanosleep(2) with the given duration.
///
/// When interrupted by a signal, the call is repeated
/// with the remaining time reported by the kernel.
pub fn nanosleep(duration: Duration) -> io::Result<()>
{
    let mut req = libc::timespec{
        tv_sec:  duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    retry_on_eintr(|| {
        let mut rem = libc::timespec{tv_sec: 0, tv_nsec: 0};

        // SAFETY: Both pointers refer to valid timespecs.
        let result = unsafe { libc::nanosleep(&req, &mut rem) };

        if result == -1 {
            req = rem;
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests
{
    use {super::*, std::time::Instant};

    #[test]
    fn nanosleep_waits_at_least_duration()
    {
        let start = Instant::now();
        nanosleep(Duration::from_millis(5)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn nanosleep_zero()
    {
        nanosleep(Duration::ZERO).unwrap();
    }
}
