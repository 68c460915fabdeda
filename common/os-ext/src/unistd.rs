use {
    crate::pid_t,
    std::{ffi::CString, io},
};

/// Call gethostid(3).
///
/// The host identifier is returned as the low 32 bits,
/// which is all that the call is specified to produce.
pub fn gethostid() -> u32
{
    // SAFETY: This is always safe.
    let id = unsafe { libc::gethostid() };
    id as u32
}

/// Call gethostname(2).
///
/// gethostname(2) may truncate the name if it does not fit into the buffer.
/// When this happens, the wrapper function automatically retries the call
/// with a bigger buffer, until it fits.
pub fn gethostname() -> io::Result<CString>
{
    let mut buf: Vec<u8> = vec![0; 64];

    loop {
        // SAFETY: Buffer size is correct.
        let result = unsafe {
            libc::gethostname(
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
            )
        };

        if result == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENAMETOOLONG) {
                let len = buf.len();
                buf.resize(len * 2, 0);
                continue;
            }
            return Err(err);
        }

        match buf.iter().position(|&b| b == 0) {
            Some(nul) if nul + 1 < buf.len() => buf.truncate(nul),
            _ => {
                // A name that fills the buffer may have been truncated.
                // Grow the buffer and try again.
                let len = buf.len();
                buf.resize(len * 2, 0);
                continue;
            },
        }

        // SAFETY: The name was cut at its first NUL.
        break Ok(unsafe { CString::from_vec_unchecked(buf) });
    }
}

/// Call getpid(2).
pub fn getpid() -> pid_t
{
    // SAFETY: This is always safe.
    unsafe { libc::getpid() }
}
