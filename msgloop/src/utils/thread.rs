use crate::runtime::ThreadNameFn;
use anyhow::Result;

// pthread names are capped at 16 bytes, null terminator included.
#[cfg(target_os = "linux")]
const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Renames the calling OS thread. Names longer than 15 bytes are truncated.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_name(thread_name_fn: &ThreadNameFn) -> Result<()> {
    let name = thread_name_fn.name();
    let len = name.len().min(MAX_PTHREAD_NAME_LEN - 1);

    // Zeroed, so whatever we copy stays null-terminated.
    let mut buf = [0 as libc::c_char; MAX_PTHREAD_NAME_LEN];
    for (dst, src) in buf.iter_mut().zip(&name.as_bytes()[..len]) {
        *dst = *src as libc::c_char;
    }

    let ret = unsafe { libc::pthread_setname_np(libc::pthread_self(), buf.as_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::from_raw_os_error(ret).into());
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_name(thread_name_fn: &ThreadNameFn) -> Result<()> {
    tracing::debug!(name = %thread_name_fn.name(), "thread renaming unsupported on this platform");
    Ok(())
}

#[cfg(all(test, target_os = "linux"))]
pub(crate) fn get_current_thread_name() -> Result<String> {
    use std::ffi::CStr;

    let mut buf = [0 as libc::c_char; MAX_PTHREAD_NAME_LEN];
    let ret =
        unsafe { libc::pthread_getname_np(libc::pthread_self(), buf.as_mut_ptr(), buf.len()) };
    if ret != 0 {
        return Err(std::io::Error::from_raw_os_error(ret).into());
    }

    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_str()?.to_owned())
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_get_thread_name() -> Result<()> {
        std::thread::spawn(|| -> Result<()> {
            set_current_thread_name(&ThreadNameFn(Arc::new(|| "renamed".to_string())))?;
            assert_eq!(get_current_thread_name()?, "renamed");
            Ok(())
        })
        .join()
        .map_err(|_| anyhow::anyhow!("thread panicked"))??;

        Ok(())
    }

    #[test]
    fn test_long_names_are_truncated() -> Result<()> {
        std::thread::spawn(|| -> Result<()> {
            let long = "a-very-long-thread-name";
            set_current_thread_name(&ThreadNameFn(Arc::new(move || long.to_string())))?;
            assert_eq!(get_current_thread_name()?, &long[..15]);
            Ok(())
        })
        .join()
        .map_err(|_| anyhow::anyhow!("thread panicked"))??;

        Ok(())
    }
}
