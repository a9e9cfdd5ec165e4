//! Background-process housekeeping: double fork, session detach, stdio to
//! /dev/null, optional pidfile.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Detach from the controlling terminal and run in the background.
///
/// Must be called after the config is loaded (diagnostics should reach the
/// invoking terminal) and before the poll set is built (the forked child is
/// the process that owns the descriptors).
pub fn daemonize(pidfile: Option<&Path>) -> Result<()> {
    // First fork, then a new session: drops the controlling terminal.
    fork_and_exit_parent()?;
    if unsafe { libc::setsid() } < 0 {
        return Err(std::io::Error::last_os_error()).context("setsid failed");
    }

    // Second fork, with SIGHUP ignored across it, so the daemon is not a
    // session leader and can never reacquire a controlling terminal.
    ignore_sighup()?;
    fork_and_exit_parent()?;

    if unsafe { libc::chdir(c"/".as_ptr()) } < 0 {
        return Err(std::io::Error::last_os_error()).context("cannot change directory to /");
    }
    unsafe { libc::umask(0) };

    if let Some(path) = pidfile {
        fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write pidfile '{}'", path.display()))?;
    }

    redirect_stdio()
}

fn fork_and_exit_parent() -> Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(std::io::Error::last_os_error()).context("fork failed"),
        0 => Ok(()),
        _ => std::process::exit(0),
    }
}

fn ignore_sighup() -> Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = libc::SIG_IGN;
        libc::sigemptyset(&mut sa.sa_mask);
        if libc::sigaction(libc::SIGHUP, &sa, std::ptr::null_mut()) < 0 {
            return Err(std::io::Error::last_os_error()).context("cannot ignore SIGHUP");
        }
    }
    Ok(())
}

fn redirect_stdio() -> Result<()> {
    unsafe {
        let null = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
        if null < 0 {
            return Err(std::io::Error::last_os_error()).context("cannot open /dev/null");
        }
        for fd in 0..3 {
            if libc::dup2(null, fd) < 0 {
                return Err(std::io::Error::last_os_error()).context("cannot redirect stdio");
            }
        }
        if null > 2 {
            libc::close(null);
        }
    }
    Ok(())
}
