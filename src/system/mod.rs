use std::{
    ffi::{CStr, CString},
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use crate::cutils::cerr;

pub(crate) use interface::ProcessId;

use self::signal::SignalNumber;

pub(crate) mod interface;

pub(crate) mod signal;

pub(crate) mod term;

pub(crate) mod wait;

pub(crate) fn _exit(status: libc::c_int) -> ! {
    // SAFETY: `_exit` does not return, and takes any status value
    unsafe { libc::_exit(status) }
}

pub(crate) enum ForkResult {
    // Parent process branch with the child process' PID.
    Parent(ProcessId),
    // Child process branch.
    Child,
}

/// Create a new process.
///
/// # Safety
///
/// In a multithreaded program, only async-signal-safe functions are guaranteed
/// to work in the child process until a call to `execve` or a similar function
/// is done.
pub(crate) unsafe fn fork() -> io::Result<ForkResult> {
    // SAFETY: requirements passed on to the caller
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

/// Send a signal to a process with the specified ID. The shell proper only
/// ever signals whole groups; see [`killpg`].
#[cfg(test)]
pub(crate) fn kill(pid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::kill(pid.get(), signal) }).map(|_| ())
}

/// Send a signal to a process group with the specified ID.
pub(crate) fn killpg(pgid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pgid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::killpg(pgid.get(), signal) }).map(|_| ())
}

/// Get the process group ID of the current process.
pub(crate) fn getpgrp() -> ProcessId {
    // SAFETY: getpgrp takes no arguments and always succeeds
    ProcessId::new(unsafe { libc::getpgrp() })
}

/// Get a process group ID.
#[cfg(test)]
pub(crate) fn getpgid(pid: ProcessId) -> io::Result<ProcessId> {
    // SAFETY: This function cannot cause UB even if `pid` is not a valid process ID
    cerr(unsafe { libc::getpgid(pid.get()) }).map(ProcessId::new)
}

/// Set a process group ID. A `pid` of 0 means the calling process; a `pgid`
/// of 0 means the process' own ID.
pub(crate) fn setpgid(pid: ProcessId, pgid: ProcessId) -> io::Result<()> {
    cerr(unsafe { libc::setpgid(pid.get(), pgid.get()) }).map(|_| ())
}

/// Open a pipe. Both ends are close-on-exec; the launcher clears the flag on
/// the ends it installs on a child's stdio via `dup2`.
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    // SAFETY: `fds` is a valid array of two integers
    cerr(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    // SAFETY: pipe2 has set both entries to open file descriptors that are not
    // owned by anything else
    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    // SAFETY: as above
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    Ok((read, write))
}

/// Duplicate a file descriptor with the close-on-exec flag set on the copy.
pub(crate) fn dup_cloexec<F: AsRawFd>(fd: &F) -> io::Result<OwnedFd> {
    let new_fd = cerr(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, 0) })?;
    // SAFETY: fcntl returned a fresh descriptor not owned by anything else
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

/// Install `fd` as descriptor `target`, replacing whatever was there. The
/// copy has the close-on-exec flag cleared.
pub(crate) fn dup2<F: AsRawFd>(fd: &F, target: RawFd) -> io::Result<()> {
    // SAFETY: dup2 cannot cause UB for any descriptor values
    cerr(unsafe { libc::dup2(fd.as_raw_fd(), target) }).map(|_| ())
}

/// Replace the current process image. Only returns (with the cause) when
/// every step of the exec failed.
pub(crate) fn execv(path: &CStr, args: &[CString]) -> io::Error {
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());

    // SAFETY: `path` is null-terminated and `argv` is a null-terminated array
    // of null-terminated strings, all alive for the duration of the call
    unsafe { libc::execv(path.as_ptr(), argv.as_ptr()) };

    io::Error::last_os_error()
}

#[cfg(test)]
pub(crate) unsafe fn fork_for_test(child_func: impl FnOnce()) -> ProcessId {
    // SAFETY: requirements passed on to the caller
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            child_func();
            // the child function is expected to exit the process itself
            std::process::exit(0);
        }
        ForkResult::Parent(pid) => pid,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        os::{fd::AsRawFd, unix::net::UnixStream},
        process::exit,
    };

    use libc::SIGKILL;

    use super::{
        fork, getpgid, getpgrp, setpgid,
        wait::{Wait, WaitOptions},
        ForkResult, ProcessId,
    };

    #[test]
    fn pgid_test() {
        let pgrp = getpgrp();
        assert_eq!(getpgid(ProcessId::new(0)).unwrap(), pgrp);
        assert_eq!(
            getpgid(ProcessId::new(std::process::id() as i32)).unwrap(),
            pgrp
        );

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                // wait for the parent.
                std::thread::sleep(std::time::Duration::from_secs(1));
                exit(0);
            }
            ForkResult::Parent(child_pid) => {
                // The child should be in our process group.
                assert_eq!(
                    getpgid(child_pid).unwrap(),
                    getpgid(ProcessId::new(0)).unwrap(),
                );
                // Move the child to its own process group
                setpgid(child_pid, child_pid).unwrap();
                // The process group of the child should have changed.
                assert_eq!(getpgid(child_pid).unwrap(), child_pid);
            }
        }
    }

    #[test]
    fn kill_test() {
        let mut child = std::process::Command::new("/bin/sleep")
            .arg("1")
            .spawn()
            .unwrap();
        super::kill(ProcessId::new(child.id() as i32), SIGKILL).unwrap();
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn killpg_test() {
        // Create a socket so the children write to it if they aren't terminated by `killpg`.
        let (mut rx, mut tx) = UnixStream::pair().unwrap();

        let ForkResult::Parent(pid1) = (unsafe { fork() }.unwrap()) else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        let ForkResult::Parent(pid2) = (unsafe { fork() }.unwrap()) else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        drop(tx);

        let pgid = pid1;
        // Move the children to their own process group.
        setpgid(pid1, pgid).unwrap();
        setpgid(pid2, pgid).unwrap();
        // Send `SIGKILL` to the children process group.
        super::killpg(pgid, SIGKILL).unwrap();
        // Ensure that the children were terminated before writing.
        assert_eq!(
            rx.read_exact(&mut [0; 2]).unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
        // Bury both of them.
        pid1.wait(WaitOptions::new()).unwrap();
        pid2.wait(WaitOptions::new()).unwrap();
    }

    #[test]
    fn pipe_ends_are_cloexec() {
        let (read, write) = super::pipe().unwrap();
        for fd in [&read, &write] {
            let flags = crate::cutils::cerr(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) })
                .unwrap();
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn dup2_clears_cloexec() {
        let (read, _write) = super::pipe().unwrap();
        let spare = super::dup_cloexec(&std::io::stdin()).unwrap();
        super::dup2(&read, spare.as_raw_fd()).unwrap();
        let flags =
            crate::cutils::cerr(unsafe { libc::fcntl(spare.as_raw_fd(), libc::F_GETFD) }).unwrap();
        assert_eq!(flags & libc::FD_CLOEXEC, 0);
    }
}
