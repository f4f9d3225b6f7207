//! Launching commands: the fork/exec protocol shared by single commands and
//! pipeline stages.

pub(crate) mod pipeline;
mod redirect;

pub(crate) use redirect::Redirections;

use std::{
    env,
    ffi::CString,
    io,
    os::fd::{BorrowedFd, OwnedFd},
    os::unix::ffi::OsStringExt,
};

use libc::c_int;

use crate::{
    builtins,
    common::Error,
    jobs::{self, CriticalSection, JobClass, JobId},
    log::user_error,
    parse::{self, Token},
    system::{
        _exit, dup2, execv, fork,
        signal::{consts::*, SignalHandler, SignalHandlerBehavior, SignalSet},
        setpgid, ForkResult, ProcessId,
    },
};

/// Run a pipe-free command: resolve redirections, try the builtins, and only
/// fork a job for an external command.
pub(crate) fn run_single(
    tty: BorrowedFd<'_>,
    mut tokens: Vec<Token>,
    background: bool,
) -> Result<c_int, Error> {
    let redirections = Redirections::extract(&mut tokens)?;
    let argv = parse::into_words(tokens)?;
    if argv.is_empty() {
        return Ok(0);
    }

    // Shell-state builtins run inside the shell process. Their redirections
    // are dropped unused here, which also closes them.
    if let Some(code) = builtins::dispatch(tty, &argv)? {
        return Ok(code);
    }

    let mut cs = CriticalSection::enter()?;

    let pid = launch_stage(
        ProcessId::inherit(),
        cs.saved_mask(),
        redirections.stdin,
        redirections.stdout,
        tty,
        &argv,
    )
    .map_err(Error::Fatal)?;

    let class = if background {
        JobClass::Background
    } else {
        JobClass::Foreground
    };
    let id = cs.jobs().add_job(pid, class);
    cs.jobs().add_proc(id, pid, &argv);

    if background {
        announce(&mut cs, id);
        Ok(0)
    } else {
        Ok(jobs::monitor_foreground(&mut cs, &tty)?)
    }
}

fn announce(cs: &mut CriticalSection, id: JobId) {
    let command = &cs.jobs().get(id).expect("job was just added").command;
    eprintln_ignore_io_error!("[{id}] running '{command}'");
}

/// Fork one stage of a job and place it in the job's process group.
///
/// A `pgid` of [`ProcessId::inherit`] starts a fresh group led by the child.
/// Both sides call `setpgid` so the group exists no matter which of them is
/// scheduled first; the parent may fork the next stage into that group
/// before this child has run a single instruction.
///
/// The descriptors are consumed: the parent's copies are closed when this
/// returns, and the child closes its copies once they are installed on its
/// stdio. An error is only returned for a failed fork, which the caller
/// treats as fatal.
pub(crate) fn launch_stage(
    pgid: ProcessId,
    mask: &SignalSet,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
    tty: BorrowedFd<'_>,
    argv: &[String],
) -> io::Result<ProcessId> {
    // SAFETY: the shell has no other threads.
    let ForkResult::Parent(pid) = (unsafe { fork() }?) else {
        stage_child(pgid, mask, stdin_fd, stdout_fd, tty, argv)
    };

    // The child has already exec'd if it won the race; then this call fails
    // and the group was set up by the child's own mirror call.
    let _ = setpgid(pid, pgid);

    Ok(pid)
}

fn stage_child(
    pgid: ProcessId,
    mask: &SignalSet,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
    tty: BorrowedFd<'_>,
    argv: &[String],
) -> ! {
    // Mirror of the parent's setpgid, see `launch_stage`.
    let _ = setpgid(ProcessId::inherit(), pgid);

    if let Err(err) = prepare_stage(mask, stdin_fd, stdout_fd) {
        user_error!("{}: {err}", argv[0]);
        _exit(libc::EXIT_FAILURE);
    }

    match builtins::dispatch(tty, argv) {
        Ok(Some(code)) => _exit(code),
        Ok(None) => {}
        Err(err) => {
            user_error!("{err}");
            _exit(libc::EXIT_FAILURE);
        }
    }

    let err = exec_external(argv);
    user_error!("{}: {err}", argv[0]);
    _exit(libc::EXIT_FAILURE);
}

fn prepare_stage(
    mask: &SignalSet,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
) -> io::Result<()> {
    // Back to the mask the shell ran with before it blocked SIGCHLD.
    mask.set_mask()?;

    // The shell ignores the keyboard and tty-access signals; its children
    // must react to them normally again.
    for signal in [SIGINT, SIGTSTP, SIGTTIN, SIGTTOU] {
        SignalHandler::register(signal, SignalHandlerBehavior::Default)?.forget();
    }

    if let Some(fd) = &stdin_fd {
        dup2(fd, libc::STDIN_FILENO)?;
    }
    if let Some(fd) = &stdout_fd {
        dup2(fd, libc::STDOUT_FILENO)?;
    }
    // Close the originals; only the stdio copies stay open.
    drop(stdin_fd);
    drop(stdout_fd);

    Ok(())
}

/// Replace this process with the command, searching `$PATH` unless `argv[0]`
/// already names a path. Returns the error of the last attempt.
fn exec_external(argv: &[String]) -> io::Error {
    let args: Vec<CString> = match argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
    {
        Ok(args) => args,
        Err(err) => return io::Error::new(io::ErrorKind::InvalidInput, err),
    };

    let arg0 = &argv[0];
    let path = env::var_os("PATH");
    let (Some(path), false) = (path, arg0.contains('/')) else {
        return execv(&args[0], &args);
    };

    let mut last_err = io::Error::from_raw_os_error(libc::ENOENT);
    for dir in env::split_paths(&path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let Ok(candidate) = CString::new(dir.join(arg0).into_os_string().into_vec()) else {
            continue;
        };
        // Only returns if this candidate could not be executed.
        last_err = execv(&candidate, &args);
    }
    last_err
}
