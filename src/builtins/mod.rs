//! The builtin commands. `cd` and `quit` touch only shell state; the rest
//! translate user intent into job-table operations, each inside its own
//! critical section.
//!
//! Builtins also run inside pipeline stages; there they execute in the
//! forked child and the child exits with their status.

use std::{env, os::fd::BorrowedFd, path::PathBuf, process};

use libc::c_int;

use crate::{
    common::Error,
    jobs::{self, CriticalSection, JobClass, JobId, Watch},
    log::user_error,
};

type BuiltinFn = for<'a> fn(BorrowedFd<'a>, &[String]) -> Result<c_int, Error>;

struct Builtin {
    name: &'static str,
    run: BuiltinFn,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "quit",
        run: do_quit,
    },
    Builtin {
        name: "cd",
        run: do_cd,
    },
    Builtin {
        name: "jobs",
        run: do_jobs,
    },
    Builtin {
        name: "fg",
        run: do_fg,
    },
    Builtin {
        name: "bg",
        run: do_bg,
    },
    Builtin {
        name: "kill",
        run: do_kill,
    },
];

/// Run `argv` as a builtin if its name matches one. `Ok(None)` means the
/// command is not a builtin and should be executed externally.
pub(crate) fn dispatch(tty: BorrowedFd, argv: &[String]) -> Result<Option<c_int>, Error> {
    let Some(builtin) = BUILTINS.iter().find(|builtin| builtin.name == argv[0]) else {
        return Ok(None);
    };
    (builtin.run)(tty, &argv[1..]).map(Some)
}

fn do_quit(_tty: BorrowedFd, _args: &[String]) -> Result<c_int, Error> {
    process::exit(0)
}

/// Change the working directory; without an argument go to `$HOME`.
fn do_cd(_tty: BorrowedFd, args: &[String]) -> Result<c_int, Error> {
    let path = match args.first() {
        Some(path) => PathBuf::from(path),
        None => env::var_os("HOME").map(PathBuf::from).unwrap_or_default(),
    };
    match env::set_current_dir(&path) {
        Ok(()) => Ok(0),
        Err(err) => {
            user_error!("cd: {}: {err}", path.display());
            Ok(1)
        }
    }
}

fn do_jobs(_tty: BorrowedFd, _args: &[String]) -> Result<c_int, Error> {
    let mut cs = CriticalSection::enter()?;
    jobs::watch_jobs(&mut cs, Watch::All);
    Ok(0)
}

fn do_fg(tty: BorrowedFd, args: &[String]) -> Result<c_int, Error> {
    resume(tty, args, JobClass::Foreground, "fg")
}

fn do_bg(tty: BorrowedFd, args: &[String]) -> Result<c_int, Error> {
    resume(tty, args, JobClass::Background, "bg")
}

/// Shared body of `fg` and `bg`: pick the requested job (or the
/// highest-numbered live one) and continue it.
fn resume(
    tty: BorrowedFd,
    args: &[String],
    class: JobClass,
    name: &str,
) -> Result<c_int, Error> {
    let id = match args.first() {
        None => None,
        Some(arg) => match arg.parse::<JobId>() {
            Ok(id) => Some(id),
            Err(_) => {
                user_error!("{name}: job not found: {arg}");
                return Ok(1);
            }
        },
    };

    let mut cs = CriticalSection::enter()?;
    if jobs::resume_job(&mut cs, id, class, &tty)? {
        Ok(0)
    } else {
        match args.first() {
            Some(arg) => user_error!("{name}: job not found: {arg}"),
            None => user_error!("{name}: job not found"),
        }
        Ok(1)
    }
}

/// `kill %n`: send `SIGTERM` to the job's whole process group.
fn do_kill(_tty: BorrowedFd, args: &[String]) -> Result<c_int, Error> {
    let Some(id) = args.first().and_then(|arg| job_ref(arg)) else {
        user_error!("kill: usage: kill %job");
        return Ok(-1);
    };

    let mut cs = CriticalSection::enter()?;
    if jobs::kill_job(&mut cs, id)? {
        Ok(0)
    } else {
        user_error!(
            "kill: job not found: {}",
            args.first().map_or("", |arg| arg.as_str())
        );
        Ok(1)
    }
}

/// Job references must carry the `%` prefix; bare numbers are pids, not jobs.
/// An unparsable number past the prefix reads as a slot that never existed,
/// so the caller reports it as "job not found" rather than a usage error.
fn job_ref(arg: &str) -> Option<JobId> {
    let number = arg.strip_prefix('%')?;
    Some(number.parse().unwrap_or(JobId::MAX))
}
