//! The job table and the machinery that keeps it consistent: the `SIGCHLD`
//! reaper, the critical-section guard used by every main-flow access, and
//! the foreground monitor that arbitrates terminal ownership.
//!
//! Concurrency model: the shell is single-threaded and the only concurrent
//! mutator is the `SIGCHLD` handler. Instead of a lock, the table is guarded
//! by the signal mask: main-flow code acquires a [`CriticalSection`] (which
//! blocks `SIGCHLD`) before touching the table, and the only place where the
//! handler can run while a critical section is active is inside
//! [`CriticalSection::suspend`], which holds no borrow of the table.

mod table;

use std::{cell::UnsafeCell, io, os::fd::AsRawFd};

use libc::c_int;

pub(crate) use table::{Job, JobClass, JobId, JobTable, ProcState, FOREGROUND};

use crate::{
    cutils::{errno, set_errno},
    log::{dev_debug, dev_warn},
    system::{
        getpgrp, killpg,
        signal::{consts::*, SignalHandler, SignalHandlerBehavior, SignalNumber, SignalSet},
        term::Terminal,
    },
};

struct TableCell(UnsafeCell<JobTable>);

// SAFETY: the shell is single-threaded; all concurrent access comes from the
// SIGCHLD handler, which only runs while no `CriticalSection` borrow is live.
unsafe impl Sync for TableCell {}

static TABLE: TableCell = TableCell(UnsafeCell::new(JobTable::new()));

/// # Safety
///
/// The caller must have exclusive access to the table: either it holds a
/// [`CriticalSection`] (so the handler cannot run), or it *is* the handler
/// (so the main flow is suspended or outside any critical section).
unsafe fn table() -> &'static mut JobTable {
    // SAFETY: per the contract above there is no other live reference
    unsafe { &mut *TABLE.0.get() }
}

/// Exclusive access to the job table, obtained by blocking `SIGCHLD`.
///
/// Dropping the guard restores the signal mask that was active before.
/// Critical sections must not be nested: [`CriticalSection::suspend`] waits
/// on the *saved* mask, which only has `SIGCHLD` deliverable if the section
/// was entered from unblocked code.
pub(crate) struct CriticalSection {
    saved: SignalSet,
}

impl CriticalSection {
    pub(crate) fn enter() -> io::Result<Self> {
        let saved = SignalSet::sigchld()?.block()?;
        Ok(Self { saved })
    }

    /// The mask that was active before the section was entered; the one the
    /// launcher restores in children and [`suspend`](Self::suspend) waits on.
    pub(crate) fn saved_mask(&self) -> &SignalSet {
        &self.saved
    }

    pub(crate) fn jobs(&mut self) -> &mut JobTable {
        // SAFETY: SIGCHLD is blocked for as long as `self` exists and the
        // returned borrow is tied to `self`, so the handler cannot observe or
        // race this access. The borrow ends before `suspend` can be called.
        unsafe { table() }
    }

    /// Atomically unblock `SIGCHLD` and wait for a signal to be handled.
    ///
    /// On return the mask is blocked again, so job state read afterwards is
    /// read under the mask. No wakeup is lost: a `SIGCHLD` delivered between
    /// entering the section and suspending is made pending by the kernel and
    /// handled the moment `suspend` swaps the mask.
    pub(crate) fn suspend(&self) {
        self.saved.suspend();
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Err(err) = self.saved.set_mask() {
            dev_warn!("cannot restore signal mask: {err}");
        }
    }
}

/// Install the `SIGCHLD` action that keeps the job table up to date.
/// Called once at startup, before the first child is forked.
pub(crate) fn install_reaper() -> io::Result<()> {
    SignalHandler::register(SIGCHLD, SignalHandlerBehavior::Handler(reap_all))?.forget();
    Ok(())
}

/// The `SIGCHLD` action: only async-signal-safe work (see [`JobTable::reap`])
/// and `errno` is left the way it was found.
extern "C" fn reap_all(_signal: SignalNumber) {
    let saved_errno = errno();
    // SAFETY: we are the SIGCHLD handler; the main flow either has SIGCHLD
    // blocked (then this handler does not run) or holds no borrow of the
    // table (see `CriticalSection`).
    unsafe { table() }.reap();
    set_errno(saved_errno);
}

/// Wait for the foreground job to stop or finish, with the terminal handed
/// over to it for the duration.
///
/// Returns the job's exit code, or -1 if it was stopped (in which case it has
/// been moved to a fresh background slot). The caller must have entered the
/// critical section before launching the job, so that no state change can be
/// missed between the fork and the first state inspection here.
pub(crate) fn monitor_foreground(
    cs: &mut CriticalSection,
    tty: &impl AsRawFd,
) -> io::Result<c_int> {
    let pgid = foreground(cs).pgid;
    tty.tcsetpgrp(pgid)?;

    let exit_code = loop {
        // SIGCHLD has been blocked since before the job was forked (or
        // resumed), so a notification that already arrived is still pending
        // and wakes this suspend immediately. The state is then re-read
        // under the blocked mask.
        cs.suspend();
        match foreground(cs).state {
            ProcState::Running => {}
            ProcState::Stopped => {
                let slot = cs.jobs().free_background_slot();
                cs.jobs().move_job(FOREGROUND, slot);
                break -1;
            }
            ProcState::Finished => {
                let exit_code = foreground(cs).exit_code();
                cs.jobs().del_job(FOREGROUND);
                break exit_code;
            }
        }
    };

    // The terminal goes back to the shell no matter how the job went away.
    tty.tcsetpgrp(getpgrp())?;

    Ok(exit_code)
}

fn foreground<'a>(cs: &'a mut CriticalSection) -> &'a Job {
    cs.jobs()
        .get(FOREGROUND)
        .expect("the foreground slot is occupied while it is monitored")
}

/// Which jobs [`watch_jobs`] reports on.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Watch {
    All,
    Finished,
}

/// Report the state of background jobs and delete the finished ones.
pub(crate) fn watch_jobs(cs: &mut CriticalSection, which: Watch) {
    let mut finished = Vec::new();

    for (id, job) in cs.jobs().background_jobs() {
        match job.state {
            ProcState::Finished => {
                eprintln_ignore_io_error!(
                    "[{id}] exited, status={} ({})",
                    job.exit_code(),
                    job.command
                );
                finished.push(id);
            }
            ProcState::Stopped if which == Watch::All => {
                eprintln_ignore_io_error!("[{id}] stopped ({})", job.command);
            }
            ProcState::Running if which == Watch::All => {
                eprintln_ignore_io_error!("[{id}] running ({})", job.command);
            }
            _ => {}
        }
    }

    for id in finished {
        cs.jobs().del_job(id);
    }
}

/// Send `SIGCONT` to a stopped job and either leave it in the background or
/// move it to the foreground slot and monitor it there.
///
/// With `id` of `None` the highest-numbered unfinished job is picked.
/// Returns `false` if no such job exists.
pub(crate) fn resume_job(
    cs: &mut CriticalSection,
    id: Option<JobId>,
    class: JobClass,
    tty: &impl AsRawFd,
) -> io::Result<bool> {
    let Some(id) = id.or_else(|| cs.jobs().highest_live()) else {
        return Ok(false);
    };
    match cs.jobs().get(id) {
        Some(job) if job.state != ProcState::Finished => killpg(job.pgid, SIGCONT)?,
        _ => return Ok(false),
    }

    if class == JobClass::Foreground {
        cs.jobs().move_job(id, FOREGROUND);
        monitor_foreground(cs, tty)?;
    }

    Ok(true)
}

/// Terminate a job by signalling its whole process group.
/// Returns `false` if the slot is free or the job already finished.
pub(crate) fn kill_job(cs: &mut CriticalSection, id: JobId) -> io::Result<bool> {
    match cs.jobs().get(id) {
        Some(job) if job.state != ProcState::Finished => {
            dev_debug!("[{id}] killing '{}'", job.command);
            killpg(job.pgid, SIGTERM)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Wind down every remaining job: resume the stopped ones so the signal can
/// reach them, terminate everything, and wait until the reaper has seen every
/// member finish. Finally report what happened.
pub(crate) fn shutdown() -> io::Result<()> {
    let mut cs = CriticalSection::enter()?;

    let live: Vec<(JobId, _)> = cs
        .jobs()
        .background_jobs()
        .filter(|(_, job)| job.state != ProcState::Finished)
        .map(|(id, job)| (id, (job.pgid, job.state)))
        .collect();

    for (id, (pgid, state)) in live {
        dev_debug!("[{id}] terminating at shutdown");
        if state == ProcState::Stopped {
            let _ = killpg(pgid, SIGCONT);
        }
        let _ = killpg(pgid, SIGTERM);
    }

    while !cs.jobs().all_finished() {
        cs.suspend();
    }

    watch_jobs(&mut cs, Watch::Finished);

    Ok(())
}
