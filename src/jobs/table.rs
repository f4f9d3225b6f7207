use libc::c_int;

use crate::system::{
    wait::{Wait, WaitOptions},
    ProcessId,
};

/// Slot index in the job table; doubles as the user-visible job number.
pub(crate) type JobId = usize;

/// Slot 0 is reserved for the job currently attached to the terminal.
pub(crate) const FOREGROUND: JobId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcState {
    Running,
    Stopped,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobClass {
    Foreground,
    Background,
}

#[derive(Debug)]
pub(crate) struct ProcRecord {
    pub(crate) pid: ProcessId,
    pub(crate) state: ProcState,
    /// Meaningful only once `state` is `Finished`.
    pub(crate) exit_code: c_int,
}

#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) pgid: ProcessId,
    pub(crate) procs: Vec<ProcRecord>,
    pub(crate) state: ProcState,
    /// Rendering of the original command line, stages joined by `" | "`.
    pub(crate) command: String,
}

impl Job {
    /// The exit code of a job is the exit code of its last stage.
    pub(crate) fn exit_code(&self) -> c_int {
        self.procs.last().map_or(-1, |proc| proc.exit_code)
    }

    /// Recompute the aggregate state from the members: any runner keeps the
    /// job running, otherwise any stopped member keeps it stopped, otherwise
    /// everything has finished.
    fn recompute_state(&mut self) {
        let mut state = ProcState::Finished;
        for proc in &self.procs {
            match proc.state {
                ProcState::Running => {
                    state = ProcState::Running;
                    break;
                }
                ProcState::Stopped => state = ProcState::Stopped,
                ProcState::Finished => {}
            }
        }
        self.state = state;
    }
}

/// The ordered, index-addressable set of job slots.
///
/// Slots are stable identities: the table grows on demand and never shrinks,
/// so a job number printed once stays valid until that job is deleted.
#[derive(Debug)]
pub(crate) struct JobTable {
    slots: Vec<Option<Job>>,
}

impl JobTable {
    pub(crate) const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn get(&self, id: JobId) -> Option<&Job> {
        self.slots.get(id)?.as_ref()
    }

    fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.slots.get_mut(id)?.as_mut()
    }

    /// The lowest free background slot, growing the table if every slot is
    /// taken. Never returns the foreground slot.
    pub(crate) fn free_background_slot(&mut self) -> JobId {
        if self.slots.is_empty() {
            self.slots.push(None);
        }
        for (id, slot) in self.slots.iter().enumerate().skip(1) {
            if slot.is_none() {
                return id;
            }
        }
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub(crate) fn add_job(&mut self, pgid: ProcessId, class: JobClass) -> JobId {
        let id = match class {
            JobClass::Foreground => {
                if self.slots.is_empty() {
                    self.slots.push(None);
                }
                assert!(
                    self.slots[FOREGROUND].is_none(),
                    "foreground slot is already taken"
                );
                FOREGROUND
            }
            JobClass::Background => self.free_background_slot(),
        };

        self.slots[id] = Some(Job {
            pgid,
            procs: Vec::new(),
            state: ProcState::Running,
            command: String::new(),
        });
        id
    }

    /// Record a freshly launched member of `id` and extend the job's command
    /// text with the stage's argv.
    pub(crate) fn add_proc(&mut self, id: JobId, pid: ProcessId, argv: &[String]) {
        let job = self.get_mut(id).expect("adding a process to a free slot");
        job.procs.push(ProcRecord {
            pid,
            state: ProcState::Running,
            exit_code: -1,
        });
        if !job.command.is_empty() {
            job.command.push_str(" | ");
        }
        job.command.push_str(&argv.join(" "));
    }

    pub(crate) fn del_job(&mut self, id: JobId) {
        let job = self.get(id).expect("deleting a free slot");
        assert!(
            job.state == ProcState::Finished,
            "deleting a job that has not finished"
        );
        self.slots[id] = None;
    }

    /// Relocate a whole job, leaving the vacated slot free. Used to demote a
    /// stopped foreground job and to promote a background job under `fg`.
    pub(crate) fn move_job(&mut self, from: JobId, to: JobId) {
        assert!(
            self.slots.get(to).is_some_and(|slot| slot.is_none()),
            "moving a job onto an occupied slot"
        );
        let job = self.slots[from].take().expect("moving a free slot");
        self.slots[to] = Some(job);
    }

    /// Background slots in ascending order; the foreground slot is excluded.
    pub(crate) fn background_jobs(&self) -> impl DoubleEndedIterator<Item = (JobId, &Job)> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(id, slot)| Some((id, slot.as_ref()?)))
    }

    /// Default target for `fg`/`bg`: the highest-numbered job that has not
    /// finished yet.
    pub(crate) fn highest_live(&self) -> Option<JobId> {
        self.background_jobs()
            .filter(|(_, job)| job.state != ProcState::Finished)
            .map(|(id, _)| id)
            .next_back()
    }

    pub(crate) fn all_finished(&self) -> bool {
        self.slots
            .iter()
            .flatten()
            .all(|job| job.state == ProcState::Finished)
    }

    /// Drain every pending child-state notification and update the records.
    ///
    /// This runs from the `SIGCHLD` handler, so it is written to be
    /// async-signal-safe: non-blocking `waitpid` only, no allocation, no
    /// stdio, and the caller saves and restores `errno`. Coalesced signals
    /// are no problem since every non-finished member is polled each time.
    pub(crate) fn reap(&mut self) {
        const OPTIONS: WaitOptions = WaitOptions::new().no_hang().untraced().continued();

        for job in self.slots.iter_mut().flatten() {
            for proc in &mut job.procs {
                if proc.state == ProcState::Finished {
                    continue;
                }
                if let Ok((_, status)) = proc.pid.wait(OPTIONS) {
                    if status.did_exit() || status.was_signaled() {
                        proc.state = ProcState::Finished;
                        proc.exit_code = status.reaped_exit_code();
                    } else if status.did_continue() {
                        proc.state = ProcState::Running;
                    } else if status.was_stopped() {
                        proc.state = ProcState::Stopped;
                    }
                }
                // No state change available: leave the record untouched.
            }
            job.recompute_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{JobClass, JobTable, ProcState, FOREGROUND};
    use crate::system::{fork_for_test, kill, killpg, setpgid, ProcessId};

    fn args(argv: &[&str]) -> Vec<String> {
        argv.iter().map(|s| s.to_string()).collect()
    }

    fn fake_table() -> JobTable {
        let mut table = JobTable::new();
        let id = table.add_job(ProcessId::new(1000), JobClass::Background);
        table.add_proc(id, ProcessId::new(1000), &args(&["sleep", "10"]));
        table
    }

    #[test]
    fn slots_are_allocated_lowest_first_and_reused() {
        let mut table = JobTable::new();
        let first = table.add_job(ProcessId::new(100), JobClass::Background);
        let second = table.add_job(ProcessId::new(200), JobClass::Background);
        assert_eq!((first, second), (1, 2));

        table.add_proc(first, ProcessId::new(100), &args(&["true"]));
        if let Some(job) = table.slots[first].as_mut() {
            job.state = ProcState::Finished;
        }
        table.del_job(first);
        assert!(table.get(first).is_none());

        // The freed slot is handed out again before the table grows.
        let third = table.add_job(ProcessId::new(300), JobClass::Background);
        assert_eq!(third, 1);
    }

    #[test]
    fn command_text_joins_stages() {
        let mut table = JobTable::new();
        let id = table.add_job(ProcessId::new(10), JobClass::Foreground);
        table.add_proc(id, ProcessId::new(10), &args(&["yes"]));
        table.add_proc(id, ProcessId::new(11), &args(&["head", "-n", "3"]));
        assert_eq!(table.get(id).unwrap().command, "yes | head -n 3");
    }

    #[test]
    fn aggregate_state_derivation() {
        let mut table = fake_table();
        let job = table.slots[1].as_mut().unwrap();
        job.procs[0].state = ProcState::Stopped;
        job.recompute_state();
        assert_eq!(job.state, ProcState::Stopped);

        job.procs.push(super::ProcRecord {
            pid: ProcessId::new(1001),
            state: ProcState::Running,
            exit_code: -1,
        });
        job.recompute_state();
        // One runner is enough to keep the job running.
        assert_eq!(job.state, ProcState::Running);

        for proc in &mut job.procs {
            proc.state = ProcState::Finished;
        }
        job.recompute_state();
        assert_eq!(job.state, ProcState::Finished);
    }

    #[test]
    fn exit_code_is_last_stage() {
        let mut table = fake_table();
        let job = table.slots[1].as_mut().unwrap();
        job.procs[0].exit_code = 1;
        job.procs.push(super::ProcRecord {
            pid: ProcessId::new(1001),
            state: ProcState::Finished,
            exit_code: 0,
        });
        assert_eq!(job.exit_code(), 0);
    }

    #[test]
    fn move_job_keeps_identity() {
        let mut table = fake_table();
        let target = table.free_background_slot();
        assert_eq!(target, 2);
        table.move_job(1, target);
        assert!(table.get(1).is_none());
        assert_eq!(table.get(2).unwrap().command, "sleep 10");
    }

    #[test]
    fn highest_live_skips_finished_and_empty() {
        let mut table = JobTable::new();
        assert_eq!(table.highest_live(), None);

        let one = table.add_job(ProcessId::new(100), JobClass::Background);
        let two = table.add_job(ProcessId::new(200), JobClass::Background);
        table.add_proc(one, ProcessId::new(100), &args(&["a"]));
        table.add_proc(two, ProcessId::new(200), &args(&["b"]));
        assert_eq!(table.highest_live(), Some(two));

        table.slots[two].as_mut().unwrap().state = ProcState::Finished;
        assert_eq!(table.highest_live(), Some(one));
    }

    #[test]
    fn reap_classifies_exit_stop_continue() {
        let mut table = JobTable::new();

        // A child that stops itself and waits to be killed.
        let pid = unsafe {
            fork_for_test(|| {
                setpgid(ProcessId::inherit(), ProcessId::inherit()).unwrap();
                kill(ProcessId::new(std::process::id() as i32), libc::SIGSTOP).ok();
                std::thread::sleep(std::time::Duration::from_secs(10));
                std::process::exit(0);
            })
        };
        setpgid(pid, pid).ok();

        let id = table.add_job(pid, JobClass::Background);
        table.add_proc(id, pid, &args(&["victim"]));

        let wait_for = |table: &mut JobTable, state: ProcState| {
            for _ in 0..500 {
                table.reap();
                if table.get(id).unwrap().state == state {
                    return;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            panic!("job never reached {state:?}");
        };

        wait_for(&mut table, ProcState::Stopped);

        killpg(pid, libc::SIGCONT).unwrap();
        wait_for(&mut table, ProcState::Running);

        killpg(pid, libc::SIGKILL).unwrap();
        wait_for(&mut table, ProcState::Finished);
        // Killed by a signal: the recorded code is the status' low byte.
        assert_eq!(table.get(id).unwrap().exit_code(), 0);
    }
}
