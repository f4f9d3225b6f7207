use crate::cutils::cerr;

use super::{handler::SignalHandlerBehavior, SignalNumber};

use std::{io, mem::MaybeUninit};

fn make_zeroed_sigaction() -> libc::sigaction {
    // SAFETY: since sigaction is a C struct, all-zeroes is a valid representation
    unsafe { std::mem::zeroed() }
}

#[repr(transparent)]
pub(super) struct SignalAction {
    raw: libc::sigaction,
}

impl SignalAction {
    pub(super) fn new(behavior: SignalHandlerBehavior) -> io::Result<Self> {
        // A full `sa_mask` keeps the handler itself from being interrupted;
        // SA_RESTART keeps syscalls from failing with EINTR as long as the
        // action is installed. SA_NOCLDSTOP must stay clear: the job state
        // machine lives off the stop and continue notifications.
        let (sa_sigaction, sa_mask) = match behavior {
            SignalHandlerBehavior::Default => (libc::SIG_DFL, SignalSet::empty()?),
            SignalHandlerBehavior::Ignore => (libc::SIG_IGN, SignalSet::empty()?),
            SignalHandlerBehavior::Handler(handler) => {
                (handler as libc::sighandler_t, SignalSet::full()?)
            }
        };

        let mut raw = make_zeroed_sigaction();
        raw.sa_sigaction = sa_sigaction;
        raw.sa_mask = sa_mask.raw;
        raw.sa_flags = libc::SA_RESTART;

        Ok(Self { raw })
    }

    pub(super) fn register(&self, signal: SignalNumber) -> io::Result<Self> {
        let mut original_action = MaybeUninit::<Self>::zeroed();

        // SAFETY: `self.raw` is an initialized `sigaction` and
        // `original_action` is valid writable memory of the same layout
        cerr(unsafe { libc::sigaction(signal, &self.raw, original_action.as_mut_ptr().cast()) })?;

        // SAFETY: `sigaction` has initialized `original_action`
        Ok(unsafe { original_action.assume_init() })
    }
}

// A signal set that can be used to mask signals.
#[repr(transparent)]
pub(crate) struct SignalSet {
    raw: libc::sigset_t,
}

impl SignalSet {
    /// Create an empty set.
    pub(crate) fn empty() -> io::Result<Self> {
        let mut set = MaybeUninit::<Self>::zeroed();

        // SAFETY: `set` is valid writable memory of the right layout
        cerr(unsafe { libc::sigemptyset(set.as_mut_ptr().cast()) })?;

        // SAFETY: `sigemptyset` has initialized the set
        Ok(unsafe { set.assume_init() })
    }

    /// Create a set containing all the signals.
    pub(crate) fn full() -> io::Result<Self> {
        let mut set = MaybeUninit::<Self>::zeroed();

        // SAFETY: `set` is valid writable memory of the right layout
        cerr(unsafe { libc::sigfillset(set.as_mut_ptr().cast()) })?;

        // SAFETY: `sigfillset` has initialized the set
        Ok(unsafe { set.assume_init() })
    }

    /// Add a signal to the set.
    pub(crate) fn add(&mut self, signal: SignalNumber) -> io::Result<()> {
        // SAFETY: `self.raw` is an initialized signal set
        cerr(unsafe { libc::sigaddset(&mut self.raw, signal) }).map(|_| ())
    }

    /// The set containing exactly `SIGCHLD`, the mask guarding the job table.
    pub(crate) fn sigchld() -> io::Result<Self> {
        let mut set = Self::empty()?;
        set.add(super::consts::SIGCHLD)?;
        Ok(set)
    }

    fn sigprocmask(&self, how: libc::c_int) -> io::Result<Self> {
        let mut original_set = MaybeUninit::<Self>::zeroed();

        // SAFETY: `self.raw` is an initialized signal set and `original_set`
        // is valid writable memory of the same layout
        cerr(unsafe { libc::sigprocmask(how, &self.raw, original_set.as_mut_ptr().cast()) })?;

        // SAFETY: `sigprocmask` has initialized `original_set`
        Ok(unsafe { original_set.assume_init() })
    }

    /// Block all the signals in this set and return the previous set of blocked signals.
    ///
    /// After calling this function successfully, the set of blocked signals will be the union of
    /// the previous set of blocked signals and this set.
    pub(crate) fn block(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_BLOCK)
    }

    /// Block only the signals that are in this set and return the previous set of blocked signals.
    ///
    /// After calling this function successfully, the set of blocked signals will be exactly
    /// this set.
    pub(crate) fn set_mask(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_SETMASK)
    }

    /// Atomically install this set as the signal mask and wait until a signal
    /// whose action is a handler has been delivered, then restore the
    /// previous mask.
    ///
    /// Used with the mask that was active before [`SignalSet::block`], this
    /// is the race-free "unblock and wait for a notification" primitive.
    pub(crate) fn suspend(&self) {
        // SAFETY: `self.raw` is an initialized signal set; sigsuspend always
        // returns -1 with EINTR once a handler has run, which is not an error
        // for our purposes
        unsafe { libc::sigsuspend(&self.raw) };
    }
}
