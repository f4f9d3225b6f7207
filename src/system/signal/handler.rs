use std::io;

use crate::log::dev_warn;

use super::{consts::*, set::SignalAction, signal_name, SignalNumber};

/// A handler for a signal.
///
/// When a value of this type is dropped, it will try to restore the action that was registered for
/// the signal prior to calling [`SignalHandler::register`].
pub(crate) struct SignalHandler {
    signal: SignalNumber,
    original_action: SignalAction,
}

impl SignalHandler {
    const FORBIDDEN: &'static [SignalNumber] = &[SIGKILL, SIGSTOP];

    /// Register a new action for the given signal.
    ///
    /// # Panics
    ///
    /// If it is not possible to override the action for the provided signal.
    pub(crate) fn register(
        signal: SignalNumber,
        behavior: SignalHandlerBehavior,
    ) -> io::Result<Self> {
        if Self::FORBIDDEN.contains(&signal) {
            panic!(
                "the {} signal action cannot be overridden",
                signal_name(signal)
            );
        }

        let action = SignalAction::new(behavior)?;
        let original_action = action.register(signal)?;

        Ok(Self {
            signal,
            original_action,
        })
    }

    /// Forget this signal handler.
    ///
    /// This can be used to avoid restoring the original action for the signal.
    pub(crate) fn forget(self) {
        std::mem::forget(self)
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        let signal = self.signal;
        if let Err(err) = self.original_action.register(signal) {
            dev_warn!(
                "cannot restore original action for {}: {err}",
                signal_name(signal),
            )
        }
    }
}

/// The possible dispositions for a [`SignalHandler`].
pub(crate) enum SignalHandlerBehavior {
    /// Execute the default action for the signal.
    Default,
    /// Ignore the arrival of the signal.
    Ignore,
    /// Run the given function when the signal arrives. The function runs in
    /// signal context and must only do async-signal-safe work.
    Handler(extern "C" fn(SignalNumber)),
}

#[cfg(test)]
mod tests {
    use super::{SignalHandler, SignalHandlerBehavior};
    use crate::system::signal::consts::*;
    use crate::system::{kill, ProcessId};

    #[test]
    fn ignore_and_restore() {
        let self_pid = ProcessId::new(std::process::id() as i32);

        let handler = SignalHandler::register(SIGTERM, SignalHandlerBehavior::Ignore).unwrap();
        // With the action set to ignore, this is survivable.
        kill(self_pid, SIGTERM).unwrap();

        // Dropping the handler restores the previous (default) action; sending
        // the signal again would terminate the test, so just drop.
        drop(handler);
    }
}
