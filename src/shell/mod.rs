//! The interactive loop: read a line, evaluate it, report finished
//! background jobs, repeat.

use std::{
    io,
    os::fd::{AsFd, OwnedFd},
    process,
};

use rustyline::{error::ReadlineError, history::DefaultHistory, Editor};

use crate::{
    common::Error,
    exec,
    jobs::{self, CriticalSection, Watch},
    log::{dev_debug, dev_warn, user_error},
    parse,
    system::{
        dup_cloexec, getpgrp,
        signal::{consts::*, SignalHandler, SignalHandlerBehavior},
        term::Terminal,
    },
};

const PROMPT: &str = "# ";

pub fn main() -> ! {
    crate::log::init();

    let mut shell = match Shell::new() {
        Ok(shell) => shell,
        Err(err) => {
            user_error!("{err}");
            process::exit(1);
        }
    };

    let code = shell.run();
    // `process::exit` runs no destructors; close the terminal handle first.
    drop(shell);
    process::exit(code);
}

struct Shell {
    editor: Editor<(), DefaultHistory>,
    /// Our own handle on the controlling terminal, close-on-exec so it never
    /// leaks into commands.
    tty: OwnedFd,
}

impl Shell {
    fn new() -> Result<Self, Error> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(Error::NotATerminal);
        }
        let tty = dup_cloexec(&stdin)?;

        jobs::install_reaper()?;

        // ^C, ^Z and the tty-access stops are for the foreground job, never
        // for the shell; children reset these before they exec.
        for signal in [SIGINT, SIGTSTP, SIGTTIN, SIGTTOU] {
            SignalHandler::register(signal, SignalHandlerBehavior::Ignore)?.forget();
        }

        // We assume interactive use: claim the terminal up front.
        tty.tcsetpgrp(getpgrp())?;

        let editor: Editor<(), DefaultHistory> =
            Editor::new().map_err(|err| Error::Fatal(io::Error::other(err)))?;

        Ok(Self { editor, tty })
    }

    fn run(&mut self) -> i32 {
        loop {
            // Whenever the prompt is shown, the terminal is ours again.
            debug_assert_eq!(
                self.tty.tcgetpgrp().unwrap_or_else(|_| getpgrp()),
                getpgrp()
            );

            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.is_empty() {
                        let _ = self.editor.add_history_entry(line.as_str());
                        if let Err(err) = self.eval(&line) {
                            // Fork or pipe failure means the kernel is out of
                            // resources; keeping the prompt alive is hopeless.
                            user_error!("{err}");
                            return 1;
                        }
                    }
                    self.report_finished();
                }
                // ^C at the prompt discards the line and redraws. Nothing
                // has touched the job table for this line yet.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    user_error!("cannot read input: {err}");
                    break;
                }
            }
        }

        eprintln_ignore_io_error!();
        if let Err(err) = jobs::shutdown() {
            user_error!("shutdown: {err}");
            return 1;
        }
        0
    }

    fn eval(&self, line: &str) -> Result<(), Error> {
        let mut tokens = parse::tokenize(line);
        let background = parse::strip_background(&mut tokens);
        if tokens.is_empty() {
            return Ok(());
        }

        let result = if parse::is_pipeline(&tokens) {
            exec::pipeline::run_pipeline(self.tty.as_fd(), tokens, background)
        } else {
            exec::run_single(self.tty.as_fd(), tokens, background)
        };

        match result {
            Ok(code) => {
                dev_debug!("command finished with status {code}");
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                user_error!("{err}");
                Ok(())
            }
        }
    }

    /// Between prompts, report the background jobs that finished while the
    /// user was typing.
    fn report_finished(&self) {
        match CriticalSection::enter() {
            Ok(mut cs) => jobs::watch_jobs(&mut cs, Watch::Finished),
            Err(err) => dev_warn!("cannot block SIGCHLD: {err}"),
        }
    }
}
