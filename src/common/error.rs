use std::{fmt, io, path::PathBuf};

#[derive(Debug)]
pub enum Error {
    /// A redirection operator without a file name after it.
    MalformedRedirection,
    /// A redirection target that could not be opened.
    RedirectOpen(PathBuf, io::Error),
    /// A token in a position the grammar does not allow.
    Syntax(&'static str),
    /// The shell was started without a controlling terminal on stdin.
    NotATerminal,
    /// Kernel-level failure (fork, pipe, sigprocmask). Not recoverable:
    /// the evaluation loop aborts the shell when it sees this.
    Fatal(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedRedirection => {
                write!(f, "syntax error: redirection requires a file name")
            }
            Error::RedirectOpen(path, err) => write!(f, "{}: {err}", path.display()),
            Error::Syntax(what) => write!(f, "syntax error: {what}"),
            Error::NotATerminal => write!(f, "standard input: not a terminal"),
            Error::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Fatal(err)
    }
}

impl Error {
    /// Returns `true` if the shell cannot keep running after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
