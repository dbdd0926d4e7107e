use std::io;

/// Error type used across the crate.
///
/// [`Error::Tcl`] is the only recoverable kind: the Tcl child caught the
/// error itself and the session stays usable. Everything else unwinds the
/// session scope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame read from a pipe could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A message key contains characters outside `[A-Za-z_]+`.
    #[error("message keys may only contain a-z, A-Z and underscores, got {0:?}")]
    InvalidKey(String),

    /// A decoded message did not match any of the permitted classes,
    /// either by its `class` tag or by a missing required key.
    #[error("message does not match any permitted class: {0}")]
    WrongMessageClass(String),

    /// The Tcl child evaluated the command and reported an error.
    #[error("{0}")]
    Tcl(String),

    /// The child closed the sentinel pipe (or broke the data pipe) before
    /// the session was done with it.
    #[error("tcl child process exited early")]
    ChildEarlyExit,

    /// Raised when the session scope closes: non-zero exit code, or any
    /// exit before `PyExit` was delivered.
    #[error("tcl child process failed with exit code {code:?}: {argv:?}")]
    ChildFailed {
        code: Option<i32>,
        argv: Vec<String>,
    },

    /// `send`/`recv` called while the transport was in the opposite state.
    #[error("bridge precondition violated: {0}")]
    Precondition(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sys(#[from] nix::Error),

    /// Escape hatch for user errors raised inside a session body.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error for propagation out of a session body.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Other(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
