//! Top-level errors returned by [`crate::session::Session`].

use thiserror::Error;

use crate::protocol::ProtocolError;

/// The result of a [`crate::session::Session`] operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong using a session.
#[derive(Error, Debug)]
pub enum Error {
    /// The `hg` binary could not be spawned.
    #[error("failed to launch command server: {0}")]
    Launch(#[source] std::io::Error),

    /// A protocol-level failure: a malformed frame or a bad handshake.
    #[error("protocol error")]
    Protocol(#[from] ProtocolError),

    /// An argument passed to a session method was invalid, e.g. an empty
    /// argv or a reply larger than the server's cap.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command finished with a non-zero/unexpected exit code.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The session was already closed when the operation was attempted.
    #[error("session is closed")]
    SessionClosed,

    /// A subcommand adapter couldn't make sense of the command's captured
    /// output (malformed log XML, an unrecognized status letter, …).
    #[error("failed to parse command output: {0}")]
    Parse(String),

    /// An in-flight `run_command` was aborted by [`crate::Session::cancel`].
    #[error("session was cancelled")]
    Cancelled,
}

/// The outcome of a completed `runcommand` invocation: the exit code plus
/// whatever output was captured along the way.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// The command's argv, for diagnostics.
    pub argv: Vec<String>,
    /// The exit code reported on the `Result` channel.
    pub exit_code: i32,
    /// Captured stdout (`o` channel), decoded per the session's encoding.
    pub stdout: String,
    /// Captured stderr (`e` channel), decoded per the session's encoding.
    pub stderr: String,
}

impl CommandResult {
    /// True when [`CommandResult::exit_code`] is zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A command that completed but whose exit code the caller considered a
/// failure, per that command's own exit-code convention (see
/// [`crate::command`]).
#[derive(Debug, Clone)]
pub struct CommandError {
    /// Human-readable summary, usually derived from `result.stderr`.
    pub message: String,
    /// The full result, for callers that want to inspect stdout/stderr too.
    pub result: CommandResult,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "command {:?} failed (exit {}): {}",
            self.result.argv, self.result.exit_code, self.message
        )
    }
}

impl std::error::Error for CommandError {}

/// Turns a completed [`CommandResult`] into an error when `exit_code` isn't
/// in `acceptable`, using trimmed stderr (falling back to stdout) as the
/// error message.
pub(crate) fn throw_on_unacceptable_exit(
    result: CommandResult,
    acceptable: &[i32],
) -> std::result::Result<CommandResult, CommandError> {
    if acceptable.contains(&result.exit_code) {
        return Ok(result);
    }

    let message = if !result.stderr.trim().is_empty() {
        result.stderr.trim().to_string()
    } else if !result.stdout.trim().is_empty() {
        result.stdout.trim().to_string()
    } else {
        format!("exited with code {}", result.exit_code)
    };

    Err(CommandError { message, result })
}
