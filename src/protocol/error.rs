//! Errors produced by the frame codec and handshake.

use thiserror::Error;

/// A protocol-level failure: a malformed frame, a bad handshake, or an I/O
/// error encountered while reading or writing one.
///
/// Every variant here is fatal to the session that produced it (see
/// [`crate::session`]): there is no attempt to resynchronize a misframed
/// stream.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Fewer than 5 bytes were available for a frame header, or fewer than
    /// `N` bytes were available for its payload.
    #[error("malformed frame header")]
    MalformedHeader,

    /// The child closed its stdout with nothing pending — a clean
    /// disconnect in a context where a frame was expected.
    #[error("server terminated early")]
    TerminatedEarly,

    /// The channel byte in a frame header did not match any entry in the
    /// fixed `{o,e,r,d,L,I}` table.
    #[error("invalid channel byte: {0:#04x}")]
    InvalidChannel(u8),

    /// The initial hello frame was missing a required header key.
    #[error("bad handshake: missing '{0}' header")]
    BadHandshake(&'static str),

    /// The initial hello frame arrived on a channel other than `Output`.
    #[error("bad handshake: hello frame on unexpected channel")]
    BadHandshakeChannel,

    /// `runCommand` was invoked on a session whose capability set does not
    /// include the named capability.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    /// A `Result` frame's payload was not exactly 4 bytes.
    #[error("invalid result payload ({0} bytes, expected 4)")]
    InvalidResultPayload(usize),

    /// An I/O error occurred reading from or writing to the child's pipes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
