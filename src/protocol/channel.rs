//! The channel tag table: the single source of truth for what each wire
//! channel byte means and how the session driver should treat it.

use super::error::ProtocolError;

/// One of the six channel bytes the command server multiplexes onto a
/// single stdout stream (plus the stdin side for replies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTag {
    /// `o` — command stdout, forwarded to [`crate::session::OutputSinks::stdout`].
    Output,
    /// `e` — command stderr, forwarded to [`crate::session::OutputSinks::stderr`].
    Error,
    /// `r` — the 4-byte exit code that ends a command's response loop.
    Result,
    /// `d` — debug/tracing output, forwarded to [`crate::session::OutputSinks::debug`].
    Debug,
    /// `L` — a line-oriented input prompt.
    LineInput,
    /// `I` — a byte-oriented input prompt (used by e.g. progress/password prompts).
    ByteInput,
}

/// How the session driver should handle a frame on a given channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    /// Forward the payload to a sink and keep reading.
    Output,
    /// The payload is the final exit code; the response loop ends.
    Terminal,
    /// The payload is a reply-size cap; a reply must be written before more
    /// frames can be read.
    Prompt,
}

impl ChannelTag {
    /// Classifies this channel per the policy table above.
    pub fn classify(self) -> ChannelClass {
        match self {
            ChannelTag::Output | ChannelTag::Error | ChannelTag::Debug => ChannelClass::Output,
            ChannelTag::Result => ChannelClass::Terminal,
            ChannelTag::LineInput | ChannelTag::ByteInput => ChannelClass::Prompt,
        }
    }

    /// True for the two input-prompt channels.
    pub fn is_prompt(self) -> bool {
        matches!(self.classify(), ChannelClass::Prompt)
    }
}

impl TryFrom<u8> for ChannelTag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'o' => Ok(ChannelTag::Output),
            b'e' => Ok(ChannelTag::Error),
            b'r' => Ok(ChannelTag::Result),
            b'd' => Ok(ChannelTag::Debug),
            b'L' => Ok(ChannelTag::LineInput),
            b'I' => Ok(ChannelTag::ByteInput),
            other => Err(ProtocolError::InvalidChannel(other)),
        }
    }
}

impl From<ChannelTag> for u8 {
    fn from(tag: ChannelTag) -> u8 {
        match tag {
            ChannelTag::Output => b'o',
            ChannelTag::Error => b'e',
            ChannelTag::Result => b'r',
            ChannelTag::Debug => b'd',
            ChannelTag::LineInput => b'L',
            ChannelTag::ByteInput => b'I',
        }
    }
}
