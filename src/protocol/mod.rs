//! The command-server wire protocol: frame codec, channel policy table, and
//! the errors both can produce.

pub mod channel;
pub mod error;
pub mod frame;

pub use channel::{ChannelClass, ChannelTag};
pub use error::ProtocolError;
pub use frame::{encode_argv, read_frame, write_command_request, write_prompt_reply, Frame};
