//! The frame codec: a 5-byte header (1 channel byte + 4 big-endian length
//! bytes) followed, for most channels, by a payload of that length.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::channel::ChannelTag;
use super::error::ProtocolError;

const HEADER_SIZE: usize = 5;

/// One decoded frame: a channel tag plus its payload.
///
/// For [`ChannelTag::LineInput`]/[`ChannelTag::ByteInput`] the payload is
/// exactly 4 bytes, the big-endian encoding of the maximum reply size the
/// child will accept — see [`Frame::prompt_cap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this frame was received on.
    pub channel: ChannelTag,
    /// The frame's payload. For prompt channels this is the 4-byte reply cap.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Interprets this frame's payload as a prompt reply cap.
    ///
    /// Only meaningful for [`ChannelTag::LineInput`]/[`ChannelTag::ByteInput`]
    /// frames, which is all [`read_frame`] ever produces with a 4-byte
    /// payload that isn't a `Result`.
    pub fn prompt_cap(&self) -> Result<u32, ProtocolError> {
        self.payload
            .as_slice()
            .try_into()
            .map(u32::from_be_bytes)
            .map_err(|_| ProtocolError::MalformedHeader)
    }

    /// Interprets this frame's payload as a `Result` exit code.
    pub fn result_code(&self) -> Result<i32, ProtocolError> {
        self.payload
            .as_slice()
            .try_into()
            .map(i32::from_be_bytes)
            .map_err(|_| ProtocolError::InvalidResultPayload(self.payload.len()))
    }
}

/// Reads exactly `buf.len()` bytes, looping over short reads the way a pipe
/// may deliver them. Returns the number of bytes actually read before
/// hitting EOF; a return value equal to `buf.len()` means the buffer was
/// filled completely.
fn read_as_much_as_possible<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Decodes one frame from `r`: a 5-byte header, then, for non-prompt
/// channels, the `N` payload bytes the header's length field promises.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, ProtocolError> {
    let mut header = [0u8; HEADER_SIZE];
    let got = read_as_much_as_possible(r, &mut header)?;
    if got == 0 {
        return Err(ProtocolError::TerminatedEarly);
    }
    if got < HEADER_SIZE {
        return Err(ProtocolError::MalformedHeader);
    }

    let channel = ChannelTag::try_from(header[0])?;
    let length = (&header[1..5]).read_u32::<BigEndian>()?;

    if channel.is_prompt() {
        log::trace!("read frame channel={channel:?} cap={length}");
        return Ok(Frame {
            channel,
            payload: header[1..5].to_vec(),
        });
    }

    let mut payload = vec![0u8; length as usize];
    let got = read_as_much_as_possible(r, &mut payload)?;
    if got < payload.len() {
        return Err(ProtocolError::MalformedHeader);
    }

    log::trace!("read frame channel={channel:?} len={length}");
    Ok(Frame { channel, payload })
}

/// Writes the `runcommand` request for `argv` to `w` and flushes it.
///
/// `argv` must be non-empty; that invariant is enforced by the caller (the
/// command driver), not here — this function only knows how to encode
/// whatever argv it's given.
pub fn write_command_request<W: Write, S: AsRef<str>>(
    w: &mut W,
    argv: &[S],
) -> Result<(), ProtocolError> {
    let block = encode_argv(argv);

    w.write_all(b"runcommand\n")?;
    w.write_u32::<BigEndian>(block.len() as u32)?;
    w.write_all(&block)?;
    w.flush()?;

    Ok(())
}

/// Joins `argv` with NUL bytes, with no trailing NUL.
pub fn encode_argv<S: AsRef<str>>(argv: &[S]) -> Vec<u8> {
    let mut block = Vec::new();
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            block.push(0);
        }
        block.extend_from_slice(arg.as_ref().as_bytes());
    }
    block
}

/// Writes a reply to a `LineInput`/`ByteInput` prompt: `u32be(k)` followed by
/// `k` bytes of data. Unlike a regular frame, a prompt reply carries no
/// leading channel byte.
pub fn write_prompt_reply<W: Write>(w: &mut W, data: &[u8]) -> Result<(), ProtocolError> {
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(data)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read};

    fn encode_frame(channel: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![channel];
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn framing_round_trip() {
        for (channel, tag) in [
            (b'o', ChannelTag::Output),
            (b'e', ChannelTag::Error),
            (b'r', ChannelTag::Result),
            (b'd', ChannelTag::Debug),
        ] {
            let payload = b"hello world".to_vec();
            let encoded = encode_frame(channel, &payload);
            let frame = read_frame(&mut Cursor::new(encoded)).unwrap();
            assert_eq!(frame, Frame { channel: tag, payload });
        }
    }

    #[test]
    fn prompt_framing_consumes_no_payload() {
        let mut buf = vec![b'L'];
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(b"EXTRA_BYTES_NOT_CONSUMED");

        let mut cursor = Cursor::new(buf);
        let frame = read_frame(&mut cursor).unwrap();
        assert_eq!(frame.channel, ChannelTag::LineInput);
        assert_eq!(frame.prompt_cap().unwrap(), 8);

        // The reader must not have consumed anything past the header.
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"EXTRA_BYTES_NOT_CONSUMED");
    }

    #[test]
    fn invalid_channel_byte_is_rejected() {
        let buf = encode_frame(b'?', b"");
        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidChannel(b'?')));
    }

    #[test]
    fn short_header_is_malformed() {
        let buf = vec![b'o', 0, 0]; // truncated length field
        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader));
    }

    #[test]
    fn clean_eof_before_any_bytes_is_terminated_early() {
        let err = read_frame(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, ProtocolError::TerminatedEarly));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut buf = vec![b'o'];
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short"); // only 5 of the promised 10 bytes
        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader));
    }

    #[test]
    fn argv_encoding_has_no_trailing_nul() {
        let argv = ["status", "-a", "foo bar"];
        let block = encode_argv(&argv);
        let expected_len: usize = argv.iter().map(|s| s.len()).sum::<usize>() + argv.len() - 1;
        assert_eq!(block.len(), expected_len);
        assert!(!block.ends_with(&[0]));

        let recovered: Vec<&str> = block
            .split(|&b| b == 0)
            .map(|s| std::str::from_utf8(s).unwrap())
            .collect();
        assert_eq!(recovered, argv.to_vec());
    }

    #[test]
    fn write_command_request_matches_the_wire_format() {
        let mut buf = Vec::new();
        write_command_request(&mut buf, &["log", "-l", "1"]).unwrap();

        assert!(buf.starts_with(b"runcommand\n"));
        let len_bytes = &buf[11..15];
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap());
        assert_eq!(&buf[15..], b"log\0-l\x001");
        assert_eq!(len as usize, buf.len() - 15);
    }

    #[test]
    fn prompt_reply_has_no_channel_prefix() {
        let mut buf = Vec::new();
        write_prompt_reply(&mut buf, b"hi\n").unwrap();
        assert_eq!(buf, [0, 0, 0, 3, b'h', b'i', b'\n']);
    }
}
