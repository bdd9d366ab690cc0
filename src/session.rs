//! The command-server session: handshake, the `runcommand` response loop,
//! and the captured-output convenience wrapper.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{CommandResult, Error, Result};
use crate::process::{LaunchOptions, ServerProcess};
use crate::protocol::{self, ChannelClass, ChannelTag, ProtocolError};

/// Byte sinks for a single `runCommand` invocation, one per output channel.
///
/// A channel with no sink registered has its payload discarded (and logged
/// at `warn!`, once per frame).
#[derive(Default)]
pub struct OutputSinks<'a> {
    /// Receives `Output` (`o`) frame payloads.
    pub stdout: Option<&'a mut dyn Write>,
    /// Receives `Error` (`e`) frame payloads.
    pub stderr: Option<&'a mut dyn Write>,
    /// Receives `Debug` (`d`) frame payloads.
    pub debug: Option<&'a mut dyn Write>,
}

impl std::fmt::Debug for OutputSinks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks").finish_non_exhaustive()
    }
}

/// Callbacks answering the child's input prompts, one per prompt channel.
///
/// Each callback receives the reply cap `M` advertised by the child and
/// returns the bytes to send back; a return longer than `M` is truncated.
/// A missing callback results in an empty reply, which signals EOF for that
/// prompt.
#[derive(Default)]
pub struct InputProviders<'a> {
    /// Answers `LineInput` (`L`) prompts.
    pub line: Option<&'a mut dyn FnMut(u32) -> Vec<u8>>,
    /// Answers `ByteInput` (`I`) prompts.
    pub byte: Option<&'a mut dyn FnMut(u32) -> Vec<u8>>,
}

impl std::fmt::Debug for InputProviders<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputProviders").finish_non_exhaustive()
    }
}

struct SessionInner {
    process: ServerProcess,
    encoding: String,
    capabilities: HashSet<String>,
    closed: bool,
    root: Option<String>,
}

/// A handle to one running `hg serve --cmdserver pipe` child process.
///
/// All operations serialize on an internal mutex: only one logical command
/// may be in flight against the child at a time. Multiple independent
/// `Session`s may run in parallel without coordination.
pub struct Session {
    inner: Mutex<SessionInner>,
    pid: u32,
    cancel_requested: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Launches the command server and performs the handshake.
    ///
    /// `repo_path` may be omitted for commands that don't need one (e.g.
    /// `init`). `config_overrides` is passed through as repeated
    /// `--config k=v` flags without validation.
    pub fn open(
        repo_path: Option<&Path>,
        encoding: Option<&str>,
        config_overrides: &[(String, String)],
        hg_binary: Option<&str>,
    ) -> Result<Session> {
        let opts = LaunchOptions {
            hg_binary: hg_binary.map(str::to_owned),
            repo_path: repo_path.map(Path::to_path_buf),
            config_overrides: config_overrides.to_vec(),
            encoding: encoding.map(str::to_owned),
        };

        log::info!(
            "opening session: repo={:?} hg={}",
            opts.repo_path,
            opts.hg_binary.as_deref().unwrap_or("hg")
        );

        let mut process = ServerProcess::launch(&opts).map_err(Error::Launch)?;

        let hello = match protocol::read_frame(process.stdout()) {
            Ok(frame) => frame,
            Err(err) => {
                let _ = process.shutdown();
                return Err(err.into());
            }
        };

        if hello.channel != ChannelTag::Output {
            let _ = process.shutdown();
            return Err(ProtocolError::BadHandshakeChannel.into());
        }

        let (encoding, capabilities) = match parse_hello(&hello.payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                let _ = process.shutdown();
                return Err(err.into());
            }
        };

        log::info!("session ready: encoding={encoding} capabilities={capabilities:?}");

        let pid = process.pid();

        Ok(Session {
            inner: Mutex::new(SessionInner {
                process,
                encoding,
                capabilities,
                closed: false,
                root: None,
            }),
            pid,
            cancel_requested: AtomicBool::new(false),
        })
    }

    /// The encoding negotiated at handshake.
    pub fn encoding(&self) -> String {
        self.inner.lock().unwrap().encoding.clone()
    }

    /// The capability set negotiated at handshake.
    pub fn capabilities(&self) -> HashSet<String> {
        self.inner.lock().unwrap().capabilities.clone()
    }

    /// Runs one command to completion, dispatching frames to `sinks`/
    /// `providers` as they arrive, and returns its exit code.
    pub fn run_command(
        &self,
        argv: &[String],
        sinks: &mut OutputSinks<'_>,
        providers: &mut InputProviders<'_>,
    ) -> Result<i32> {
        if argv.is_empty() {
            return Err(Error::InvalidArgument("argv must not be empty".into()));
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::SessionClosed);
        }
        if !inner.capabilities.contains("runcommand") {
            return Err(ProtocolError::UnsupportedCapability("runcommand").into());
        }

        log::debug!(
            "runcommand: {} (encoding={})",
            argv.join(" "),
            inner.encoding
        );

        let (stdout, stdin) = inner.process.split();
        match run_to_completion(stdout, stdin, argv, sinks, providers) {
            Ok(code) => Ok(code),
            Err(err) => {
                log::error!("session closing after protocol error: {err}");
                inner.closed = true;
                let _ = inner.process.shutdown();
                if self.cancel_requested.swap(false, Ordering::SeqCst) {
                    Err(Error::Cancelled)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Best-effort cancellation of an in-flight (or future) command.
    ///
    /// Terminates the child out-of-band so a `run_command` blocked reading
    /// from it unblocks with a protocol error, which this call turns into
    /// [`Error::Cancelled`]. The session transitions to `Closed` either way.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        log::warn!("cancelling session (pid={})", self.pid);
        kill_by_pid(self.pid);

        if let Ok(mut inner) = self.inner.try_lock() {
            if !inner.closed {
                inner.closed = true;
                let _ = inner.process.shutdown();
            }
        }
    }

    /// Runs `argv`, capturing stdout/stderr into an in-memory
    /// [`CommandResult`] decoded per the session's negotiated encoding.
    pub fn get_command_output(
        &self,
        argv: &[String],
        providers: &mut InputProviders<'_>,
    ) -> Result<CommandResult> {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let exit_code = {
            let mut sinks = OutputSinks {
                stdout: Some(&mut stdout_buf),
                stderr: Some(&mut stderr_buf),
                debug: None,
            };
            self.run_command(argv, &mut sinks, providers)?
        };

        let encoding = self.encoding();
        Ok(CommandResult {
            argv: argv.to_vec(),
            exit_code,
            stdout: decode_output(&stdout_buf, &encoding),
            stderr: decode_output(&stderr_buf, &encoding),
        })
    }

    /// Memoized repository root, if [`crate::Session::root`] has already
    /// queried it once this session.
    pub(crate) fn cached_root(&self) -> Option<String> {
        self.inner.lock().unwrap().root.clone()
    }

    pub(crate) fn cache_root(&self, root: String) {
        self.inner.lock().unwrap().root = Some(root);
    }

    /// Terminates the child process. Safe to call more than once.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        log::info!("closing session");
        inner.closed = true;
        if let Err(err) = inner.process.shutdown() {
            log::warn!("error shutting down command server: {err}");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sends an out-of-band termination signal to `pid` without needing to own
/// the `Child` handle (which may be locked by an in-flight command).
fn kill_by_pid(pid: u32) {
    #[cfg(unix)]
    {
        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status();
        if let Err(err) = status {
            log::warn!("failed to signal pid {pid}: {err}");
        }
    }

    #[cfg(windows)]
    {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status();
        if let Err(err) = status {
            log::warn!("failed to terminate pid {pid}: {err}");
        }
    }
}

fn run_to_completion<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    argv: &[String],
    sinks: &mut OutputSinks<'_>,
    providers: &mut InputProviders<'_>,
) -> std::result::Result<i32, ProtocolError> {
    protocol::write_command_request(writer, argv)?;

    loop {
        let frame = protocol::read_frame(reader)?;
        log::trace!(
            "received frame channel={:?} len={}",
            frame.channel,
            frame.payload.len()
        );

        match frame.channel.classify() {
            ChannelClass::Terminal => return frame.result_code(),
            ChannelClass::Output => {
                let sink = match frame.channel {
                    ChannelTag::Output => sinks.stdout.as_mut(),
                    ChannelTag::Error => sinks.stderr.as_mut(),
                    ChannelTag::Debug => sinks.debug.as_mut(),
                    _ => unreachable!("classify() guarantees Output channels here"),
                };
                match sink {
                    Some(w) => {
                        w.write_all(&frame.payload)?;
                    }
                    None => log::warn!("discarding frame on unsinked channel {:?}", frame.channel),
                }
            }
            ChannelClass::Prompt => {
                let cap = frame.prompt_cap()?;
                let provider = match frame.channel {
                    ChannelTag::LineInput => providers.line.as_mut(),
                    ChannelTag::ByteInput => providers.byte.as_mut(),
                    _ => unreachable!("classify() guarantees Prompt channels here"),
                };

                let mut reply = match provider {
                    Some(f) => f(cap),
                    None => {
                        log::warn!("no provider for prompt channel {:?}; replying empty", frame.channel);
                        Vec::new()
                    }
                };
                if reply.len() as u64 > cap as u64 {
                    reply.truncate(cap as usize);
                }

                protocol::write_prompt_reply(writer, &reply)?;
            }
        }
    }
}

fn parse_hello(payload: &[u8]) -> std::result::Result<(String, HashSet<String>), ProtocolError> {
    let text = String::from_utf8_lossy(payload);

    let mut encoding = None;
    let mut capabilities = None;

    for line in text.split('\n') {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "encoding" => encoding = Some(value.trim().to_string()),
            "capabilities" => {
                capabilities = Some(value.split_whitespace().map(str::to_owned).collect())
            }
            _ => {}
        }
    }

    let encoding = encoding.ok_or(ProtocolError::BadHandshake("encoding"))?;
    let capabilities = capabilities.ok_or(ProtocolError::BadHandshake("capabilities"))?;

    Ok((encoding, capabilities))
}

fn decode_output(bytes: &[u8], encoding: &str) -> String {
    if encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8") {
        match std::str::from_utf8(bytes) {
            Ok(s) => return s.to_string(),
            Err(_) => log::warn!("command output was not valid UTF-8 despite encoding={encoding}; falling back to lossy decode"),
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_well_formed_hello() {
        let payload = b"capabilities: runcommand getencoding\nencoding: UTF-8\n";
        let (encoding, capabilities) = parse_hello(payload).unwrap();
        assert_eq!(encoding, "UTF-8");
        assert_eq!(
            capabilities,
            HashSet::from(["runcommand".to_string(), "getencoding".to_string()])
        );
    }

    #[test]
    fn missing_encoding_is_a_bad_handshake() {
        let payload = b"capabilities: runcommand\n";
        assert_matches!(parse_hello(payload), Err(ProtocolError::BadHandshake("encoding")));
    }

    #[test]
    fn missing_capabilities_is_a_bad_handshake() {
        let payload = b"encoding: UTF-8\n";
        assert_matches!(
            parse_hello(payload),
            Err(ProtocolError::BadHandshake("capabilities"))
        );
    }

    #[test]
    fn decode_output_prefers_strict_utf8_for_utf8_encoding() {
        assert_eq!(decode_output(b"hello", "utf-8"), "hello");
        assert_eq!(decode_output(b"hello", "UTF8"), "hello");
    }

    #[test]
    fn decode_output_falls_back_to_lossy_for_invalid_bytes() {
        let invalid = [0xff, 0xfe, b'x'];
        let decoded = decode_output(&invalid, "utf-8");
        assert!(decoded.ends_with('x'));
    }

    #[test]
    fn decode_output_is_lossy_for_non_utf8_encodings() {
        assert_eq!(decode_output(b"ok", "latin-1"), "ok");
    }

    fn synthetic_frame(channel: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![channel];
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    // A child that prompts once, then reports an exit code.
    #[test]
    fn prompt_reply_is_written_and_capped_and_exit_code_is_returned() {
        let mut child_stdout = Vec::new();
        child_stdout.extend(synthetic_frame(b'L', &8u32.to_be_bytes()));
        child_stdout.extend(synthetic_frame(b'r', &7i32.to_be_bytes()));

        let mut reader = std::io::Cursor::new(child_stdout);
        let mut writer = Vec::new();

        let mut reply = |_cap: u32| b"hi\n".to_vec();
        let mut providers = InputProviders {
            line: Some(&mut reply),
            byte: None,
        };
        let mut sinks = OutputSinks::default();

        let code = run_to_completion(
            &mut reader,
            &mut writer,
            &["log".to_string()],
            &mut sinks,
            &mut providers,
        )
        .unwrap();

        assert_eq!(code, 7);

        // The request is `runcommand\n` + u32be(len) + argv, followed by the
        // prompt reply `u32be(3) + "hi\n"` with no channel prefix.
        let mut expected = Vec::new();
        expected.extend_from_slice(b"runcommand\n");
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(b"log");
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(b"hi\n");
        assert_eq!(writer, expected);
    }

    #[test]
    fn oversized_prompt_reply_is_truncated_to_the_cap() {
        let mut child_stdout = Vec::new();
        child_stdout.extend(synthetic_frame(b'L', &2u32.to_be_bytes()));
        child_stdout.extend(synthetic_frame(b'r', &0i32.to_be_bytes()));

        let mut reader = std::io::Cursor::new(child_stdout);
        let mut writer = Vec::new();

        let mut reply = |_cap: u32| b"too long".to_vec();
        let mut providers = InputProviders {
            line: Some(&mut reply),
            byte: None,
        };
        let mut sinks = OutputSinks::default();

        run_to_completion(&mut reader, &mut writer, &["x".to_string()], &mut sinks, &mut providers).unwrap();

        let mut expected_reply = vec![0, 0, 0, 2];
        expected_reply.extend_from_slice(b"to");
        assert!(writer.ends_with(&expected_reply));
    }

    // A malformed channel byte is a hard protocol error.
    #[test]
    fn malformed_channel_byte_is_rejected() {
        let child_stdout = synthetic_frame(b'?', b"");
        let mut reader = std::io::Cursor::new(child_stdout);
        let mut writer = Vec::new();
        let mut sinks = OutputSinks::default();
        let mut providers = InputProviders::default();

        let err = run_to_completion(
            &mut reader,
            &mut writer,
            &["status".to_string()],
            &mut sinks,
            &mut providers,
        )
        .unwrap_err();

        assert_matches!(err, ProtocolError::InvalidChannel(b'?'));
    }

    #[test]
    fn output_and_error_frames_are_routed_to_their_sinks() {
        let mut child_stdout = Vec::new();
        child_stdout.extend(synthetic_frame(b'o', b"stdout bytes"));
        child_stdout.extend(synthetic_frame(b'e', b"stderr bytes"));
        child_stdout.extend(synthetic_frame(b'r', &0i32.to_be_bytes()));

        let mut reader = std::io::Cursor::new(child_stdout);
        let mut writer = Vec::new();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut sinks = OutputSinks {
            stdout: Some(&mut out),
            stderr: Some(&mut err),
            debug: None,
        };
        let mut providers = InputProviders::default();

        let code = run_to_completion(
            &mut reader,
            &mut writer,
            &["status".to_string()],
            &mut sinks,
            &mut providers,
        )
        .unwrap();

        assert_eq!(code, 0);
        assert_eq!(out, b"stdout bytes");
        assert_eq!(err, b"stderr bytes");
    }
}
