//! Spawns and supervises the `hg serve --cmdserver pipe` child process.

use std::io::{BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// How long to wait after closing the child's stdin before escalating to
/// `SIGKILL`/`TerminateProcess`.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Parameters for launching the command server.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Path to the `hg` binary to run. Defaults to `"hg"` on `$PATH`.
    pub hg_binary: Option<String>,
    /// Repository to open, passed as `-R <path>`. `None` starts a
    /// repository-less server (valid for commands like `init`).
    pub repo_path: Option<std::path::PathBuf>,
    /// `key=value` pairs passed as repeated `--config` flags.
    pub config_overrides: Vec<(String, String)>,
    /// When set, exported as `HGENCODING` for the child.
    pub encoding: Option<String>,
}

/// A running command-server child process and its piped stdio.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ServerProcess {
    /// Spawns `hg serve --cmdserver pipe` with the given options.
    pub fn launch(opts: &LaunchOptions) -> std::io::Result<Self> {
        let binary = opts.hg_binary.as_deref().unwrap_or("hg");

        let mut cmd = Command::new(binary);
        cmd.arg("serve").arg("--cmdserver").arg("pipe");

        if let Some(repo) = &opts.repo_path {
            cmd.arg("-R").arg(repo);
        }

        for (key, value) in &opts.config_overrides {
            cmd.arg("--config").arg(format!("{key}={value}"));
        }

        if let Some(encoding) = &opts.encoding {
            cmd.env("HGENCODING", encoding);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        log::debug!("launched command server: {binary} (repo={:?})", opts.repo_path);

        Ok(ServerProcess {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// The child's stdout, for reading frames.
    pub fn stdout(&mut self) -> &mut BufReader<ChildStdout> {
        &mut self.stdout
    }

    /// The child's OS process ID, for out-of-band cancellation.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The child's stdin, for writing requests and prompt replies.
    ///
    /// Panics if called after [`ServerProcess::shutdown`]; the session layer
    /// never does this, since a closed session refuses further commands.
    pub fn stdin(&mut self) -> &mut ChildStdin {
        self.stdin.as_mut().expect("stdin used after shutdown")
    }

    /// Splits into independent mutable borrows of stdout and stdin, so a
    /// caller can read frames and write replies without fighting the
    /// borrow checker over two `&mut self` calls.
    pub fn split(&mut self) -> (&mut BufReader<ChildStdout>, &mut ChildStdin) {
        (
            &mut self.stdout,
            self.stdin.as_mut().expect("stdin used after shutdown"),
        )
    }

    /// Closes stdin, then waits up to [`KILL_GRACE`] for the child to exit on
    /// its own before force-killing it. Idempotent: a second call just waits
    /// on the already-closed child.
    pub fn shutdown(&mut self) -> std::io::Result<ExitStatus> {
        // Dropping stdin closes the pipe, which is the command server's cue
        // to exit on its own.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush();
        }

        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        let start = Instant::now();
        while start.elapsed() < KILL_GRACE {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        log::warn!("command server did not exit within the grace period; killing it");
        self.child.kill()?;
        self.child.wait()
    }
}
