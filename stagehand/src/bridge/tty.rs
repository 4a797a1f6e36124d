//! Pseudoterminal transport for tools that refuse to run without a terminal.
//!
//! The adapter allocates a pty pair, attaches the child's three standard
//! streams to the slave end and talks to it through the master: the payload
//! is written, followed by a newline and an end-of-transmission byte, and
//! every byte the child produces is drained until end-of-stream. When no pty
//! can be allocated the exchange is retried through the system `script`
//! wrapper.
//!
//! Everything here blocks; callers run it on a blocking thread.

use crate::cancellation::{signal_group, CancellationController, ProcessHandle};
use crate::core::Transport;
use crate::errors::TtyError;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::openpty;
use nix::sys::signal::Signal;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// End-of-transmission: end of input for a terminal in canonical mode.
const EOT: u8 = 0x04;

/// Bytes read from the master per call.
const READ_CHUNK: usize = 4096;

/// Longest partial line pushed to the terminal at once. A canonical-mode
/// line discipline holds 4096 bytes of an unfinished line and drops the rest.
const MAX_PARTIAL_LINE: usize = 4095;

/// What came back from a terminal exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtyOutput {
    /// Exit code; `None` when the child died by signal.
    pub exit_code: Option<i32>,
    /// Signal that terminated the child, if any.
    pub signal: Option<i32>,
    /// Everything read from the terminal, echo included.
    pub output: String,
    /// Separate error stream; only the `script` fallback has one.
    pub stderr: String,
    /// How the exchange was carried.
    pub transport: Transport,
}

/// Runs a command on a pseudoterminal.
#[derive(Debug, Clone)]
pub struct TtyAdapter {
    poll_interval: Duration,
    cancel_grace: Duration,
    script_program: String,
}

impl TtyAdapter {
    /// Creates an adapter polling the master every `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            cancel_grace: Duration::from_secs(2),
            script_program: "script".to_string(),
        }
    }

    /// Sets how long a cancelled child may keep running before it is killed.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Sets the terminal-recording program used as fallback.
    #[must_use]
    pub fn with_script_program(mut self, program: impl Into<String>) -> Self {
        self.script_program = program.into();
        self
    }

    /// Feeds `input` to `argv` on a terminal and collects what it prints.
    ///
    /// `search_path` replaces the child's `PATH` when given.
    pub fn exchange(
        &self,
        argv: &[String],
        search_path: Option<&OsStr>,
        input: &str,
        stage: &str,
        controller: &CancellationController,
    ) -> Result<TtyOutput, TtyError> {
        match self.run_on_pty(argv, search_path, input, stage, controller) {
            Err(e) if e.is_allocation() => {
                warn!(stage, error = %e, program = %self.script_program, "Pseudoterminal unavailable, using script fallback");
                self.run_with_script(argv, search_path, input, stage, controller)
            }
            other => other,
        }
    }

    fn run_on_pty(
        &self,
        argv: &[String],
        search_path: Option<&OsStr>,
        input: &str,
        stage: &str,
        controller: &CancellationController,
    ) -> Result<TtyOutput, TtyError> {
        let (program, args) = split_command(argv)?;
        let pair = openpty(None, None).map_err(|e| TtyError::Allocation(e.to_string()))?;
        let master = File::from(pair.master);

        let mut child = {
            let slave_in = pair.slave.try_clone().map_err(|e| TtyError::Allocation(e.to_string()))?;
            let slave_out = pair.slave.try_clone().map_err(|e| TtyError::Allocation(e.to_string()))?;
            let mut cmd = Command::new(program);
            cmd.args(args)
                .stdin(Stdio::from(slave_in))
                .stdout(Stdio::from(slave_out))
                .stderr(Stdio::from(pair.slave))
                // New group, same session: `/dev/tty` still names the
                // operator's terminal, not this pty.
                .process_group(0);
            if let Some(path) = search_path {
                cmd.env("PATH", path);
            }
            // The parent's copies of the slave close when `cmd` drops, so the
            // master sees end-of-stream once the child side is gone.
            cmd.spawn().map_err(TtyError::Spawn)?
        };

        let guard = controller.register(ProcessHandle::new(child.id(), stage));
        debug!(stage, pid = child.id(), "Spawned child on pseudoterminal");

        if let Err(e) = start_feeder(&master, input) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let mut watch = CancelWatch::new(self.cancel_grace);
        let output = self.drain(master, &mut child, controller, &mut watch);
        let status = self.reap(&mut child, controller, &mut watch).map_err(|e| TtyError::Io(e.to_string()))?;
        guard.release();

        Ok(finish(status, &output, String::new(), Transport::Pty))
    }

    /// Reads the master until end-of-stream, or until the child is gone and
    /// nothing is left to read.
    fn drain(
        &self,
        mut master: File,
        child: &mut Child,
        controller: &CancellationController,
        watch: &mut CancelWatch,
    ) -> Vec<u8> {
        let mut output = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            watch.check(child, controller);

            let ready = match wait_readable(master.as_fd(), self.poll_interval) {
                Ok(ready) => ready,
                Err(e) => {
                    debug!(error = %e, "Polling the pseudoterminal failed");
                    break;
                }
            };

            if ready {
                match master.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => output.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    // EIO once the last slave descriptor closes.
                    Err(_) => break,
                }
            } else if matches!(child.try_wait(), Ok(Some(_)) | Err(_)) {
                break;
            }
        }
        output
    }

    /// Waits for the child, escalating if a cancel is pending.
    fn reap(
        &self,
        child: &mut Child,
        controller: &CancellationController,
        watch: &mut CancelWatch,
    ) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            watch.check(child, controller);
            thread::sleep(self.poll_interval);
        }
    }

    fn run_with_script(
        &self,
        argv: &[String],
        search_path: Option<&OsStr>,
        input: &str,
        stage: &str,
        controller: &CancellationController,
    ) -> Result<TtyOutput, TtyError> {
        split_command(argv)?;
        let mut cmd = Command::new(&self.script_program);
        cmd.args(script_args(argv))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(path) = search_path {
            cmd.env("PATH", path);
        }
        let mut child = cmd.spawn().map_err(TtyError::Spawn)?;
        let guard = controller.register(ProcessHandle::new(child.id(), stage));
        info!(stage, pid = child.id(), "Spawned child under script");

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = input.as_bytes().to_vec();
            thread::Builder::new()
                .name("tty-feed".to_string())
                .spawn(move || {
                    if let Err(e) = stdin.write_all(&bytes) {
                        debug!(error = %e, "Child closed its input early");
                    }
                })
                .map_err(|e| TtyError::Io(e.to_string()))?;
        }

        let output = child.wait_with_output().map_err(|e| TtyError::Io(e.to_string()))?;
        guard.release();

        Ok(finish(
            output.status,
            &output.stdout,
            String::from_utf8_lossy(&output.stderr).into_owned(),
            Transport::ScriptFallback,
        ))
    }
}

impl Default for TtyAdapter {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

/// Escalates a pending cancel: SIGTERM has already gone out through the
/// controller, SIGKILL follows once the grace period runs out.
#[derive(Debug)]
struct CancelWatch {
    grace: Duration,
    seen_at: Option<Instant>,
    killed: bool,
}

impl CancelWatch {
    fn new(grace: Duration) -> Self {
        Self {
            grace,
            seen_at: None,
            killed: false,
        }
    }

    fn check(&mut self, child: &mut Child, controller: &CancellationController) {
        if self.killed || !controller.is_cancelled() {
            return;
        }
        let seen_at = *self.seen_at.get_or_insert_with(Instant::now);
        if controller.is_shutdown() || seen_at.elapsed() >= self.grace {
            warn!(pid = child.id(), "Child ignored cancellation, killing its process group");
            if let Err(e) = signal_group(child.id(), Signal::SIGKILL) {
                debug!(error = %e, "Killing the process group failed");
                let _ = child.kill();
            }
            self.killed = true;
        }
    }
}

fn split_command(argv: &[String]) -> Result<(&String, &[String]), TtyError> {
    argv.split_first().ok_or_else(|| {
        TtyError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))
    })
}

/// Terminal byte stream for `input`: every line longer than
/// [`MAX_PARTIAL_LINE`] is cut into pieces, each pushed to the reader with a
/// mid-line EOT, and the whole input ends with a newline and EOT.
fn terminal_frames(input: &str) -> Vec<u8> {
    let pieces = input.len() / MAX_PARTIAL_LINE;
    let mut bytes = Vec::with_capacity(input.len() + pieces + 2);
    for (i, line) in input.as_bytes().split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            bytes.push(b'\n');
        }
        let mut chunks = line.chunks(MAX_PARTIAL_LINE).peekable();
        while let Some(chunk) = chunks.next() {
            bytes.extend_from_slice(chunk);
            if chunks.peek().is_some() {
                bytes.push(EOT);
            }
        }
    }
    bytes.push(b'\n');
    bytes.push(EOT);
    bytes
}

/// Writes the framed input to the master on a separate thread so the drain
/// loop keeps consuming echo while the write is in flight.
fn start_feeder(master: &File, input: &str) -> Result<(), TtyError> {
    let mut writer = master.try_clone().map_err(|e| TtyError::Io(e.to_string()))?;
    let bytes = terminal_frames(input);

    thread::Builder::new()
        .name("tty-feed".to_string())
        .spawn(move || {
            if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                debug!(error = %e, "Terminal input was not fully delivered");
            }
        })
        .map(drop)
        .map_err(|e| TtyError::Io(e.to_string()))
}

/// Waits up to `timeout` for the descriptor to become readable or hang up.
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool, Errno> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(fds[0].revents().is_some_and(|r| {
            r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
        })),
        Err(e) => Err(e),
    }
}

/// Arguments for the terminal-recording wrapper.
#[cfg(not(target_os = "macos"))]
fn script_args(argv: &[String]) -> Vec<OsString> {
    let quoted = argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");
    ["-q", "-e", "-c", quoted.as_str(), "/dev/null"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

/// Arguments for the terminal-recording wrapper.
#[cfg(target_os = "macos")]
fn script_args(argv: &[String]) -> Vec<OsString> {
    ["-q", "/dev/null"]
        .into_iter()
        .map(OsString::from)
        .chain(argv.iter().map(OsString::from))
        .collect()
}

/// Quotes `arg` for a POSIX shell.
pub(crate) fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

fn finish(status: ExitStatus, output: &[u8], stderr: String, transport: Transport) -> TtyOutput {
    use std::os::unix::process::ExitStatusExt;
    TtyOutput {
        exit_code: status.code(),
        signal: status.signal(),
        output: String::from_utf8_lossy(output).into_owned(),
        stderr,
        transport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-arg_1.txt"), "plain-arg_1.txt");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(shell_quote(""), "''");
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_script_args_quote_command() {
        let args = script_args(&argv(&["tool", "--say", "hi there"]));
        assert_eq!(args[3], OsString::from("tool --say 'hi there'"));
        assert_eq!(args[4], OsString::from("/dev/null"));
    }

    #[test]
    fn test_frames_split_long_lines() {
        assert_eq!(terminal_frames(""), b"\n\x04".to_vec());
        assert_eq!(terminal_frames("a\nb"), b"a\nb\n\x04".to_vec());

        let long = "x".repeat(MAX_PARTIAL_LINE * 2 + 10);
        let framed = terminal_frames(&format!("{long}\nshort"));
        let eots: Vec<usize> = framed
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == EOT)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(eots, vec![MAX_PARTIAL_LINE, MAX_PARTIAL_LINE * 2 + 1, framed.len() - 1]);
        assert!(framed.ends_with(b"\nshort\n\x04"));
    }

    #[test]
    fn test_long_single_line_arrives_whole() {
        let adapter = TtyAdapter::default();
        let controller = CancellationController::default();
        let payload = "a".repeat(10_000);

        let out = adapter
            .exchange(
                &argv(&["sh", "-c", "n=$(cat | wc -c | tr -d ' '); echo COUNT=$n"]),
                None,
                &payload,
                "bulk",
                &controller,
            )
            .unwrap();

        assert_eq!(out.exit_code, Some(0));
        assert!(out.output.contains("COUNT=10001"), "output tail: {:?}", &out.output[out.output.len().saturating_sub(80)..]);
    }

    #[test]
    fn test_child_sees_a_terminal() {
        let adapter = TtyAdapter::default();
        let controller = CancellationController::default();

        let out = adapter
            .exchange(
                &argv(&["sh", "-c", "if [ -t 0 ] && [ -t 1 ]; then echo tty-yes; else echo tty-no; fi"]),
                None,
                "",
                "probe",
                &controller,
            )
            .unwrap();

        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.transport, Transport::Pty);
        assert!(out.output.contains("tty-yes"), "output: {:?}", out.output);
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_input_reaches_child_and_eot_ends_it() {
        let adapter = TtyAdapter::default();
        let controller = CancellationController::default();

        let out = adapter
            .exchange(
                &argv(&["sh", "-c", "read line; echo \"got:$line\"; cat >/dev/null; echo finished; exit 3"]),
                None,
                "payload-text",
                "reader",
                &controller,
            )
            .unwrap();

        assert_eq!(out.exit_code, Some(3));
        assert!(out.output.contains("got:payload-text"), "output: {:?}", out.output);
        assert!(out.output.contains("finished"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_script_fallback_carries_input_and_exit_code() {
        let adapter = TtyAdapter::default();
        let controller = CancellationController::default();

        let out = adapter
            .run_with_script(
                &argv(&["sh", "-c", "read l; echo got:$l; exit 4"]),
                None,
                "hello\n",
                "fallback",
                &controller,
            )
            .unwrap();

        assert_eq!(out.exit_code, Some(4));
        assert_eq!(out.transport, Transport::ScriptFallback);
        assert!(out.output.contains("got:hello"), "output: {:?}", out.output);
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_missing_script_program_is_spawn_error() {
        let adapter = TtyAdapter::default().with_script_program("/nonexistent/stagehand-script");
        let controller = CancellationController::default();

        let err = adapter
            .run_with_script(&argv(&["true"]), None, "", "fallback", &controller)
            .unwrap_err();

        assert!(matches!(err, TtyError::Spawn(_)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let adapter = TtyAdapter::default();
        let controller = CancellationController::default();

        let err = adapter
            .exchange(&argv(&["/nonexistent/stagehand-tool"]), None, "", "ghost", &controller)
            .unwrap_err();

        assert!(matches!(err, TtyError::Spawn(_)));
    }

    #[test]
    fn test_cancel_stops_terminal_child() {
        let adapter = TtyAdapter::new(Duration::from_millis(20)).with_cancel_grace(Duration::from_millis(200));
        let controller = Arc::new(CancellationController::default());

        let canceller = {
            let controller = controller.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                controller.request_cancel();
            })
        };

        let started = Instant::now();
        let out = adapter
            .exchange(&argv(&["sleep", "30"]), None, "", "sleeper", &controller)
            .unwrap();
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_ne!(out.exit_code, Some(0));
    }

    #[test]
    fn test_cancel_stops_wrapped_terminal_child() {
        let adapter = TtyAdapter::new(Duration::from_millis(20)).with_cancel_grace(Duration::from_secs(20));
        let controller = Arc::new(CancellationController::default());

        let canceller = {
            let controller = controller.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                controller.request_cancel();
            })
        };

        let started = Instant::now();
        let out = adapter
            .exchange(&argv(&["sh", "-c", "sleep 30; echo late"]), None, "", "wrapper", &controller)
            .unwrap();
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
        assert_eq!(out.signal, Some(Signal::SIGTERM as i32));
        assert!(!out.output.contains("late"));
    }
}
