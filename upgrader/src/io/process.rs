//! Helpers for running child processes with timeouts and bounded output.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
///
/// Each stream keeps only its last `output_limit_bytes`; the start of a noisy
/// build log is the least useful part.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_dropped: usize,
    pub stderr_dropped: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// stdout followed by stderr, each prefixed with a drop notice when its
    /// head was discarded.
    pub fn merged_lossy(&self) -> String {
        let mut out = String::new();
        if self.stdout_dropped > 0 {
            out.push_str(&format!("[stdout: {} earlier bytes dropped]\n", self.stdout_dropped));
        }
        out.push_str(&String::from_utf8_lossy(&self.stdout));
        if !self.stderr.is_empty() || self.stderr_dropped > 0 {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if self.stderr_dropped > 0 {
                out.push_str(&format!("[stderr: {} earlier bytes dropped]\n", self.stderr_dropped));
            }
            out.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        out
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// each stream kept in memory: the tail is retained and earlier bytes are counted and discarded
/// while still draining the pipe. A child that outlives `timeout` is killed and reported with
/// `timed_out = true`.
///
/// Returns `Err` only when the command cannot be spawned or waited on.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_tail(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_tail(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_output(stderr_handle).context("join stderr")?;

    if stdout_dropped > 0 || stderr_dropped > 0 {
        debug!(stdout_dropped, stderr_dropped, "output head dropped");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_dropped,
        stderr_dropped,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Drain `reader`, keeping the last `limit` bytes. Returns the kept bytes and
/// the number of bytes dropped from the front.
fn read_stream_tail<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf: VecDeque<u8> = VecDeque::with_capacity(limit.min(64 * 1024));
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        buf.extend(&chunk[..n]);
        if buf.len() > limit {
            let excess = buf.len() - limit;
            buf.drain(..excess);
            dropped += excess;
        }
    }

    Ok((buf.into(), dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_reader_keeps_last_bytes() {
        let data = b"0123456789abcdef".repeat(1000);
        let (kept, dropped) = read_stream_tail(&data[..], 10).expect("read");
        assert_eq!(kept, b"6789abcdef");
        assert_eq!(dropped, data.len() - 10);
    }

    #[test]
    fn tail_reader_keeps_short_input_whole() {
        let (kept, dropped) = read_stream_tail(&b"BUILD SUCCESS"[..], 1024).expect("read");
        assert_eq!(kept, b"BUILD SUCCESS");
        assert_eq!(dropped, 0);
    }

    #[cfg(unix)]
    #[test]
    fn captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let output =
            run_command_with_timeout(cmd, Duration::from_secs(10), 1024).expect("run command");
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.merged_lossy(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let output =
            run_command_with_timeout(cmd, Duration::from_millis(100), 1024).expect("run command");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        let cmd = Command::new("upgrader-test-definitely-missing-binary");
        let err = run_command_with_timeout(cmd, Duration::from_secs(1), 1024)
            .expect_err("spawn should fail");
        assert!(format!("{err:#}").contains("spawn"));
    }
}
