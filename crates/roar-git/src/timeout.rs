//! Run a subprocess with a hard wall-clock timeout.
//!
//! `std::process::Command` has no built-in timeout, so this polls
//! `try_wait` and kills the child if it outlives `timeout`. Every
//! external subprocess roar shells out to (git, ssh, dpkg, nvidia-smi,
//! ldconfig) goes through this — none of them may hang a command.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Outcome of running a command with a timeout.
pub struct TimedOutput {
    /// Exit status code, if the process exited before the timeout.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// `true` if the process was killed for exceeding `timeout`.
    pub timed_out: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run `command` (already configured with args/cwd), waiting up to
/// `timeout` before killing it. Capture errors (failure to spawn) are
/// reported as `Err`; a timeout is reported as `Ok` with `timed_out: true`
/// rather than an error, since callers treat it as just another outcome.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> std::io::Result<TimedOutput> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child: Child = command.spawn()?;
    let deadline = Instant::now() + timeout;

    let exit_code = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status.code());
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let timed_out = exit_code.is_none();
    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    Ok(TimedOutput {
        exit_code: exit_code.flatten(),
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_command_completes_before_timeout() {
        let cmd = Command::new("true");
        let result = run_with_timeout(cmd, Duration::from_secs(2)).unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn slow_command_is_killed() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_with_timeout(cmd, Duration::from_millis(100)).unwrap();
        assert!(result.timed_out);
        assert!(result.exit_code.is_none());
    }
}
