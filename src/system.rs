use thiserror::Error;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command timed out after {timeout_secs}s: {cmd}")]
    Timeout { cmd: String, timeout_secs: u64 },
    #[error("failed to execute command {cmd}: {source}")]
    Io { cmd: String, source: std::io::Error },
}

/// Runs `cmd` with a hard timeout; the child is killed if the timeout fires.
pub async fn run_cmd(
    cmd: &str,
    args: &[&str],
    timeout_secs: u64,
) -> Result<CommandOutput, CommandError> {
    let mut child = Command::new(cmd);
    child.args(args).kill_on_drop(true);

    let output = timeout(Duration::from_secs(timeout_secs), child.output())
        .await
        .map_err(|_| CommandError::Timeout {
            cmd: cmd.to_string(),
            timeout_secs,
        })?
        .map_err(|source| CommandError::Io {
            cmd: cmd.to_string(),
            source,
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status.code().unwrap_or(-1),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::{CommandError, run_cmd};

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let output = run_cmd("sh", &["-c", "echo hostwatch; exit 3"], 5)
            .await
            .expect("sh should run");
        assert_eq!(output.stdout.trim(), "hostwatch");
        assert_eq!(output.status, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let error = run_cmd("hostwatch-definitely-missing", &[], 5)
            .await
            .expect_err("missing binary must fail");
        assert!(matches!(error, CommandError::Io { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let error = run_cmd("sh", &["-c", "sleep 5"], 1)
            .await
            .expect_err("sleep must exceed the timeout");
        assert!(matches!(error, CommandError::Timeout { timeout_secs: 1, .. }));
    }
}
